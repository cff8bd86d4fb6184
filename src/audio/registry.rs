use super::backend::{AudioBackend, DeviceDescriptor};
use super::error::RelayError;

/// One enumeration snapshot. Both devices of a session are resolved against the
/// same snapshot so their indices come from a single backend pass.
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<DeviceDescriptor>,
}

impl DeviceRegistry {
    /// Enumerate the backend once and keep the result.
    pub fn snapshot<B: AudioBackend>(backend: &B) -> Result<Self, RelayError> {
        let devices = backend.enumerate()?;
        log::debug!("Enumerated {} audio devices", devices.len());
        Ok(Self { devices })
    }

    #[cfg(test)]
    pub fn from_devices(devices: Vec<DeviceDescriptor>) -> Self {
        Self { devices }
    }

    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Exact name match. With duplicate names the first one in enumeration order
    /// wins; that order is whatever the backend reports.
    pub fn resolve(&self, name: &str) -> Result<&DeviceDescriptor, RelayError> {
        self.devices
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| RelayError::DeviceNotFound {
                name: name.to_string(),
                available: self.devices.iter().map(|d| d.name.clone()).collect(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::DeviceDirection;
    use crate::audio::mock::MockBackend;
    use pretty_assertions::assert_eq;

    fn device(index: usize, name: &str, description: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            index,
            name: name.to_string(),
            description: description.to_string(),
            direction: DeviceDirection::Both,
        }
    }

    #[test]
    fn resolves_every_enumerated_name() {
        let backend = MockBackend::with_devices(&["default", "hw:CARD=PCH,DEV=0", "pulse"]);
        let registry = DeviceRegistry::snapshot(&backend).unwrap();
        for d in registry.devices() {
            let resolved = registry.resolve(&d.name).unwrap();
            assert_eq!(resolved.name, d.name);
            assert_eq!(resolved.index, d.index);
        }
    }

    #[test]
    fn unknown_name_is_not_found() {
        let backend = MockBackend::with_devices(&["default", "pulse"]);
        let registry = DeviceRegistry::snapshot(&backend).unwrap();
        match registry.resolve("nonexistent-device-xyz") {
            Err(RelayError::DeviceNotFound { name, available }) => {
                assert_eq!(name, "nonexistent-device-xyz");
                assert_eq!(available, vec!["default".to_string(), "pulse".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn match_is_exact() {
        let registry = DeviceRegistry::from_devices(vec![device(0, "Headset (HX 831s)", "")]);
        assert!(registry.resolve("headset (hx 831s)").is_err());
        assert!(registry.resolve("Headset").is_err());
        assert!(registry.resolve("Headset (HX 831s)").is_ok());
    }

    #[test]
    fn empty_registry_never_resolves() {
        let backend = MockBackend::with_devices(&[]);
        let registry = DeviceRegistry::snapshot(&backend).unwrap();
        for name in ["", "default", "Microphone (NVIDIA Broadcast)"] {
            assert!(matches!(
                registry.resolve(name),
                Err(RelayError::DeviceNotFound { .. })
            ));
        }
    }

    #[test]
    fn duplicate_names_resolve_to_first() {
        let registry = DeviceRegistry::from_devices(vec![
            device(0, "usb", "first"),
            device(1, "usb", "second"),
        ]);
        assert_eq!(registry.resolve("usb").unwrap().description, "first");
    }

    #[test]
    fn snapshot_enumerates_once() {
        let backend = MockBackend::with_devices(&["default"]);
        let registry = DeviceRegistry::snapshot(&backend).unwrap();
        registry.resolve("default").unwrap();
        registry.resolve("default").unwrap();
        assert_eq!(backend.tally().enumerations(), 1);
    }

    #[test]
    fn backend_failure_surfaces() {
        let backend = MockBackend::unavailable();
        assert!(matches!(
            DeviceRegistry::snapshot(&backend),
            Err(RelayError::BackendUnavailable(_))
        ));
    }
}
