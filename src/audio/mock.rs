//! In-memory backend with scripted faults, used by the unit tests.

use std::sync::{Arc, Mutex, MutexGuard};

use super::backend::{
    AudioBackend, CapturePort, DeviceDescriptor, DeviceDirection, PlaybackPort, Port, PortState,
};
use super::error::RelayError;
use super::format::{AudioFormat, Frame};

#[derive(Debug, Default)]
struct TallyState {
    enumerations: usize,
    reads: usize,
    writes: usize,
    capture_closes: usize,
    playback_closes: usize,
    captured: Vec<Vec<u8>>,
    written: Vec<Vec<u8>>,
}

/// Shared view of everything the mock ports did.
#[derive(Debug, Clone, Default)]
pub struct Tally(Arc<Mutex<TallyState>>);

impl Tally {
    fn lock(&self) -> MutexGuard<'_, TallyState> {
        self.0.lock().unwrap()
    }

    pub fn enumerations(&self) -> usize {
        self.lock().enumerations
    }

    pub fn reads(&self) -> usize {
        self.lock().reads
    }

    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    pub fn capture_closes(&self) -> usize {
        self.lock().capture_closes
    }

    pub fn playback_closes(&self) -> usize {
        self.lock().playback_closes
    }

    /// Frames handed out by capture ports, in order.
    pub fn captured(&self) -> Vec<Vec<u8>> {
        self.lock().captured.clone()
    }

    /// Frames accepted by playback ports, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.lock().written.clone()
    }
}

#[derive(Debug, Default)]
pub struct MockBackend {
    devices: Vec<DeviceDescriptor>,
    unavailable: bool,
    fail_read_at: Option<usize>,
    fail_write_at: Option<usize>,
    fail_capture_open: bool,
    fail_playback_open: bool,
    fail_capture_close: bool,
    tally: Tally,
}

impl MockBackend {
    pub fn with_devices(names: &[&str]) -> Self {
        let devices = names
            .iter()
            .enumerate()
            .map(|(index, name)| DeviceDescriptor {
                index,
                name: name.to_string(),
                description: format!("mock device {index}"),
                direction: DeviceDirection::Both,
            })
            .collect();
        Self {
            devices,
            ..Default::default()
        }
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    /// The n-th read (1-based) fails with a device error.
    pub fn fail_read_at(mut self, n: usize) -> Self {
        self.fail_read_at = Some(n);
        self
    }

    /// The n-th write (1-based) fails with a device error.
    pub fn fail_write_at(mut self, n: usize) -> Self {
        self.fail_write_at = Some(n);
        self
    }

    pub fn fail_capture_open(mut self) -> Self {
        self.fail_capture_open = true;
        self
    }

    pub fn fail_playback_open(mut self) -> Self {
        self.fail_playback_open = true;
        self
    }

    /// Capture `close` releases the port but reports a device error.
    pub fn fail_capture_close(mut self) -> Self {
        self.fail_capture_close = true;
        self
    }

    pub fn tally(&self) -> Tally {
        self.tally.clone()
    }

    fn check_open(&self, device: &DeviceDescriptor, fail: bool) -> Result<(), RelayError> {
        if fail {
            return Err(RelayError::DeviceOpen {
                device: device.name.clone(),
                reason: "device busy".to_string(),
            });
        }
        if !self.devices.iter().any(|d| d == device) {
            return Err(RelayError::DeviceOpen {
                device: device.name.clone(),
                reason: "stale descriptor".to_string(),
            });
        }
        Ok(())
    }
}

impl AudioBackend for MockBackend {
    type Capture = MockCapture;
    type Playback = MockPlayback;

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, RelayError> {
        if self.unavailable {
            return Err(RelayError::BackendUnavailable("mock backend offline".into()));
        }
        self.tally.lock().enumerations += 1;
        Ok(self.devices.clone())
    }

    fn open_capture(
        &self,
        device: &DeviceDescriptor,
        format: &AudioFormat,
    ) -> Result<MockCapture, RelayError> {
        self.check_open(device, self.fail_capture_open)?;
        Ok(MockCapture {
            device: device.clone(),
            format: *format,
            state: PortState::Open,
            fail_read_at: self.fail_read_at,
            fail_close: self.fail_capture_close,
            tally: self.tally.clone(),
        })
    }

    fn open_playback(
        &self,
        device: &DeviceDescriptor,
        format: &AudioFormat,
    ) -> Result<MockPlayback, RelayError> {
        self.check_open(device, self.fail_playback_open)?;
        Ok(MockPlayback {
            device: device.clone(),
            format: *format,
            state: PortState::Open,
            fail_write_at: self.fail_write_at,
            tally: self.tally.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MockCapture {
    device: DeviceDescriptor,
    format: AudioFormat,
    state: PortState,
    fail_read_at: Option<usize>,
    fail_close: bool,
    tally: Tally,
}

impl Port for MockCapture {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn state(&self) -> PortState {
        self.state
    }

    fn close(&mut self) -> Result<(), RelayError> {
        if self.state == PortState::Closed {
            return Ok(());
        }
        self.state = PortState::Closed;
        self.tally.lock().capture_closes += 1;
        if self.fail_close {
            return Err(RelayError::Device("simulated fault on capture close".into()));
        }
        Ok(())
    }
}

impl CapturePort for MockCapture {
    fn read(&mut self) -> Result<Frame, RelayError> {
        if self.state == PortState::Closed {
            return Err(RelayError::StreamClosed);
        }
        let mut tally = self.tally.lock();
        tally.reads += 1;
        let n = tally.reads;
        if self.fail_read_at == Some(n) {
            return Err(RelayError::Device(format!("simulated fault on read {n}")));
        }
        // Each frame gets a distinct byte pattern so ordering mistakes show up.
        let bytes: Vec<u8> = (0..self.format.frame_bytes())
            .map(|i| (n as u8).wrapping_mul(31).wrapping_add(i as u8))
            .collect();
        tally.captured.push(bytes.clone());
        Ok(Frame::new(bytes))
    }
}

impl Drop for MockCapture {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[derive(Debug)]
pub struct MockPlayback {
    device: DeviceDescriptor,
    format: AudioFormat,
    state: PortState,
    fail_write_at: Option<usize>,
    tally: Tally,
}

impl Port for MockPlayback {
    fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    fn format(&self) -> &AudioFormat {
        &self.format
    }

    fn state(&self) -> PortState {
        self.state
    }

    fn close(&mut self) -> Result<(), RelayError> {
        if self.state == PortState::Open {
            self.state = PortState::Closed;
            self.tally.lock().playback_closes += 1;
        }
        Ok(())
    }
}

impl PlaybackPort for MockPlayback {
    fn write(&mut self, frame: Frame) -> Result<(), RelayError> {
        if self.state == PortState::Closed {
            return Err(RelayError::StreamClosed);
        }
        frame.check_len(self.format.frame_bytes())?;
        let mut tally = self.tally.lock();
        let n = tally.writes + 1;
        if self.fail_write_at == Some(n) {
            return Err(RelayError::Device(format!("simulated fault on write {n}")));
        }
        tally.writes = n;
        tally.written.push(frame.into_bytes());
        Ok(())
    }
}

impl Drop for MockPlayback {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
