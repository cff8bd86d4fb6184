//! audio - Device registry, capture/playback ports, and the relay loop
//!
//! Uses ALSA for audio I/O. Frames move capture → processing hook → playback
//! on a single blocking thread, one frame at a time.

mod alsa_device;
mod backend;
mod error;
mod format;
mod hook;
#[cfg(test)]
pub(crate) mod mock;
mod registry;
mod relay;
pub mod sampler;

pub use alsa_device::AlsaBackend;
pub use backend::{
    AudioBackend, CapturePort, DeviceDescriptor, DeviceDirection, PlaybackPort, Port, PortState,
};
pub use error::RelayError;
pub use format::{AudioFormat, Frame, SampleFormat};
pub use hook::{Passthrough, ProcessingHook};
pub use registry::DeviceRegistry;
pub use relay::{CancelToken, Relay, RelayState, RelayStats, SessionSpec};
