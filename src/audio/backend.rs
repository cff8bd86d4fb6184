//! Backend seam: device enumeration and format-bound port handles.
//!
//! The relay loop and the offline sampler only talk to these traits, so the same
//! code drives ALSA in production and the in-memory backend in tests.

use std::fmt;

use serde::Serialize;

use super::error::RelayError;
use super::format::{AudioFormat, Frame};

/// Which way audio flows through an endpoint or a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceDirection {
    Capture,
    Playback,
    Both,
}

impl DeviceDirection {
    pub fn supports(self, wanted: DeviceDirection) -> bool {
        self == DeviceDirection::Both || self == wanted
    }
}

impl fmt::Display for DeviceDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceDirection::Capture => write!(f, "capture"),
            DeviceDirection::Playback => write!(f, "playback"),
            DeviceDirection::Both => write!(f, "capture+playback"),
        }
    }
}

/// An endpoint as reported by one enumeration pass.
///
/// `index` is only meaningful within the pass that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescriptor {
    pub index: usize,
    pub name: String,
    pub description: String,
    pub direction: DeviceDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    Open,
    Closed,
}

/// Common surface of capture and playback handles.
pub trait Port {
    fn device(&self) -> &DeviceDescriptor;

    fn format(&self) -> &AudioFormat;

    fn state(&self) -> PortState;

    /// Release the backend handle. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), RelayError>;
}

pub trait CapturePort: Port {
    /// Block until exactly one full frame has been captured.
    fn read(&mut self) -> Result<Frame, RelayError>;
}

pub trait PlaybackPort: Port {
    /// Block until the whole frame has been handed to the device.
    fn write(&mut self, frame: Frame) -> Result<(), RelayError>;
}

pub trait AudioBackend {
    type Capture: CapturePort;
    type Playback: PlaybackPort;

    /// Query the backend once for every endpoint it knows about.
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, RelayError>;

    fn open_capture(
        &self,
        device: &DeviceDescriptor,
        format: &AudioFormat,
    ) -> Result<Self::Capture, RelayError>;

    fn open_playback(
        &self,
        device: &DeviceDescriptor,
        format: &AudioFormat,
    ) -> Result<Self::Playback, RelayError>;
}
