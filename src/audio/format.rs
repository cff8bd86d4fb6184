//! Audio format description and the frame buffer moved through the relay.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::RelayError;

/// Sample encoding of one PCM sample. Always little-endian, interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    Int16,
    Int32,
    Float32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Int32 | SampleFormat::Float32 => 4,
        }
    }

    /// Code stored in the sample container header.
    pub fn code(self) -> u8 {
        match self {
            SampleFormat::Int16 => 1,
            SampleFormat::Int32 => 2,
            SampleFormat::Float32 => 3,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(SampleFormat::Int16),
            2 => Some(SampleFormat::Int32),
            3 => Some(SampleFormat::Float32),
            _ => None,
        }
    }

    pub(crate) fn to_alsa(self) -> alsa::pcm::Format {
        match self {
            SampleFormat::Int16 => alsa::pcm::Format::S16LE,
            SampleFormat::Int32 => alsa::pcm::Format::S32LE,
            SampleFormat::Float32 => alsa::pcm::Format::FloatLE,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::Int16 => write!(f, "int16"),
            SampleFormat::Int32 => write!(f, "int32"),
            SampleFormat::Float32 => write!(f, "float32"),
        }
    }
}

impl FromStr for SampleFormat {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "int16" | "s16" | "s16le" => Ok(SampleFormat::Int16),
            "int32" | "s32" | "s32le" => Ok(SampleFormat::Int32),
            "float32" | "f32" | "float" => Ok(SampleFormat::Float32),
            other => Err(RelayError::InvalidFormat(format!(
                "unsupported sample format '{other}'"
            ))),
        }
    }
}

/// Stream parameters, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u32,
    pub sample_format: SampleFormat,
    /// Samples per channel in one frame (ALSA period size)
    pub frame_size: u32,
}

impl AudioFormat {
    pub fn new(
        sample_rate: u32,
        channels: u32,
        sample_format: SampleFormat,
        frame_size: u32,
    ) -> Result<Self, RelayError> {
        if sample_rate == 0 {
            return Err(RelayError::InvalidFormat("sample rate must be positive".into()));
        }
        if channels == 0 {
            return Err(RelayError::InvalidFormat("channel count must be positive".into()));
        }
        if frame_size == 0 {
            return Err(RelayError::InvalidFormat("frame size must be positive".into()));
        }
        let format = Self {
            sample_rate,
            channels,
            sample_format,
            frame_size,
        };
        if format.checked_frame_bytes().is_none() {
            return Err(RelayError::InvalidFormat(format!(
                "{frame_size} samples × {channels} channels of {sample_format} overflow a frame buffer"
            )));
        }
        Ok(format)
    }

    /// Length in bytes of one frame buffer, or `None` if it does not fit in `usize`.
    pub fn checked_frame_bytes(&self) -> Option<usize> {
        (self.frame_size as usize)
            .checked_mul(self.channels as usize)?
            .checked_mul(self.sample_format.bytes_per_sample())
    }

    /// Length in bytes of one frame buffer. Exact for every format built by `new`.
    pub fn frame_bytes(&self) -> usize {
        self.checked_frame_bytes().unwrap_or(usize::MAX)
    }

    /// Number of whole frames covering `secs` seconds of audio.
    pub fn frames_for_duration(&self, secs: u32) -> usize {
        (u64::from(self.sample_rate) * u64::from(secs) / u64::from(self.frame_size)) as usize
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}/{} samples",
            self.sample_rate, self.channels, self.sample_format, self.frame_size
        )
    }
}

/// One chunk of interleaved PCM bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[cfg(test)]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }

    #[cfg(test)]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Fails with `InvalidFrameSize` unless the frame is exactly `expected` bytes.
    pub fn check_len(&self, expected: usize) -> Result<(), RelayError> {
        if self.0.len() != expected {
            return Err(RelayError::InvalidFrameSize {
                expected,
                actual: self.0.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame").field("len", &self.0.len()).finish()
    }
}
