//! Offline sampler: record frames, store them in a diagnostic container, replay them.
//!
//! Container layout (little-endian):
//! ```text
//! [0-3]    channels       u32
//! [4-7]    sample_rate    u32
//! [8]      sample_format  u8   (1 = int16, 2 = int32, 3 = float32)
//! [9-12]   frame_size     u32  samples per channel per frame
//! [13-16]  frame_count    u32
//! [17-..]  frame_count × frame_size × channels × sample_width bytes of interleaved PCM
//! ```

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use super::backend::{CapturePort, PlaybackPort};
use super::error::RelayError;
use super::format::{AudioFormat, Frame, SampleFormat};

pub const HEADER_LEN: usize = 17;

/// Frames loaded from a container, with the format they were captured in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    pub format: AudioFormat,
    pub frames: Vec<Frame>,
}

/// Read exactly `count` frames from `capture`, in order.
pub fn record<C>(capture: &mut C, count: usize) -> Result<Vec<Frame>, RelayError>
where
    C: CapturePort + ?Sized,
{
    log::info!(
        "Recording {} frames ({}) from input device: {}",
        count,
        capture.format(),
        capture.device().name
    );
    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        frames.push(capture.read()?);
    }
    Ok(frames)
}

/// Write each frame to `playback` in order. Returns the number of frames written.
pub fn playback<P, I>(port: &mut P, frames: I) -> Result<usize, RelayError>
where
    P: PlaybackPort + ?Sized,
    I: IntoIterator<Item = Frame>,
{
    let mut written = 0;
    for frame in frames {
        port.write(frame)?;
        written += 1;
    }
    log::info!("Played {} frames to {}", written, port.device().name);
    Ok(written)
}

/// Serialize `frames` into a container. Every frame must match `format`.
pub fn encode(frames: &[Frame], format: &AudioFormat) -> Result<Vec<u8>, RelayError> {
    let frame_bytes = format.frame_bytes();
    let frame_count = u32::try_from(frames.len()).map_err(|_| {
        RelayError::InvalidFormat(format!("{} frames do not fit in a container", frames.len()))
    })?;

    let mut out = Vec::with_capacity(HEADER_LEN + frames.len() * frame_bytes);
    out.extend_from_slice(&format.channels.to_le_bytes());
    out.extend_from_slice(&format.sample_rate.to_le_bytes());
    out.push(format.sample_format.code());
    out.extend_from_slice(&format.frame_size.to_le_bytes());
    out.extend_from_slice(&frame_count.to_le_bytes());
    for frame in frames {
        frame.check_len(frame_bytes)?;
        out.extend_from_slice(frame.as_bytes());
    }
    Ok(out)
}

/// Parse a container. Any inconsistency fails the whole call.
pub fn decode(data: &[u8]) -> Result<Recording, RelayError> {
    if data.len() < HEADER_LEN {
        return Err(RelayError::CorruptContainer(format!(
            "{} bytes is shorter than the {HEADER_LEN}-byte header",
            data.len()
        )));
    }
    let u32_at = |offset: usize| {
        let mut word = [0u8; 4];
        word.copy_from_slice(&data[offset..offset + 4]);
        u32::from_le_bytes(word)
    };

    let channels = u32_at(0);
    let sample_rate = u32_at(4);
    let code = data[8];
    let frame_size = u32_at(9);
    let frame_count = u32_at(13) as usize;

    let sample_format = SampleFormat::from_code(code)
        .ok_or_else(|| RelayError::CorruptContainer(format!("unknown sample format code {code}")))?;
    let format = AudioFormat::new(sample_rate, channels, sample_format, frame_size)
        .map_err(|e| RelayError::CorruptContainer(e.to_string()))?;

    let frame_bytes = format.checked_frame_bytes().ok_or_else(|| {
        RelayError::CorruptContainer(format!("frame of {format} overflows the address space"))
    })?;
    let payload = &data[HEADER_LEN..];
    let expected = frame_count.checked_mul(frame_bytes).ok_or_else(|| {
        RelayError::CorruptContainer(format!("frame count {frame_count} overflows payload size"))
    })?;
    if payload.len() != expected {
        return Err(RelayError::CorruptContainer(format!(
            "payload is {} bytes, header describes {frame_count} frames of {frame_bytes} bytes",
            payload.len()
        )));
    }

    let frames = payload
        .chunks_exact(frame_bytes)
        .map(|chunk| Frame::new(chunk.to_vec()))
        .collect();
    Ok(Recording { format, frames })
}

pub fn persist(frames: &[Frame], format: &AudioFormat, path: &Path) -> Result<(), RelayError> {
    let data = encode(frames, format)?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&data)?;
    writer.flush()?;
    log::info!(
        "Wrote {} frames ({}) to {}",
        frames.len(),
        format,
        path.display()
    );
    Ok(())
}

pub fn load(path: &Path) -> Result<Recording, RelayError> {
    let data = fs::read(path)?;
    let recording = decode(&data)?;
    log::info!(
        "Loaded {} frames ({}) from {}",
        recording.frames.len(),
        recording.format,
        path.display()
    );
    Ok(recording)
}
