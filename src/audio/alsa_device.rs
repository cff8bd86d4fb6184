//! ALSA backend: PCM hint enumeration and blocking capture/playback ports.

use alsa::device_name::HintIter;
use alsa::pcm::{Access, HwParams, PCM};
use alsa::{Direction, ValueOr};
use anyhow::{Context, Result};

use super::backend::{
    AudioBackend, CapturePort, DeviceDescriptor, DeviceDirection, PlaybackPort, Port, PortState,
};
use super::error::RelayError;
use super::format::{AudioFormat, Frame};

const EINTR: i32 = 4;
const EPIPE: i32 = 32;
const ESTRPIPE: i32 = 86;

/// Consecutive xrun recoveries tolerated before a read/write gives up.
const MAX_RECOVERY_RETRIES: u32 = 3;

/// Periods in the hardware ring buffer.
const BUFFER_PERIODS: u32 = 4;

/// Parameters negotiated with the ALSA hardware.
#[derive(Debug, Clone)]
pub struct AlsaParams {
    pub sample_rate: u32,
    pub channels: u32,
    /// Period size in frames (one frame = channels × sample_width)
    pub period_size: usize,
    pub buffer_size: usize,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AlsaBackend;

impl AudioBackend for AlsaBackend {
    type Capture = AlsaCapture;
    type Playback = AlsaPlayback;

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>, RelayError> {
        let hints = HintIter::new_str(None, "pcm")
            .map_err(|e| RelayError::BackendUnavailable(e.to_string()))?;

        let devices = hints
            .filter_map(|hint| {
                let name = hint.name?;
                let direction = match hint.direction {
                    Some(Direction::Capture) => DeviceDirection::Capture,
                    Some(Direction::Playback) => DeviceDirection::Playback,
                    None => DeviceDirection::Both,
                };
                Some((name, hint.desc.unwrap_or_default(), direction))
            })
            .enumerate()
            .map(|(index, (name, desc, direction))| DeviceDescriptor {
                index,
                name,
                // ALSA descriptions span two lines ("card\nsubdevice")
                description: desc.replace('\n', " / "),
                direction,
            })
            .collect();

        Ok(devices)
    }

    fn open_capture(
        &self,
        device: &DeviceDescriptor,
        format: &AudioFormat,
    ) -> Result<AlsaCapture, RelayError> {
        let pcm = open_port(device, format, DeviceDirection::Capture)?;
        Ok(AlsaCapture {
            inner: AlsaPort::new(device, format, pcm),
        })
    }

    fn open_playback(
        &self,
        device: &DeviceDescriptor,
        format: &AudioFormat,
    ) -> Result<AlsaPlayback, RelayError> {
        let pcm = open_port(device, format, DeviceDirection::Playback)?;
        Ok(AlsaPlayback {
            inner: AlsaPort::new(device, format, pcm),
        })
    }
}

fn open_port(
    device: &DeviceDescriptor,
    format: &AudioFormat,
    wanted: DeviceDirection,
) -> Result<PCM, RelayError> {
    if !device.direction.supports(wanted) {
        return Err(RelayError::DeviceOpen {
            device: device.name.clone(),
            reason: format!("device does not support {wanted}"),
        });
    }
    let direction = match wanted {
        DeviceDirection::Playback => Direction::Playback,
        _ => Direction::Capture,
    };
    let (pcm, params) =
        open_pcm(&device.name, direction, format).map_err(|e| RelayError::DeviceOpen {
            device: device.name.clone(),
            reason: format!("{e:#}"),
        })?;

    // No conversion happens past this point, so the hardware has to agree exactly.
    if params.sample_rate != format.sample_rate || params.channels != format.channels {
        return Err(RelayError::DeviceOpen {
            device: device.name.clone(),
            reason: format!(
                "negotiated {}Hz/{}ch, requested {}Hz/{}ch",
                params.sample_rate, params.channels, format.sample_rate, format.channels
            ),
        });
    }
    Ok(pcm)
}

fn open_pcm(device: &str, direction: Direction, format: &AudioFormat) -> Result<(PCM, AlsaParams)> {
    let dir_name = match direction {
        Direction::Capture => "Capture",
        Direction::Playback => "Playback",
    };
    let pcm = PCM::new(device, direction, false)
        .with_context(|| format!("Failed to open PCM device '{}' for {}", device, dir_name))?;

    // Configure hardware parameters
    {
        let hwp = HwParams::any(&pcm).with_context(|| "Failed to initialize HwParams")?;
        hwp.set_access(Access::RWInterleaved)?;
        hwp.set_format(format.sample_format.to_alsa())
            .with_context(|| format!("Sample format {} not supported", format.sample_format))?;
        hwp.set_channels(format.channels)
            .with_context(|| format!("{} channels not supported", format.channels))?;
        hwp.set_rate_near(format.sample_rate, ValueOr::Nearest)?;
        hwp.set_period_size_near(format.frame_size as alsa::pcm::Frames, ValueOr::Nearest)?;
        hwp.set_buffer_size_near(ring_buffer_frames(format.frame_size)?)?;
        pcm.hw_params(&hwp)?;
    }

    // Read back actual negotiated parameters
    let params = {
        let hwp = pcm.hw_params_current()?;
        AlsaParams {
            sample_rate: hwp.get_rate()?,
            channels: hwp.get_channels()?,
            period_size: hwp.get_period_size()? as usize,
            buffer_size: hwp.get_buffer_size()? as usize,
        }
    };

    log::info!(
        "ALSA {}: device={}, rate={}, channels={}, format={}, period_size={}, buffer_size={}",
        dir_name,
        device,
        params.sample_rate,
        params.channels,
        format.sample_format,
        params.period_size,
        params.buffer_size,
    );

    Ok((pcm, params))
}

fn ring_buffer_frames(frame_size: u32) -> Result<alsa::pcm::Frames> {
    frame_size
        .checked_mul(BUFFER_PERIODS)
        .and_then(|n| alsa::pcm::Frames::try_from(n).ok())
        .with_context(|| format!("Frame size {} too large for the ring buffer", frame_size))
}

/// Handle an error from `readi`/`writei`. Returns `Ok` when the caller should retry.
fn recover(pcm: &PCM, err: alsa::Error, retries: &mut u32, dir_name: &str) -> Result<(), RelayError> {
    let errno = err.errno();
    if errno == EINTR {
        return Ok(());
    }
    if errno != EPIPE && errno != ESTRPIPE {
        return Err(RelayError::Device(format!("ALSA {dir_name} error: {err}")));
    }

    *retries += 1;
    if *retries > MAX_RECOVERY_RETRIES {
        return Err(RelayError::Device(format!(
            "ALSA {dir_name} xrun persisted after {MAX_RECOVERY_RETRIES} recoveries: {err}"
        )));
    }
    log::warn!("ALSA {} xrun: {}, recovering...", dir_name, err);
    pcm.prepare().map_err(|e2| {
        RelayError::Device(format!("Failed to recover PCM {dir_name}: {e2}"))
    })
}

/// State shared by both directions.
struct AlsaPort {
    device: DeviceDescriptor,
    format: AudioFormat,
    pcm: Option<PCM>,
    frame_bytes: usize,
    bytes_per_frame: usize,
}

impl AlsaPort {
    fn new(device: &DeviceDescriptor, format: &AudioFormat, pcm: PCM) -> Self {
        Self {
            device: device.clone(),
            format: *format,
            pcm: Some(pcm),
            frame_bytes: format.frame_bytes(),
            bytes_per_frame: format.channels as usize * format.sample_format.bytes_per_sample(),
        }
    }

    fn state(&self) -> PortState {
        if self.pcm.is_some() {
            PortState::Open
        } else {
            PortState::Closed
        }
    }
}

pub struct AlsaCapture {
    inner: AlsaPort,
}

impl Port for AlsaCapture {
    fn device(&self) -> &DeviceDescriptor {
        &self.inner.device
    }

    fn format(&self) -> &AudioFormat {
        &self.inner.format
    }

    fn state(&self) -> PortState {
        self.inner.state()
    }

    fn close(&mut self) -> Result<(), RelayError> {
        let Some(pcm) = self.inner.pcm.take() else {
            return Ok(());
        };
        log::info!("Capture port closed: {}", self.inner.device.name);
        // Pending captured samples are of no use once the relay stops.
        pcm.drop().map_err(|e| {
            RelayError::Device(format!("ALSA capture drop on {} failed: {e}", self.inner.device.name))
        })
    }
}

impl CapturePort for AlsaCapture {
    fn read(&mut self) -> Result<Frame, RelayError> {
        let port = &self.inner;
        let pcm = port.pcm.as_ref().ok_or(RelayError::StreamClosed)?;
        let io = pcm.io_bytes();

        let mut buf = vec![0u8; port.frame_bytes];
        let mut filled = 0;
        let mut retries = 0u32;
        while filled < buf.len() {
            match io.readi(&mut buf[filled..]) {
                Ok(frames) => {
                    filled += frames * port.bytes_per_frame;
                    retries = 0;
                }
                Err(e) => recover(pcm, e, &mut retries, "capture")?,
            }
        }
        Ok(Frame::new(buf))
    }
}

impl Drop for AlsaCapture {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

pub struct AlsaPlayback {
    inner: AlsaPort,
}

impl Port for AlsaPlayback {
    fn device(&self) -> &DeviceDescriptor {
        &self.inner.device
    }

    fn format(&self) -> &AudioFormat {
        &self.inner.format
    }

    fn state(&self) -> PortState {
        self.inner.state()
    }

    fn close(&mut self) -> Result<(), RelayError> {
        let Some(pcm) = self.inner.pcm.take() else {
            return Ok(());
        };
        log::info!("Playback port closed: {}", self.inner.device.name);
        // Let already queued audio play out; a faulted device fails fast here.
        pcm.drain().map_err(|e| {
            RelayError::Device(format!("ALSA playback drain on {} failed: {e}", self.inner.device.name))
        })
    }
}

impl PlaybackPort for AlsaPlayback {
    fn write(&mut self, frame: Frame) -> Result<(), RelayError> {
        let port = &self.inner;
        let pcm = port.pcm.as_ref().ok_or(RelayError::StreamClosed)?;
        frame.check_len(port.frame_bytes)?;
        let io = pcm.io_bytes();

        // Loop over short writes and xrun recovery without losing samples.
        let data = frame.as_bytes();
        let mut written = 0;
        let mut retries = 0u32;
        while written < data.len() {
            match io.writei(&data[written..]) {
                Ok(frames) => {
                    written += frames * port.bytes_per_frame;
                    retries = 0;
                }
                Err(e) => recover(pcm, e, &mut retries, "playback")?,
            }
        }
        Ok(())
    }
}

impl Drop for AlsaPlayback {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
