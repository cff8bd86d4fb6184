//! The processing hook applied to every frame between capture and playback.

use std::panic::{self, AssertUnwindSafe};

use super::error::RelayError;
use super::format::Frame;

/// A per-frame transformation. Implementations must return a frame of the same
/// length they were given and must not block for longer than a frame period.
pub trait ProcessingHook: Send {
    fn process(&mut self, frame: Frame) -> Frame;
}

impl<F> ProcessingHook for F
where
    F: FnMut(Frame) -> Frame + Send,
{
    fn process(&mut self, frame: Frame) -> Frame {
        self(frame)
    }
}

/// Returns every frame unchanged, for setups where processing happens elsewhere
/// on the audio path (e.g. a virtual denoising microphone).
#[derive(Debug, Default, Clone, Copy)]
pub struct Passthrough;

impl ProcessingHook for Passthrough {
    fn process(&mut self, frame: Frame) -> Frame {
        frame
    }
}

/// Run `hook` on `frame`, enforcing the length contract.
///
/// A panic inside the hook is reported as a device fault so the caller takes the
/// same cleanup path as for a failing port.
pub fn apply(hook: &mut dyn ProcessingHook, frame: Frame) -> Result<Frame, RelayError> {
    let expected = frame.len();
    let out = panic::catch_unwind(AssertUnwindSafe(|| hook.process(frame))).map_err(|payload| {
        let msg = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        RelayError::Device(format!("processing hook panicked: {msg}"))
    })?;
    out.check_len(expected)?;
    Ok(out)
}
