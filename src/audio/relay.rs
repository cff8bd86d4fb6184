//! The streaming loop: capture → hook → playback until cancelled.
//!
//! The loop is strictly sequential. `read` and `write` are the only blocking points
//! and at most one frame is in flight, so a slow hook or playback device delays the
//! next read instead of filling a queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use super::backend::{AudioBackend, CapturePort, PlaybackPort, Port};
use super::error::RelayError;
use super::format::AudioFormat;
use super::hook::{self, ProcessingHook};
use super::registry::DeviceRegistry;

/// Lifecycle of a relay.
///
/// ```text
/// Idle → Opening → Streaming → Closing → Closed
///           ↓          ↓
///           └──→ Errored ←──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Opening,
    Streaming,
    Closing,
    Closed,
    Errored,
}

/// Cooperative stop signal, checked once per frame boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What to open: device names as configured plus the per-direction format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSpec {
    pub capture_device: String,
    pub playback_device: String,
    pub capture_format: AudioFormat,
    pub playback_format: AudioFormat,
}

impl SessionSpec {
    /// Both directions share `format`.
    pub fn symmetric(capture_device: &str, playback_device: &str, format: AudioFormat) -> Self {
        Self {
            capture_device: capture_device.to_string(),
            playback_device: playback_device.to_string(),
            capture_format: format,
            playback_format: format,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub frames: u64,
    pub bytes: u64,
}

/// The open capture/playback pair and the hook between them.
pub struct Session<C, P> {
    id: Uuid,
    capture: C,
    playback: P,
    hook: Box<dyn ProcessingHook>,
}

impl<C: CapturePort, P: PlaybackPort> Session<C, P> {
    #[cfg(test)]
    pub fn capture(&self) -> &C {
        &self.capture
    }

    #[cfg(test)]
    pub fn playback(&self) -> &P {
        &self.playback
    }

    /// Close capture, then playback. Both are attempted; the first failure is returned.
    fn close(&mut self) -> Result<(), RelayError> {
        let capture = self.capture.close();
        let playback = self.playback.close();
        capture.and(playback)
    }

    fn stream(&mut self, cancel: &CancelToken, limit: Option<u64>) -> Result<RelayStats, RelayError> {
        let mut stats = RelayStats::default();
        while !cancel.is_cancelled() {
            if limit.is_some_and(|n| stats.frames >= n) {
                break;
            }
            let frame = self.capture.read()?;
            let out = hook::apply(self.hook.as_mut(), frame)?;
            stats.bytes += out.len() as u64;
            self.playback.write(out)?;
            stats.frames += 1;

            if stats.frames % 1000 == 0 {
                log::debug!("Session {}: relayed {} frames", self.id, stats.frames);
            }
        }
        Ok(stats)
    }
}

/// Drives one session through its whole lifecycle. Single use: once it reaches
/// `Closed` or `Errored` it stays there.
pub struct Relay<B: AudioBackend> {
    backend: B,
    state: RelayState,
    session: Option<Session<B::Capture, B::Playback>>,
}

impl<B: AudioBackend> Relay<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: RelayState::Idle,
            session: None,
        }
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    #[cfg(test)]
    pub fn session(&self) -> Option<&Session<B::Capture, B::Playback>> {
        self.session.as_ref()
    }

    /// Open both ports and relay frames until `cancel` fires, `limit` frames have
    /// been relayed, or a port fails. Ports are closed on every exit path.
    pub fn run(
        &mut self,
        registry: &DeviceRegistry,
        spec: &SessionSpec,
        hook: Box<dyn ProcessingHook>,
        cancel: &CancelToken,
        limit: Option<u64>,
    ) -> Result<RelayStats, RelayError> {
        if self.state != RelayState::Idle {
            log::error!("Relay already used (state {:?})", self.state);
            return Err(RelayError::StreamClosed);
        }

        self.state = RelayState::Opening;
        let session = match self.open(registry, spec, hook) {
            Ok(session) => session,
            Err(e) => {
                self.state = RelayState::Errored;
                log::error!("Failed to open relay session: {}", e);
                return Err(e);
            }
        };

        log::info!(
            "Session {}: relaying \"{}\" ({}) -> \"{}\" ({})",
            session.id,
            spec.capture_device,
            spec.capture_format,
            spec.playback_device,
            spec.playback_format,
        );

        self.state = RelayState::Streaming;
        let session = self.session.insert(session);
        let result = session.stream(cancel, limit);

        match result {
            Ok(stats) => {
                self.state = RelayState::Closing;
                if let Err(e) = session.close() {
                    log::warn!("Session {}: error while closing ports: {}", session.id, e);
                }
                self.state = RelayState::Closed;
                log::info!(
                    "Session {} stopped after {} frames ({} bytes)",
                    session.id,
                    stats.frames,
                    stats.bytes
                );
                Ok(stats)
            }
            Err(e) => {
                if let Err(close_err) = session.close() {
                    log::warn!("Session {}: error while closing ports: {}", session.id, close_err);
                }
                self.state = RelayState::Errored;
                log::error!("Session {} failed: {}", session.id, e);
                Err(e)
            }
        }
    }

    fn open(
        &self,
        registry: &DeviceRegistry,
        spec: &SessionSpec,
        hook: Box<dyn ProcessingHook>,
    ) -> Result<Session<B::Capture, B::Playback>, RelayError> {
        let capture_device = registry.resolve(&spec.capture_device)?;
        let playback_device = registry.resolve(&spec.playback_device)?;
        log::info!(
            "Determined device idx: {}:{}, {}:{}",
            capture_device.name,
            capture_device.index,
            playback_device.name,
            playback_device.index
        );

        let mut capture = self
            .backend
            .open_capture(capture_device, &spec.capture_format)?;
        let playback = match self
            .backend
            .open_playback(playback_device, &spec.playback_format)
        {
            Ok(playback) => playback,
            Err(e) => {
                if let Err(close_err) = capture.close() {
                    log::warn!("Failed to close capture port after open error: {}", close_err);
                }
                return Err(e);
            }
        };

        Ok(Session {
            id: Uuid::new_v4(),
            capture,
            playback,
            hook,
        })
    }
}
