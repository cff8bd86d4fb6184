use thiserror::Error;

/// Errors surfaced by the device registry, the ports, the relay loop and the sampler.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("audio backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("audio device '{name}' not found (available: {})", format_names(.available))]
    DeviceNotFound { name: String, available: Vec<String> },

    #[error("failed to open audio device '{device}': {reason}")]
    DeviceOpen { device: String, reason: String },

    #[error("invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("invalid frame size: expected {expected} bytes, got {actual}")]
    InvalidFrameSize { expected: usize, actual: usize },

    #[error("audio device error: {0}")]
    Device(String),

    #[error("audio stream closed")]
    StreamClosed,

    #[error("corrupt sample container: {0}")]
    CorruptContainer(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RelayError {
    /// Faults raised while streaming, after both ports were opened.
    pub fn is_runtime_fault(&self) -> bool {
        matches!(self, Self::Device(_) | Self::StreamClosed)
    }
}

fn format_names(names: &[String]) -> String {
    if names.is_empty() {
        return "none".to_string();
    }
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
