use thiserror::Error;

/// Recoverable failures raised inside a single relay session.
///
/// None of these stop the process or the session; components log them at the
/// boundary where they occur and keep processing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("output queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },
    #[error("channel is closed")]
    ChannelClosed,
    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },
    #[error("audio interface is not running")]
    CapabilityNotReady,
    #[error("session already closed")]
    SessionAlreadyClosed,
}

impl RelayError {
    pub fn malformed<S: Into<String>>(reason: S) -> Self {
        Self::MalformedFrame {
            reason: reason.into(),
        }
    }

    /// Short label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::QueueFull { .. } => "queue_full",
            RelayError::ChannelClosed => "channel_closed",
            RelayError::MalformedFrame { .. } => "malformed_frame",
            RelayError::CapabilityNotReady => "capability_not_ready",
            RelayError::SessionAlreadyClosed => "session_already_closed",
        }
    }
}
