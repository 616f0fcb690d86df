//! 电话媒体流的帧格式与出站通道抽象。

pub mod telephony;

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::RelayError;

pub use telephony::TelephonyAudioInterface;

/// Outbound half of a transport connection.
///
/// `send` must not block; socket implementations usually push onto a writer
/// task's queue.
pub trait TransportSink: Send + Sync {
    fn send(&self, frame: String) -> Result<(), RelayError>;

    fn is_open(&self) -> bool;
}

impl TransportSink for mpsc::UnboundedSender<String> {
    fn send(&self, frame: String) -> Result<(), RelayError> {
        mpsc::UnboundedSender::send(self, frame).map_err(|_| RelayError::ChannelClosed)
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

/// Token the transport assigns to a media stream when it starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamBinding(String);

impl StreamBinding {
    pub fn new<S: Into<String>>(token: S) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStart {
    #[serde(rename = "streamSid")]
    pub stream_sid: StreamBinding,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub payload: String,
}

/// JSON envelope exchanged with the telephony media stream, keyed by `event`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TransportEnvelope {
    Start {
        start: StreamStart,
    },
    Media {
        media: MediaPayload,
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<StreamBinding>,
    },
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: StreamBinding,
    },
    Stop {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<StreamBinding>,
    },
    /// `connected`, `mark`, `dtmf` and anything else the relay does not use.
    #[serde(other)]
    Other,
}

impl TransportEnvelope {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text)
            .map_err(|err| RelayError::malformed(format!("transport frame: {err}")))
    }

    pub fn label(&self) -> &'static str {
        match self {
            TransportEnvelope::Start { .. } => "start",
            TransportEnvelope::Media { .. } => "media",
            TransportEnvelope::Clear { .. } => "clear",
            TransportEnvelope::Stop { .. } => "stop",
            TransportEnvelope::Other => "other",
        }
    }
}
