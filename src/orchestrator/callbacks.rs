use std::fmt;
use std::sync::Arc;

type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;
type CorrectionCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;
type LatencyCallback = Arc<dyn Fn(u64) + Send + Sync>;

/// Optional observers for agent text and keep-alive latency. Text is trimmed
/// before it is handed over.
#[derive(Clone, Default)]
pub struct ConversationCallbacks {
    agent_response: Option<TextCallback>,
    agent_response_correction: Option<CorrectionCallback>,
    user_transcript: Option<TextCallback>,
    latency_measurement: Option<LatencyCallback>,
}

impl ConversationCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_agent_response<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.agent_response = Some(Arc::new(callback));
        self
    }

    pub fn on_agent_response_correction<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.agent_response_correction = Some(Arc::new(callback));
        self
    }

    pub fn on_user_transcript<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.user_transcript = Some(Arc::new(callback));
        self
    }

    pub fn on_latency_measurement<F>(mut self, callback: F) -> Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.latency_measurement = Some(Arc::new(callback));
        self
    }

    pub(crate) fn agent_response(&self, text: &str) {
        if let Some(callback) = &self.agent_response {
            callback(text.trim());
        }
    }

    pub(crate) fn agent_response_correction(&self, original: &str, corrected: &str) {
        if let Some(callback) = &self.agent_response_correction {
            callback(original.trim(), corrected.trim());
        }
    }

    pub(crate) fn user_transcript(&self, text: &str) {
        if let Some(callback) = &self.user_transcript {
            callback(text.trim());
        }
    }

    pub(crate) fn wants_latency(&self) -> bool {
        self.latency_measurement.is_some()
    }

    pub(crate) fn latency_measurement(&self, latency_ms: u64) {
        if let Some(callback) = &self.latency_measurement {
            callback(latency_ms);
        }
    }
}

impl fmt::Debug for ConversationCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationCallbacks")
            .field("agent_response", &self.agent_response.is_some())
            .field(
                "agent_response_correction",
                &self.agent_response_correction.is_some(),
            )
            .field("user_transcript", &self.user_transcript.is_some())
            .field("latency_measurement", &self.latency_measurement.is_some())
            .finish()
    }
}
