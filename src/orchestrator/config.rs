use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub(crate) const DEFAULT_API_ORIGIN: &str = "https://api.elevenlabs.io";
pub(crate) const DEFAULT_WS_ORIGIN: &str = "wss://api.elevenlabs.io";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub agent_id: String,
    /// Private agents need a signed URL fetched with the API key.
    pub requires_auth: bool,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub api_origin: String,
    pub ws_origin: String,
}

impl ConversationConfig {
    pub fn new<S: Into<String>>(agent_id: S) -> Self {
        Self {
            agent_id: agent_id.into(),
            requires_auth: false,
            api_key: None,
            api_origin: DEFAULT_API_ORIGIN.to_string(),
            ws_origin: DEFAULT_WS_ORIGIN.to_string(),
        }
    }

    pub fn from_env() -> Result<Self> {
        let agent_id = std::env::var("AGENT_ID")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow!("AGENT_ID is not configured"))?;

        let mut config = Self::new(agent_id);
        config.requires_auth = env_flag("AGENT_REQUIRES_AUTH").unwrap_or(false);
        config.api_key = non_empty_var("AGENT_API_KEY");
        if let Some(origin) = non_empty_var("AGENT_API_ORIGIN") {
            config.api_origin = origin.trim_end_matches('/').to_string();
        }
        if let Some(origin) = non_empty_var("AGENT_WS_ORIGIN") {
            config.ws_origin = origin.trim_end_matches('/').to_string();
        }

        if config.requires_auth && config.api_key.is_none() {
            return Err(anyhow!(
                "AGENT_REQUIRES_AUTH is set but AGENT_API_KEY is missing"
            ));
        }
        Ok(config)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

/// Reads a boolean switch; `None` when unset.
pub(crate) fn env_flag(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}
