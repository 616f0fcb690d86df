use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::orchestrator::config::ConversationConfig;
use crate::orchestrator::constants::{API_KEY_HEADER, CONVERSATION_PATH, SIGNED_URL_PATH};

const TARGET: &str = "agent_endpoint";

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    signed_url: String,
}

/// Public websocket URL for the configured agent.
pub fn conversation_url(config: &ConversationConfig) -> String {
    format!(
        "{}{}?agent_id={}",
        config.ws_origin, CONVERSATION_PATH, config.agent_id
    )
}

/// Signed websocket URL for private agents. Runs the HTTP call on the
/// blocking pool.
pub async fn fetch_signed_url(config: &ConversationConfig) -> Result<String> {
    let url = format!(
        "{}{}?agent_id={}",
        config.api_origin, SIGNED_URL_PATH, config.agent_id
    );
    let api_key = config.api_key.clone();

    tokio::task::spawn_blocking(move || request_signed_url(&url, api_key.as_deref()))
        .await
        .context("signed url request task panicked")?
}

pub async fn resolve_agent_url(config: &ConversationConfig) -> Result<String> {
    if config.requires_auth {
        let url = fetch_signed_url(config).await?;
        info!(target: TARGET, agent_id = %config.agent_id, "using signed agent url");
        Ok(url)
    } else {
        Ok(conversation_url(config))
    }
}

fn request_signed_url(url: &str, api_key: Option<&str>) -> Result<String> {
    let mut request = ureq::get(url);
    if let Some(key) = api_key {
        request = request.set(API_KEY_HEADER, key);
    }

    let response = request
        .call()
        .map_err(|err| anyhow!("failed to fetch signed url: {err}"))?;

    if !(200..300).contains(&response.status()) {
        return Err(anyhow!(
            "failed to fetch signed url: received HTTP status {}",
            response.status()
        ));
    }

    let body = response
        .into_string()
        .context("failed to read signed url response")?;
    let parsed: SignedUrlResponse =
        serde_json::from_str(&body).context("signed url response is not valid json")?;
    Ok(parsed.signed_url)
}
