use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::util::duration_to_ms;

pub(crate) const TARGET: &str = "telemetry::relay";
pub(crate) const EVENT_OUTPUT_DROPPED: &str = "relay_output_dropped";
pub(crate) const EVENT_STALE_AUDIO: &str = "relay_stale_audio";
pub(crate) const EVENT_INTERRUPTION: &str = "relay_interruption";
pub(crate) const EVENT_LATENCY: &str = "relay_keepalive_latency";
pub(crate) const EVENT_PHASE: &str = "relay_session_phase";

#[derive(Debug, Serialize)]
pub struct OutputDroppedEvent {
    pub adapter: &'static str,
    pub reason: &'static str,
    pub bytes: usize,
}

#[derive(Debug, Serialize)]
pub struct StaleAudioEvent<'a> {
    pub conversation_id: Option<&'a str>,
    pub event_id: u64,
    pub interrupt_marker: u64,
}

#[derive(Debug, Serialize)]
pub struct InterruptionEvent<'a> {
    pub conversation_id: Option<&'a str>,
    pub event_id: u64,
    pub previous_marker: u64,
}

#[derive(Debug, Serialize)]
pub struct KeepAliveLatencyEvent<'a> {
    pub conversation_id: Option<&'a str>,
    pub event_id: u64,
    pub latency_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionPhaseEvent<'a> {
    pub agent_id: &'a str,
    pub conversation_id: Option<&'a str>,
    pub from: &'static str,
    pub to: &'static str,
    pub elapsed_ms: u64,
}

pub fn record_output_dropped(adapter: &'static str, reason: &'static str, bytes: usize) {
    let event = OutputDroppedEvent {
        adapter,
        reason,
        bytes,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => warn!(
            target: TARGET,
            event = EVENT_OUTPUT_DROPPED,
            adapter = event.adapter,
            reason = event.reason,
            bytes = event.bytes,
            payload = %payload,
            "dropping output audio chunk"
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_OUTPUT_DROPPED,
            %err,
            "failed to encode output drop event"
        ),
    }
}

pub fn record_stale_audio_discarded(
    conversation_id: Option<&str>,
    event_id: u64,
    interrupt_marker: u64,
) {
    let event = StaleAudioEvent {
        conversation_id,
        event_id,
        interrupt_marker,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => debug!(
            target: TARGET,
            event = EVENT_STALE_AUDIO,
            event_id = event.event_id,
            interrupt_marker = event.interrupt_marker,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_STALE_AUDIO,
            %err,
            "failed to encode stale audio event"
        ),
    }
}

pub fn record_interruption(conversation_id: Option<&str>, event_id: u64, previous_marker: u64) {
    let event = InterruptionEvent {
        conversation_id,
        event_id,
        previous_marker,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_INTERRUPTION,
            event_id = event.event_id,
            previous_marker = event.previous_marker,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_INTERRUPTION,
            %err,
            "failed to encode interruption event"
        ),
    }
}

pub fn record_keepalive_latency(conversation_id: Option<&str>, event_id: u64, latency_ms: u64) {
    let event = KeepAliveLatencyEvent {
        conversation_id,
        event_id,
        latency_ms,
    };

    match serde_json::to_string(&event) {
        Ok(payload) => debug!(
            target: TARGET,
            event = EVENT_LATENCY,
            event_id = event.event_id,
            latency_ms = event.latency_ms,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_LATENCY,
            %err,
            "failed to encode keep-alive latency event"
        ),
    }
}

pub fn record_session_phase(
    agent_id: &str,
    conversation_id: Option<&str>,
    from: &'static str,
    to: &'static str,
    elapsed: Duration,
) {
    let event = SessionPhaseEvent {
        agent_id,
        conversation_id,
        from,
        to,
        elapsed_ms: duration_to_ms(elapsed),
    };

    match serde_json::to_string(&event) {
        Ok(payload) => info!(
            target: TARGET,
            event = EVENT_PHASE,
            from = event.from,
            to = event.to,
            elapsed_ms = event.elapsed_ms,
            payload = %payload
        ),
        Err(err) => warn!(
            target: TARGET,
            event = EVENT_PHASE,
            %err,
            "failed to encode session phase event"
        ),
    }
}
