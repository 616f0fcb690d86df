use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::audio::{AudioChunk, AudioInterface};
use crate::orchestrator::callbacks::ConversationCallbacks;
use crate::orchestrator::channel::AgentChannel;
use crate::orchestrator::types::{AgentEvent, OutboundFrame, PingEvent};
use crate::session::lifecycle::SessionPhase;
use crate::telemetry::events::{
    record_interruption, record_keepalive_latency, record_stale_audio_discarded,
};

use super::state::SessionContext;

const TARGET: &str = "conversation";

/// Applies agent events to one session, strictly in arrival order.
pub(crate) struct EventDispatcher {
    context: Arc<SessionContext>,
    audio: Arc<dyn AudioInterface>,
    callbacks: ConversationCallbacks,
    channel: Arc<dyn AgentChannel>,
}

impl EventDispatcher {
    pub(crate) fn new(
        context: Arc<SessionContext>,
        audio: Arc<dyn AudioInterface>,
        callbacks: ConversationCallbacks,
        channel: Arc<dyn AgentChannel>,
    ) -> Self {
        Self {
            context,
            audio,
            callbacks,
            channel,
        }
    }

    pub(crate) fn handle_frame(&self, text: &str) {
        if self.context.is_terminated() {
            return;
        }

        match AgentEvent::parse(text) {
            Ok(event) => self.dispatch(event),
            Err(err) => warn!(
                target: TARGET,
                agent_id = self.context.agent_id(),
                %err,
                "dropping agent frame"
            ),
        }
    }

    pub(crate) fn dispatch(&self, event: AgentEvent) {
        if self.context.is_terminated() {
            return;
        }

        let phase = self.context.phase();
        let required = match event {
            AgentEvent::ConversationInitiationMetadata { .. } => SessionPhase::Connecting,
            AgentEvent::Unknown => {
                debug!(target: TARGET, "ignoring unknown agent event");
                return;
            }
            _ => SessionPhase::Active,
        };
        if phase != required {
            warn!(
                target: TARGET,
                event = event.label(),
                phase = phase.as_str(),
                "agent event arrived out of phase"
            );
            return;
        }

        match event {
            AgentEvent::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: metadata,
            } => {
                info!(
                    target: TARGET,
                    agent_id = self.context.agent_id(),
                    conversation_id = %metadata.conversation_id,
                    "conversation started"
                );
                self.context.set_conversation_id(metadata.conversation_id);
                self.context.reset_interrupt_marker();
                self.context.transition(SessionPhase::Active);
            }
            AgentEvent::Audio { audio_event } => {
                if self.context.is_stale(audio_event.event_id) {
                    record_stale_audio_discarded(
                        self.context.conversation_id().as_deref(),
                        audio_event.event_id,
                        self.context.interrupt_marker(),
                    );
                    return;
                }
                match AudioChunk::from_base64(&audio_event.audio_base_64) {
                    Ok(chunk) => self.audio.output(chunk),
                    Err(err) => warn!(
                        target: TARGET,
                        event_id = audio_event.event_id,
                        %err,
                        "dropping agent audio"
                    ),
                }
            }
            AgentEvent::AgentResponse {
                agent_response_event,
            } => self
                .callbacks
                .agent_response(&agent_response_event.agent_response),
            AgentEvent::AgentResponseCorrection {
                agent_response_correction_event: correction,
            } => self.callbacks.agent_response_correction(
                &correction.original_agent_response,
                &correction.corrected_agent_response,
            ),
            AgentEvent::UserTranscript {
                user_transcript_event,
            } => self
                .callbacks
                .user_transcript(&user_transcript_event.user_transcript),
            AgentEvent::Interruption { interruption_event } => {
                let previous = self.context.accept_interrupt(interruption_event.event_id);
                record_interruption(
                    self.context.conversation_id().as_deref(),
                    interruption_event.event_id,
                    previous,
                );
                self.audio.interrupt();
            }
            AgentEvent::Ping { ping_event } => self.handle_ping(ping_event),
            AgentEvent::Unknown => {}
        }
    }

    fn handle_ping(&self, ping: PingEvent) {
        if self.channel.is_open() {
            let sent = OutboundFrame::pong(ping.event_id)
                .encode()
                .and_then(|frame| self.channel.send(frame));
            if let Err(err) = sent {
                debug!(target: TARGET, event_id = ping.event_id, %err, "pong not sent");
            }
        }

        if let Some(latency_ms) = ping.ping_ms {
            record_keepalive_latency(
                self.context.conversation_id().as_deref(),
                ping.event_id,
                latency_ms,
            );
            if self.callbacks.wants_latency() {
                self.callbacks.latency_measurement(latency_ms);
            }
        }
    }
}
