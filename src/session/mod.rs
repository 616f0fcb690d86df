//! 通话桥接：一个电话媒体流对应一个智能体会话。

pub mod lifecycle;

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::orchestrator::{AgentConnector, Conversation, ConversationCallbacks, ConversationConfig};
use crate::session::lifecycle::{SessionLifecycleUpdate, SessionPhase};
use crate::transport::telephony::TelephonyAudioInterface;
use crate::transport::{StreamBinding, TransportEnvelope, TransportSink};
use crate::util::lock;

const TARGET: &str = "call_session";

/// Bridges one accepted transport connection to one agent conversation.
pub struct CallSession {
    audio: Arc<TelephonyAudioInterface>,
    conversation: Arc<Conversation>,
    starter: Mutex<Option<JoinHandle<()>>>,
}

impl CallSession {
    /// Wires a telephony adapter to a new conversation and starts the session
    /// on the current runtime. Must be called from within a tokio runtime.
    pub fn accept(
        config: ConversationConfig,
        transport: Arc<dyn TransportSink>,
        connector: Arc<dyn AgentConnector>,
        callbacks: Option<ConversationCallbacks>,
    ) -> Self {
        let agent_id = config.agent_id.clone();
        let audio = Arc::new(TelephonyAudioInterface::new(transport));
        let conversation = Arc::new(Conversation::new(
            config,
            audio.clone(),
            callbacks.unwrap_or_else(Self::default_callbacks),
        ));

        info!(target: TARGET, %agent_id, "transport connection accepted");
        let starter = {
            let conversation = Arc::clone(&conversation);
            tokio::spawn(async move {
                if let Err(err) = conversation.start_session(connector.as_ref()).await {
                    error!(target: TARGET, %agent_id, %err, "conversation failed to start");
                }
            })
        };

        Self {
            audio,
            conversation,
            starter: Mutex::new(Some(starter)),
        }
    }

    /// Logs agent responses and user transcripts.
    pub fn default_callbacks() -> ConversationCallbacks {
        ConversationCallbacks::new()
            .on_agent_response(|text| info!(target: TARGET, "Agent said: {text}"))
            .on_agent_response_correction(|original, corrected| {
                info!(target: TARGET, "Agent corrected: {original} -> {corrected}")
            })
            .on_user_transcript(|text| info!(target: TARGET, "User said: {text}"))
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn phase(&self) -> SessionPhase {
        self.conversation.phase()
    }

    pub fn stream_binding(&self) -> Option<StreamBinding> {
        self.audio.stream_binding()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<SessionLifecycleUpdate> {
        self.conversation.subscribe_lifecycle()
    }

    /// Routes one text frame from the transport into the telephony adapter.
    /// A stop envelope ends the conversation.
    pub fn handle_transport_frame(&self, text: &str) {
        let envelope = match TransportEnvelope::parse(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(target: TARGET, %err, "dropping transport frame");
                return;
            }
        };

        let stop = matches!(envelope, TransportEnvelope::Stop { .. });
        self.audio.handle_envelope(envelope);
        if stop {
            self.conversation.end_session();
        }
    }

    /// Ends the conversation and waits for it to close. Returns the
    /// conversation id the agent assigned, if any. Does not wait on an agent
    /// connect that is still pending.
    pub async fn close(&self) -> Option<String> {
        self.conversation.end_session();
        let conversation_id = self.conversation.wait_for_session_end().await;
        self.abort_starter();
        info!(
            target: TARGET,
            conversation_id = conversation_id.as_deref().unwrap_or("-"),
            "call session closed"
        );
        conversation_id
    }

    fn abort_starter(&self) {
        if let Some(starter) = lock(&self.starter).take() {
            if !starter.is_finished() {
                debug!(target: TARGET, "abandoning pending agent connect");
                starter.abort();
            }
        }
    }
}

impl Drop for CallSession {
    fn drop(&mut self) {
        self.conversation.end_session();
        self.abort_starter();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioChunk;
    use crate::orchestrator::channel::PreparedConnector;
    use crate::orchestrator::{memory_channel, AgentPeer};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    struct Call {
        session: CallSession,
        peer: AgentPeer,
        transport: mpsc::UnboundedReceiver<String>,
    }

    fn accept(callbacks: Option<ConversationCallbacks>) -> Call {
        let (tx, transport) = mpsc::unbounded_channel::<String>();
        let (connection, peer) = memory_channel(16);
        let session = CallSession::accept(
            ConversationConfig::new("agent_call"),
            Arc::new(tx),
            Arc::new(PreparedConnector::new(connection)),
            callbacks,
        );
        Call {
            session,
            peer,
            transport,
        }
    }

    async fn recv_json(peer: &mut AgentPeer) -> Value {
        let frame = timeout(Duration::from_secs(1), peer.recv())
            .await
            .expect("frame in time")
            .expect("channel open");
        serde_json::from_str(&frame).expect("frame is json")
    }

    async fn activate(call: &mut Call) {
        call.peer
            .send(
                json!({
                    "type": "conversation_initiation_metadata",
                    "conversation_initiation_metadata_event": {"conversation_id": "call-1"}
                })
                .to_string(),
            )
            .await
            .expect("metadata delivered");
        call.peer
            .send(r#"{"type":"ping","ping_event":{"event_id":1}}"#)
            .await
            .expect("ping delivered");
        assert_eq!(
            recv_json(&mut call.peer).await,
            json!({"type": "pong", "event_id": 1})
        );
        assert_eq!(call.session.phase(), SessionPhase::Active);
    }

    #[tokio::test]
    async fn media_is_relayed_both_ways() {
        let mut call = accept(None);
        activate(&mut call).await;

        call.session
            .handle_transport_frame(r#"{"event":"start","start":{"streamSid":"MZ1"}}"#);
        call.session
            .handle_transport_frame(r#"{"event":"media","media":{"payload":"AAE="}}"#);
        assert_eq!(
            recv_json(&mut call.peer).await,
            json!({"user_audio_chunk": "AAE="})
        );

        let chunk = AudioChunk::new(vec![9_u8, 9]).expect("chunk");
        call.peer
            .send(
                json!({
                    "type": "audio",
                    "audio_event": {"event_id": 1, "audio_base_64": chunk.to_base64()}
                })
                .to_string(),
            )
            .await
            .expect("audio delivered");
        let frame = timeout(Duration::from_secs(1), call.transport.recv())
            .await
            .expect("media in time")
            .expect("transport open");
        assert_eq!(
            serde_json::from_str::<Value>(&frame).expect("json"),
            json!({"event": "media", "streamSid": "MZ1", "media": {"payload": "CQk="}})
        );
        assert_eq!(
            call.session.stream_binding().map(|b| b.to_string()).as_deref(),
            Some("MZ1")
        );
    }

    #[tokio::test]
    async fn stop_envelope_ends_the_conversation() {
        let mut call = accept(None);
        activate(&mut call).await;

        call.session.handle_transport_frame(r#"{"event":"stop"}"#);

        let conversation_id = timeout(Duration::from_secs(1), call.session.close())
            .await
            .expect("session closes");
        assert_eq!(conversation_id.as_deref(), Some("call-1"));
        assert_eq!(call.session.phase(), SessionPhase::Closed);
        assert!(call.peer.is_closed_by_session());
    }

    #[tokio::test]
    async fn malformed_transport_frames_are_dropped() {
        let mut call = accept(None);
        activate(&mut call).await;

        call.session.handle_transport_frame("{not json");
        call.session
            .handle_transport_frame(r#"{"event":"media","media":{"payload":"%%"}}"#);

        assert_eq!(call.session.phase(), SessionPhase::Active);
        assert!(call.peer.try_recv().is_none());
    }

    #[tokio::test]
    async fn custom_callbacks_replace_the_logging_defaults() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let store = Arc::clone(&seen);
        let callbacks = ConversationCallbacks::new().on_user_transcript(move |text| {
            store
                .lock()
                .expect("seen lock poisoned")
                .push(text.to_string());
        });
        let mut call = accept(Some(callbacks));
        activate(&mut call).await;

        call.peer
            .send(
                json!({
                    "type": "user_transcript",
                    "user_transcription_event": {"user_transcript": " hello "}
                })
                .to_string(),
            )
            .await
            .expect("transcript delivered");
        call.peer.hang_up();

        let conversation_id = timeout(Duration::from_secs(1), call.session.close())
            .await
            .expect("session closes");
        assert_eq!(conversation_id.as_deref(), Some("call-1"));
        assert_eq!(*seen.lock().expect("seen lock poisoned"), vec!["hello"]);
    }

    #[tokio::test]
    async fn close_before_the_agent_answers() {
        let mut call = accept(None);

        let conversation_id = timeout(Duration::from_secs(1), call.session.close())
            .await
            .expect("session closes");
        assert_eq!(conversation_id, None);
        assert_eq!(call.session.phase(), SessionPhase::Closed);

        let outbound = timeout(Duration::from_secs(1), call.peer.recv())
            .await
            .expect("agent side released");
        assert!(outbound.is_none());
    }

    struct StalledConnector;

    #[async_trait::async_trait]
    impl AgentConnector for StalledConnector {
        async fn connect(&self, _url: &str) -> anyhow::Result<crate::orchestrator::AgentConnection> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn close_does_not_wait_for_a_stalled_connect() {
        let (tx, _transport) = mpsc::unbounded_channel::<String>();
        let session = CallSession::accept(
            ConversationConfig::new("agent_call"),
            Arc::new(tx),
            Arc::new(StalledConnector),
            None,
        );
        tokio::task::yield_now().await;
        assert_eq!(session.phase(), SessionPhase::Connecting);

        let conversation_id = timeout(Duration::from_millis(500), session.close())
            .await
            .expect("close returns while connect is pending");
        assert_eq!(conversation_id, None);
        assert_eq!(session.phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn stop_envelope_during_connect_closes_the_session() {
        let (tx, _transport) = mpsc::unbounded_channel::<String>();
        let session = CallSession::accept(
            ConversationConfig::new("agent_call"),
            Arc::new(tx),
            Arc::new(StalledConnector),
            None,
        );
        tokio::task::yield_now().await;

        session.handle_transport_frame(r#"{"event":"stop"}"#);

        assert_eq!(session.phase(), SessionPhase::Closed);
    }
}
