use serde::{Deserialize, Deserializer, Serialize};

use crate::error::RelayError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InitiationMetadata {
    pub conversation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AudioEvent {
    #[serde(deserialize_with = "event_id")]
    pub event_id: u64,
    pub audio_base_64: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentResponseEvent {
    #[serde(default, deserialize_with = "optional_event_id")]
    pub event_id: Option<u64>,
    pub agent_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgentResponseCorrectionEvent {
    #[serde(default, deserialize_with = "optional_event_id")]
    pub event_id: Option<u64>,
    pub original_agent_response: String,
    pub corrected_agent_response: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserTranscriptEvent {
    #[serde(default, deserialize_with = "optional_event_id")]
    pub event_id: Option<u64>,
    pub user_transcript: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InterruptionEvent {
    #[serde(deserialize_with = "event_id")]
    pub event_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PingEvent {
    #[serde(deserialize_with = "event_id")]
    pub event_id: u64,
    #[serde(default, deserialize_with = "optional_event_id")]
    pub ping_ms: Option<u64>,
}

/// Frames received from the agent, keyed by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: InitiationMetadata,
    },
    Audio {
        audio_event: AudioEvent,
    },
    AgentResponse {
        agent_response_event: AgentResponseEvent,
    },
    AgentResponseCorrection {
        agent_response_correction_event: AgentResponseCorrectionEvent,
    },
    UserTranscript {
        #[serde(alias = "user_transcription_event")]
        user_transcript_event: UserTranscriptEvent,
    },
    Interruption {
        interruption_event: InterruptionEvent,
    },
    Ping {
        ping_event: PingEvent,
    },
    #[serde(other)]
    Unknown,
}

impl AgentEvent {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text)
            .map_err(|err| RelayError::malformed(format!("agent frame: {err}")))
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgentEvent::ConversationInitiationMetadata { .. } => "conversation_initiation_metadata",
            AgentEvent::Audio { .. } => "audio",
            AgentEvent::AgentResponse { .. } => "agent_response",
            AgentEvent::AgentResponseCorrection { .. } => "agent_response_correction",
            AgentEvent::UserTranscript { .. } => "user_transcript",
            AgentEvent::Interruption { .. } => "interruption",
            AgentEvent::Ping { .. } => "ping",
            AgentEvent::Unknown => "unknown",
        }
    }
}

/// Frames sent to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    UserAudio { user_audio_chunk: String },
    Pong(PongFrame),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename = "pong")]
pub struct PongFrame {
    pub event_id: u64,
}

impl OutboundFrame {
    pub fn user_audio(encoded: String) -> Self {
        OutboundFrame::UserAudio {
            user_audio_chunk: encoded,
        }
    }

    pub fn pong(event_id: u64) -> Self {
        OutboundFrame::Pong(PongFrame { event_id })
    }

    pub fn encode(&self) -> Result<String, RelayError> {
        serde_json::to_string(self)
            .map_err(|err| RelayError::malformed(format!("outbound frame: {err}")))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Float(f64),
    Text(String),
}

impl NumberOrText {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            NumberOrText::Number(value) => Ok(value),
            NumberOrText::Float(value) if value.is_finite() && value >= 0.0 => {
                Ok(value.round() as u64)
            }
            NumberOrText::Float(value) => Err(E::custom(format!("invalid number: {value}"))),
            NumberOrText::Text(text) => text
                .trim()
                .parse::<u64>()
                .map_err(|err| E::custom(format!("invalid integer {text:?}: {err}"))),
        }
    }
}

fn event_id<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    NumberOrText::deserialize(deserializer)?.into_u64()
}

fn optional_event_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<NumberOrText>::deserialize(deserializer)? {
        Some(value) => value.into_u64().map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_initiation_metadata() {
        let event = AgentEvent::parse(
            r#"{"type":"conversation_initiation_metadata","conversation_initiation_metadata_event":{"conversation_id":"abc123","agent_output_audio_format":"pcm_16000"}}"#,
        )
        .expect("metadata parses");

        assert_eq!(
            event,
            AgentEvent::ConversationInitiationMetadata {
                conversation_initiation_metadata_event: InitiationMetadata {
                    conversation_id: "abc123".into(),
                },
            }
        );
    }

    #[test]
    fn event_ids_accept_numbers_and_strings() {
        let numeric = AgentEvent::parse(
            r#"{"type":"interruption","interruption_event":{"event_id":10}}"#,
        )
        .expect("numeric id");
        let textual = AgentEvent::parse(
            r#"{"type":"interruption","interruption_event":{"event_id":"10"}}"#,
        )
        .expect("string id");

        assert_eq!(numeric, textual);
    }

    #[test]
    fn ping_latency_is_optional() {
        let with_latency = AgentEvent::parse(
            r#"{"type":"ping","ping_event":{"event_id":"42","ping_ms":"120"}}"#,
        )
        .expect("ping parses");
        let without_latency =
            AgentEvent::parse(r#"{"type":"ping","ping_event":{"event_id":43,"ping_ms":null}}"#)
                .expect("ping parses");

        assert_eq!(
            with_latency,
            AgentEvent::Ping {
                ping_event: PingEvent {
                    event_id: 42,
                    ping_ms: Some(120),
                },
            }
        );
        assert_eq!(
            without_latency,
            AgentEvent::Ping {
                ping_event: PingEvent {
                    event_id: 43,
                    ping_ms: None,
                },
            }
        );
    }

    #[test]
    fn user_transcript_accepts_transcription_key() {
        let event = AgentEvent::parse(
            r#"{"type":"user_transcript","user_transcription_event":{"user_transcript":" hi "}}"#,
        )
        .expect("transcript parses");

        match event {
            AgentEvent::UserTranscript {
                user_transcript_event,
            } => assert_eq!(user_transcript_event.user_transcript, " hi "),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn unknown_types_are_tolerated() {
        let event = AgentEvent::parse(r#"{"type":"vad_score","vad_score_event":{"vad_score":0.4}}"#)
            .expect("unknown parses");
        assert_eq!(event, AgentEvent::Unknown);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        let err = AgentEvent::parse(
            r#"{"type":"audio","audio_event":{"event_id":"abc","audio_base_64":"AAE="}}"#,
        )
        .expect_err("bad id");
        assert_eq!(err.kind(), "malformed_frame");
    }

    #[test]
    fn outbound_frames_match_wire_format() {
        let pong = OutboundFrame::pong(42).encode().expect("pong encodes");
        let audio = OutboundFrame::user_audio("AAE=".into())
            .encode()
            .expect("audio encodes");

        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&pong).expect("json"),
            json!({"type": "pong", "event_id": 42})
        );
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&audio).expect("json"),
            json!({"user_audio_chunk": "AAE="})
        );
    }
}
