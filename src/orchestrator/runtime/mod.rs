mod dispatch;
mod state;

pub(crate) use dispatch::EventDispatcher;
pub(crate) use state::SessionContext;

use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

use crate::audio::{AudioChunk, AudioInput, AudioInterface};
use crate::orchestrator::channel::AgentChannel;
use crate::orchestrator::types::OutboundFrame;
use crate::session::lifecycle::SessionPhase;

const TARGET: &str = "conversation";

/// Runs the agent receive loop until the channel closes or `shutdown` fires,
/// then drives the session to `Closed`.
pub(crate) fn spawn_receiver(
    dispatcher: EventDispatcher,
    mut inbound: mpsc::Receiver<String>,
    shutdown: Arc<Notify>,
    context: Arc<SessionContext>,
    audio: Arc<dyn AudioInterface>,
    channel: Arc<dyn AgentChannel>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    debug!(target: TARGET, "receive loop stopped by end_session");
                    break;
                }
                frame = inbound.recv() => match frame {
                    Some(text) => dispatcher.handle_frame(&text),
                    None => {
                        info!(target: TARGET, agent_id = context.agent_id(), "agent channel closed");
                        break;
                    }
                },
            }
        }

        // The agent hung up first; end_session has not run.
        if context.terminate() {
            context.transition(SessionPhase::Closing);
            audio.stop();
            channel.close();
        }
        context.transition(SessionPhase::Closed);
    })
}

/// Builds the input handle that forwards captured audio to the agent.
pub(crate) fn agent_input(
    context: Arc<SessionContext>,
    channel: Arc<dyn AgentChannel>,
) -> AudioInput {
    AudioInput::new(move |chunk: AudioChunk| {
        if context.is_terminated() || !channel.is_open() {
            trace!(target: TARGET, bytes = chunk.len(), "agent channel not open, skipping audio");
            return;
        }

        let sent = OutboundFrame::user_audio(chunk.to_base64())
            .encode()
            .and_then(|frame| channel.send(frame));
        if let Err(err) = sent {
            debug!(target: TARGET, %err, "failed to forward user audio");
        }
    })
}
