use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::AudioInterface;
use crate::error::RelayError;
use crate::orchestrator::callbacks::ConversationCallbacks;
use crate::orchestrator::channel::{AgentChannel, AgentConnection, AgentConnector};
use crate::orchestrator::config::ConversationConfig;
use crate::orchestrator::endpoint::resolve_agent_url;
use crate::orchestrator::runtime::{self, EventDispatcher, SessionContext};
use crate::session::lifecycle::{SessionLifecycleUpdate, SessionPhase};
use crate::util::lock;

const TARGET: &str = "conversation";

/// One agent conversation bound to one audio interface.
pub struct Conversation {
    config: ConversationConfig,
    audio: Arc<dyn AudioInterface>,
    callbacks: ConversationCallbacks,
    context: Arc<SessionContext>,
    channel: Mutex<Option<Arc<dyn AgentChannel>>>,
    shutdown: Arc<Notify>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl Conversation {
    pub fn new(
        config: ConversationConfig,
        audio: Arc<dyn AudioInterface>,
        callbacks: ConversationCallbacks,
    ) -> Self {
        let context = Arc::new(SessionContext::new(config.agent_id.clone()));
        Self {
            config,
            audio,
            callbacks,
            context,
            channel: Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
            receiver: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.context.phase()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.context.conversation_id()
    }

    pub fn interrupt_marker(&self) -> u64 {
        self.context.interrupt_marker()
    }

    pub fn subscribe_lifecycle(&self) -> broadcast::Receiver<SessionLifecycleUpdate> {
        self.context.subscribe_lifecycle()
    }

    /// Opens the agent channel, starts the audio interface and then the
    /// receive loop. Can be called once.
    pub async fn start_session(&self, connector: &dyn AgentConnector) -> Result<()> {
        if !self.context.transition(SessionPhase::Connecting) {
            return Err(anyhow!("conversation session was already started"));
        }

        let connection = match self.connect(connector).await {
            Ok(connection) => connection,
            Err(err) => {
                error!(
                    target: TARGET,
                    agent_id = %self.config.agent_id,
                    %err,
                    "failed to open agent channel"
                );
                self.context.terminate();
                self.context.transition(SessionPhase::Closed);
                return Err(err);
            }
        };

        let channel = connection.channel;
        {
            // end_session checks the slot under the same lock.
            let mut slot = lock(&self.channel);
            if self.context.is_terminated() {
                drop(slot);
                debug!(target: TARGET, "session ended while connecting");
                channel.close();
                self.context.transition(SessionPhase::Closed);
                return Ok(());
            }
            *slot = Some(Arc::clone(&channel));
        }
        info!(target: TARGET, agent_id = %self.config.agent_id, "agent channel established");

        let input = runtime::agent_input(Arc::clone(&self.context), Arc::clone(&channel));
        debug!(target: TARGET, "starting audio interface");
        if let Err(err) = self.audio.start(input).await {
            let ended = self.context.is_terminated();
            self.end_session();
            self.context.transition(SessionPhase::Closed);
            if ended {
                debug!(target: TARGET, %err, "audio interface stopped while starting");
                return Ok(());
            }
            warn!(target: TARGET, %err, "audio interface failed to start");
            return Err(err);
        }

        let dispatcher = EventDispatcher::new(
            Arc::clone(&self.context),
            Arc::clone(&self.audio),
            self.callbacks.clone(),
            Arc::clone(&channel),
        );
        let receiver = runtime::spawn_receiver(
            dispatcher,
            connection.inbound,
            Arc::clone(&self.shutdown),
            Arc::clone(&self.context),
            Arc::clone(&self.audio),
            channel,
        );
        *lock(&self.receiver) = Some(receiver);
        Ok(())
    }

    async fn connect(&self, connector: &dyn AgentConnector) -> Result<AgentConnection> {
        let url = resolve_agent_url(&self.config).await?;
        connector.connect(&url).await
    }

    /// Stops audio and closes the agent channel. Safe to call repeatedly and
    /// from any task.
    pub fn end_session(&self) {
        if !self.context.terminate() {
            debug!(
                target: TARGET,
                err = %RelayError::SessionAlreadyClosed,
                "end_session ignored"
            );
            return;
        }

        info!(
            target: TARGET,
            agent_id = %self.config.agent_id,
            "ending conversation session"
        );
        self.context.transition(SessionPhase::Closing);
        self.audio.stop();

        // No channel yet: start_session sees the flag and closes whatever it
        // connects, and no receive loop will run to finish the transition.
        let channel = lock(&self.channel).clone();
        match channel {
            Some(channel) => {
                channel.close();
                self.shutdown.notify_one();
            }
            None => {
                self.context.transition(SessionPhase::Closed);
            }
        }
    }

    /// Resolves once the session is `Closed`, returning the conversation id
    /// the agent assigned, if any. Returns at once for a session that never
    /// started.
    pub async fn wait_for_session_end(&self) -> Option<String> {
        let mut phase = self.context.subscribe_phase();
        if *phase.borrow() != SessionPhase::Idle {
            let _ = phase.wait_for(|current| current.is_terminal()).await;
        }
        self.context.conversation_id()
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        if let Some(receiver) = lock(&self.receiver).take() {
            receiver.abort();
        }
    }
}
