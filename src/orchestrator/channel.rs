use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RelayError;

/// Outbound half of the agent connection.
///
/// Implementations queue frames for a writer task; none of these calls wait
/// on the network.
pub trait AgentChannel: Send + Sync {
    fn send(&self, frame: String) -> Result<(), RelayError>;

    fn is_open(&self) -> bool;

    /// Starts closing the connection. Inbound frames stop once the peer has
    /// acknowledged or the socket is gone.
    fn close(&self);
}

/// An established agent connection. The inbound receiver ending means the
/// channel closed.
pub struct AgentConnection {
    pub channel: Arc<dyn AgentChannel>,
    pub inbound: mpsc::Receiver<String>,
}

#[async_trait]
pub trait AgentConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<AgentConnection>;
}

/// In-process agent channel. The returned [`AgentPeer`] plays the agent side.
pub fn memory_channel(capacity: usize) -> (AgentConnection, AgentPeer) {
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
    let open = Arc::new(AtomicBool::new(true));

    let channel = MemoryAgentChannel {
        outbound: outbound_tx,
        open: Arc::clone(&open),
    };
    let peer = AgentPeer {
        inbound: Some(inbound_tx),
        outbound: outbound_rx,
        open,
    };

    (
        AgentConnection {
            channel: Arc::new(channel),
            inbound: inbound_rx,
        },
        peer,
    )
}

struct MemoryAgentChannel {
    outbound: mpsc::UnboundedSender<String>,
    open: Arc<AtomicBool>,
}

impl AgentChannel for MemoryAgentChannel {
    fn send(&self, frame: String) -> Result<(), RelayError> {
        if !self.is_open() {
            return Err(RelayError::ChannelClosed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| RelayError::ChannelClosed)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Agent side of a [`memory_channel`].
pub struct AgentPeer {
    inbound: Option<mpsc::Sender<String>>,
    outbound: mpsc::UnboundedReceiver<String>,
    open: Arc<AtomicBool>,
}

impl AgentPeer {
    /// Delivers a frame to the session. Fails once the peer hung up.
    pub async fn send(&self, frame: impl Into<String>) -> Result<(), RelayError> {
        let Some(inbound) = self.inbound.as_ref() else {
            return Err(RelayError::ChannelClosed);
        };
        inbound
            .send(frame.into())
            .await
            .map_err(|_| RelayError::ChannelClosed)
    }

    /// Next frame the session sent, or `None` once it is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.outbound.try_recv().ok()
    }

    /// Whether the session side has closed the channel.
    pub fn is_closed_by_session(&self) -> bool {
        !self.open.load(Ordering::SeqCst)
    }

    /// Closes the channel from the agent side.
    pub fn hang_up(&mut self) {
        self.open.store(false, Ordering::SeqCst);
        self.inbound.take();
    }
}

/// Hands out a single prepared connection. Handy for hosts that open the
/// socket themselves.
pub struct PreparedConnector {
    connection: std::sync::Mutex<Option<AgentConnection>>,
}

impl PreparedConnector {
    pub fn new(connection: AgentConnection) -> Self {
        Self {
            connection: std::sync::Mutex::new(Some(connection)),
        }
    }
}

#[async_trait]
impl AgentConnector for PreparedConnector {
    async fn connect(&self, url: &str) -> Result<AgentConnection> {
        crate::util::lock(&self.connection)
            .take()
            .ok_or_else(|| anyhow::anyhow!("connection for {url} was already used"))
    }
}
