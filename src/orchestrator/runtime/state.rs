use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::session::lifecycle::{SessionLifecycleUpdate, SessionPhase};
use crate::telemetry::events::record_session_phase;
use crate::util::lock;

const TARGET: &str = "conversation";

/// Per-session state shared by the conversation, its receive task and the
/// input handle. Nothing here is shared across sessions.
pub(crate) struct SessionContext {
    agent_id: String,
    conversation_id: Mutex<Option<String>>,
    interrupt_marker: AtomicU64,
    terminated: AtomicBool,
    phase_tx: watch::Sender<SessionPhase>,
    lifecycle_tx: broadcast::Sender<SessionLifecycleUpdate>,
    started_at: Instant,
}

impl SessionContext {
    pub(crate) fn new(agent_id: String) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Idle);
        let (lifecycle_tx, _) = broadcast::channel(16);
        Self {
            agent_id,
            conversation_id: Mutex::new(None),
            interrupt_marker: AtomicU64::new(0),
            terminated: AtomicBool::new(false),
            phase_tx,
            lifecycle_tx,
            started_at: Instant::now(),
        }
    }

    pub(crate) fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub(crate) fn phase(&self) -> SessionPhase {
        *self.phase_tx.borrow()
    }

    pub(crate) fn subscribe_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    pub(crate) fn subscribe_lifecycle(&self) -> broadcast::Receiver<SessionLifecycleUpdate> {
        self.lifecycle_tx.subscribe()
    }

    /// Moves the session forward to `next`. Returns `false` when the session
    /// is already at or past that phase.
    pub(crate) fn transition(&self, next: SessionPhase) -> bool {
        let mut previous = None;
        self.phase_tx.send_if_modified(|current| {
            if next > *current {
                previous = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });

        let Some(previous) = previous else {
            debug!(
                target: TARGET,
                phase = next.as_str(),
                current = self.phase().as_str(),
                "ignoring phase transition"
            );
            return false;
        };

        let conversation_id = self.conversation_id();
        record_session_phase(
            &self.agent_id,
            conversation_id.as_deref(),
            previous.as_str(),
            next.as_str(),
            self.started_at.elapsed(),
        );

        if self.lifecycle_tx.receiver_count() > 0 {
            let _ = self.lifecycle_tx.send(SessionLifecycleUpdate::new(
                self.agent_id.clone(),
                conversation_id,
                previous,
                next,
            ));
        }
        true
    }

    pub(crate) fn conversation_id(&self) -> Option<String> {
        lock(&self.conversation_id).clone()
    }

    pub(crate) fn set_conversation_id(&self, conversation_id: String) {
        *lock(&self.conversation_id) = Some(conversation_id);
    }

    pub(crate) fn interrupt_marker(&self) -> u64 {
        self.interrupt_marker.load(Ordering::SeqCst)
    }

    /// Raises the marker to `event_id` and returns the previous value. The
    /// marker never moves backwards.
    pub(crate) fn accept_interrupt(&self, event_id: u64) -> u64 {
        self.interrupt_marker.fetch_max(event_id, Ordering::SeqCst)
    }

    pub(crate) fn reset_interrupt_marker(&self) {
        self.interrupt_marker.store(0, Ordering::SeqCst);
    }

    /// Audio at or below the marker was superseded by an interruption.
    pub(crate) fn is_stale(&self, event_id: u64) -> bool {
        event_id <= self.interrupt_marker()
    }

    /// Sets the termination flag. Returns `true` for the first caller only.
    pub(crate) fn terminate(&self) -> bool {
        !self.terminated.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}
