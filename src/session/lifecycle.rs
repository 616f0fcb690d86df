//! 会话生命周期广播负载定义。

use std::time::SystemTime;

/// 会话状态机的阶段划分。阶段只会前进。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionPhase {
    Idle,
    Connecting,
    Active,
    Closing,
    Closed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::Active => "active",
            SessionPhase::Closing => "closing",
            SessionPhase::Closed => "closed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Closed)
    }
}

/// 生命周期事件。
#[derive(Debug, Clone)]
pub struct SessionLifecycleUpdate {
    pub agent_id: String,
    pub conversation_id: Option<String>,
    pub previous: SessionPhase,
    pub phase: SessionPhase,
    pub issued_at: SystemTime,
}

impl SessionLifecycleUpdate {
    pub fn new<S: Into<String>>(
        agent_id: S,
        conversation_id: Option<String>,
        previous: SessionPhase,
        phase: SessionPhase,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            conversation_id,
            previous,
            phase,
            issued_at: SystemTime::now(),
        }
    }
}
