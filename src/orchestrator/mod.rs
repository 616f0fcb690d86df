//! 智能体会话编排：协议状态机与事件分发。

mod callbacks;
mod constants;
mod conversation;
mod runtime;

pub mod channel;
pub mod config;
pub mod endpoint;
pub mod types;

pub use callbacks::ConversationCallbacks;
pub use channel::{memory_channel, AgentChannel, AgentConnection, AgentConnector, AgentPeer};
pub use config::ConversationConfig;
pub use conversation::Conversation;
pub use types::{AgentEvent, OutboundFrame};
