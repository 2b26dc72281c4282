//! Conversation model: messages, tool calls, run status.

pub mod conversation;
pub mod message;
pub mod status;

pub use conversation::Conversation;
pub use message::{ChatUser, Message, TextMessage, ToolCallInfo, ToolCallStatus};
pub use status::ConversationStatus;
