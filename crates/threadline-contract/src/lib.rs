//! Shared data model for AG-UI conversations: the conversation aggregate,
//! message variants, tool-call records, citation records and the run
//! lifecycle notification seam.
#![allow(missing_docs)]

pub mod citation;
pub mod lifecycle;
pub mod thread;

pub use citation::{MessageState, SourceReference};
pub use lifecycle::{NoopLifecycleSink, RunLifecycleSink};
pub use thread::{
    ChatUser, Conversation, ConversationStatus, Message, TextMessage, ToolCallInfo, ToolCallStatus,
};
