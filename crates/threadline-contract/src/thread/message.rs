use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored a text message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatUser {
    User,
    #[default]
    Assistant,
    System,
}

/// A text message, streamed or complete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextMessage {
    pub id: String,
    pub author: ChatUser,
    pub text: String,
    /// True while content deltas are still being appended.
    #[serde(default)]
    pub is_streaming: bool,
    /// Reasoning text shown separately from `text`.
    #[serde(default)]
    pub thinking_text: String,
}

impl TextMessage {
    /// Create a finished user message.
    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: ChatUser::User,
            text: text.into(),
            is_streaming: false,
            thinking_text: String::new(),
        }
    }

    /// Create a finished assistant message.
    pub fn assistant(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: ChatUser::Assistant,
            text: text.into(),
            is_streaming: false,
            thinking_text: String::new(),
        }
    }

    /// Create an empty assistant message that is about to receive deltas.
    pub fn streaming(id: impl Into<String>, thinking_text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author: ChatUser::Assistant,
            text: String::new(),
            is_streaming: true,
            thinking_text: thinking_text.into(),
        }
    }

    #[must_use]
    pub fn finalized(mut self) -> Self {
        self.is_streaming = false;
        self
    }

    pub fn is_assistant(&self) -> bool {
        self.author == ChatUser::Assistant
    }
}

/// Lifecycle of one tool call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Arguments are still arriving.
    Streaming,
    /// Arguments are complete; waiting to run.
    Pending,
    /// A client-side executor is running the tool.
    Executing,
    Completed,
    Failed,
}

impl ToolCallStatus {
    /// Whether the call can still make progress.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ToolCallStatus::Streaming | ToolCallStatus::Pending | ToolCallStatus::Executing
        )
    }
}

/// Historical record of a tool call within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCallInfo {
    pub id: String,
    pub name: String,
    /// Accumulated JSON argument text.
    #[serde(default)]
    pub arguments: String,
    pub status: ToolCallStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

impl ToolCallInfo {
    /// A call whose arguments have started streaming.
    pub fn streaming(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: String::new(),
            status: ToolCallStatus::Streaming,
            result: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: ToolCallStatus) -> Self {
        self.status = status;
        self
    }
}

/// A conversation entry.
///
/// Two messages are equal when they are the same variant with the same id;
/// content is not compared.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    Text(TextMessage),
    Error {
        id: String,
        text: String,
    },
    ToolCall {
        id: String,
        calls: Vec<ToolCallInfo>,
    },
    GenUi {
        id: String,
        widget_name: String,
        data: Value,
    },
    Loading {
        id: String,
    },
}

impl Message {
    pub fn id(&self) -> &str {
        match self {
            Message::Text(msg) => &msg.id,
            Message::Error { id, .. }
            | Message::ToolCall { id, .. }
            | Message::GenUi { id, .. }
            | Message::Loading { id } => id,
        }
    }

    /// Variant name, as used in the serialized `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Text(_) => "text",
            Message::Error { .. } => "error",
            Message::ToolCall { .. } => "tool_call",
            Message::GenUi { .. } => "gen_ui",
            Message::Loading { .. } => "loading",
        }
    }

    pub fn as_text(&self) -> Option<&TextMessage> {
        match self {
            Message::Text(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut TextMessage> {
        match self {
            Message::Text(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn error(id: impl Into<String>, text: impl Into<String>) -> Self {
        Message::Error {
            id: id.into(),
            text: text.into(),
        }
    }

    pub fn loading(id: impl Into<String>) -> Self {
        Message::Loading { id: id.into() }
    }
}

impl From<TextMessage> for Message {
    fn from(msg: TextMessage) -> Self {
        Message::Text(msg)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.kind() == other.kind() && self.id() == other.id()
    }
}

impl Eq for Message {}
