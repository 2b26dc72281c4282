//! The conversation aggregate.

use super::{ConversationStatus, Message, TextMessage, ToolCallInfo, ToolCallStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// The externally visible transcript of one thread.
///
/// Conversation uses an owned builder pattern: `with_*` methods consume `self`
/// and return the next value. Messages are Arc-wrapped, so cloning a
/// conversation to keep a snapshot is cheap and later edits copy only the
/// message they touch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub thread_id: String,
    /// Ordered messages; ids are unique.
    pub messages: Vec<Arc<Message>>,
    /// Every tool call seen in this thread, in start order.
    pub tool_calls: Vec<ToolCallInfo>,
    pub status: ConversationStatus,
    /// Latest application state (snapshot plus applied deltas).
    pub state: Value,
}

impl Conversation {
    /// Create an empty conversation for a thread.
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self::with_initial_state(thread_id, Value::Object(serde_json::Map::new()))
    }

    /// Create a conversation with initial state.
    pub fn with_initial_state(thread_id: impl Into<String>, state: Value) -> Self {
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            tool_calls: Vec::new(),
            status: ConversationStatus::Idle,
            state,
        }
    }

    /// Insert a message, replacing the existing one with the same id in place.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<Message>) -> Self {
        self.upsert_message(msg);
        self
    }

    /// In-place form of [`Conversation::with_message`].
    pub fn upsert_message(&mut self, msg: impl Into<Message>) {
        let msg = msg.into();
        match self.messages.iter().position(|m| m.id() == msg.id()) {
            Some(pos) => self.messages[pos] = Arc::new(msg),
            None => self.messages.push(Arc::new(msg)),
        }
    }

    /// Insert multiple messages in order.
    #[must_use]
    pub fn with_messages(self, msgs: impl IntoIterator<Item = Message>) -> Self {
        msgs.into_iter().fold(self, Conversation::with_message)
    }

    /// Edit the text message with `id` in place, copying it first if a
    /// snapshot still shares it. Returns false when no such text message exists.
    pub fn update_text(&mut self, id: &str, edit: impl FnOnce(&mut TextMessage)) -> bool {
        let Some(slot) = self
            .messages
            .iter_mut()
            .find(|m| m.id() == id && m.as_text().is_some())
        else {
            return false;
        };
        if let Some(text) = Arc::make_mut(slot).as_text_mut() {
            edit(text);
        }
        true
    }

    #[must_use]
    pub fn with_status(mut self, status: ConversationStatus) -> Self {
        self.status = status;
        self
    }

    /// Insert a tool call, replacing an existing record with the same id.
    #[must_use]
    pub fn with_tool_call(mut self, call: ToolCallInfo) -> Self {
        self.upsert_tool_call(call);
        self
    }

    pub fn upsert_tool_call(&mut self, call: ToolCallInfo) {
        match self.tool_calls.iter().position(|c| c.id == call.id) {
            Some(pos) => self.tool_calls[pos] = call,
            None => self.tool_calls.push(call),
        }
    }

    /// Set the status of a recorded tool call. Unknown ids are ignored.
    #[must_use]
    pub fn with_tool_call_status(mut self, id: &str, status: ToolCallStatus) -> Self {
        if let Some(call) = self.tool_calls.iter_mut().find(|c| c.id == id) {
            call.status = status;
        }
        self
    }

    /// Clear `is_streaming` on every text message except `keep`.
    pub fn finish_streaming_except(&mut self, keep: Option<&str>) {
        for slot in &mut self.messages {
            let streaming = slot
                .as_text()
                .is_some_and(|m| m.is_streaming && Some(m.id.as_str()) != keep);
            if streaming {
                if let Some(text) = Arc::make_mut(slot).as_text_mut() {
                    text.is_streaming = false;
                }
            }
        }
    }

    /// Clear `is_streaming` on every text message.
    pub fn finish_streaming(&mut self) {
        self.finish_streaming_except(None);
    }

    /// Mark every tool call that can still make progress as failed.
    pub fn fail_active_tool_calls(&mut self) {
        for call in &mut self.tool_calls {
            if call.status.is_active() {
                call.status = ToolCallStatus::Failed;
            }
        }
    }

    pub fn tool_call(&self, id: &str) -> Option<&ToolCallInfo> {
        self.tool_calls.iter().find(|c| c.id == id)
    }

    pub fn tool_call_mut(&mut self, id: &str) -> Option<&mut ToolCallInfo> {
        self.tool_calls.iter_mut().find(|c| c.id == id)
    }

    pub fn message(&self, id: &str) -> Option<&Message> {
        self.messages.iter().map(|m| &**m).find(|m| m.id() == id)
    }

    pub fn text_message(&self, id: &str) -> Option<&TextMessage> {
        self.message(id).and_then(Message::as_text)
    }

    /// Assistant-authored text messages in order. The position in this
    /// sequence is the turn index.
    pub fn assistant_turns(&self) -> impl Iterator<Item = &TextMessage> {
        self.messages
            .iter()
            .filter_map(|m| m.as_text())
            .filter(|m| m.is_assistant())
    }

    /// The message currently receiving deltas, if any.
    pub fn streaming_message(&self) -> Option<&TextMessage> {
        self.messages
            .iter()
            .filter_map(|m| m.as_text())
            .find(|m| m.is_streaming)
    }

    /// Whether a new run may be started (no run in flight).
    pub fn can_start_run(&self) -> bool {
        !self.status.is_running()
    }
}
