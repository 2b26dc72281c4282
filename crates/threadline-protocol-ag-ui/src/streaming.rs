//! Per-run streaming state.
//!
//! Tracks which message is receiving text, whether reasoning text is being
//! held back until its message starts, and the names of tool calls whose
//! arguments are still streaming. Created on `RUN_STARTED` and discarded on
//! every run boundary. The active message is referenced by id only; the
//! message itself lives in the conversation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Text phase of the current run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum TextPhase {
    #[default]
    Idle,
    /// A message (or its thinking phase) has started; no deltas yet.
    AwaitingText { message_id: String },
    /// Reasoning deltas are held here until the message's text starts.
    BufferingThinking { message_id: String, buffer: String },
    /// Visible text deltas are being appended to the message.
    StreamingText { message_id: String },
}

impl TextPhase {
    pub fn active_message_id(&self) -> Option<&str> {
        match self {
            TextPhase::Idle => None,
            TextPhase::AwaitingText { message_id }
            | TextPhase::BufferingThinking { message_id, .. }
            | TextPhase::StreamingText { message_id } => Some(message_id),
        }
    }

    /// Whether `id` is the message this phase is tracking.
    pub fn is_active(&self, id: &str) -> bool {
        self.active_message_id() == Some(id)
    }
}

/// Ephemeral state carried between events of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StreamingState {
    pub phase: TextPhase,
    /// Names of tool calls whose arguments are still arriving.
    pub tool_activity: BTreeSet<String>,
}

impl StreamingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_message_id(&self) -> Option<&str> {
        self.phase.active_message_id()
    }

    pub fn is_idle(&self) -> bool {
        self.phase == TextPhase::Idle && self.tool_activity.is_empty()
    }

    /// Take the thinking buffer if it belongs to `message_id`.
    ///
    /// A buffer held for any other message is left in place.
    pub fn take_thinking_for(&mut self, message_id: &str) -> Option<String> {
        match &mut self.phase {
            TextPhase::BufferingThinking {
                message_id: active,
                buffer,
            } if active == message_id => Some(std::mem::take(buffer)),
            _ => None,
        }
    }

    #[must_use]
    pub fn with_phase(mut self, phase: TextPhase) -> Self {
        self.phase = phase;
        self
    }
}
