//! Event processor: `(Conversation, StreamingState, Event) -> next pair`.
//!
//! Pure and synchronous. Live streams and stored history both go through
//! [`process_event`], which is what makes their results identical.

use crate::events::Event;
use crate::streaming::{StreamingState, TextPhase};
use serde::Deserialize;
use serde_json::Value;
use threadline_contract::{
    Conversation, ConversationStatus, Message, TextMessage, ToolCallInfo, ToolCallStatus,
};
use threadline_state::{apply_patch, PatchOp};
use tracing::{debug, warn};

/// Run boundary crossed by an event, reported so a driver can notify the
/// lifecycle sink without diffing conversations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunTransition {
    Started {
        run_id: String,
    },
    Ended {
        /// `None` when the terminal event named no run and none was active.
        run_id: Option<String>,
        status: ConversationStatus,
    },
}

/// Result of processing one event.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub conversation: Conversation,
    pub streaming: StreamingState,
    pub transition: Option<RunTransition>,
}

impl EventOutcome {
    pub fn into_parts(self) -> (Conversation, StreamingState) {
        (self.conversation, self.streaming)
    }
}

/// Apply one event.
///
/// Never fails: malformed patch ops, deltas for inactive messages and unknown
/// event types are skipped (and logged), leaving the pair otherwise intact.
pub fn process_event(
    mut conversation: Conversation,
    mut streaming: StreamingState,
    event: &Event,
) -> EventOutcome {
    let mut transition = None;

    match event {
        Event::RunStarted { run_id, .. } => {
            flush_thinking(&mut conversation, &mut streaming);
            conversation.finish_streaming();
            conversation.status = ConversationStatus::running(run_id.clone());
            streaming = StreamingState::new();
            transition = Some(RunTransition::Started {
                run_id: run_id.clone(),
            });
        }
        Event::RunFinished { run_id, .. } => {
            if let Some(active) = conversation.status.run_id() {
                if active != run_id.as_str() {
                    warn!(
                        active_run_id = %active,
                        run_id = %run_id,
                        "RUN_FINISHED for a different run"
                    );
                }
            }
            let status = ConversationStatus::Completed;
            end_run(&mut conversation, &mut streaming, status.clone(), false);
            transition = Some(RunTransition::Ended {
                run_id: Some(run_id.clone()),
                status,
            });
        }
        Event::RunError {
            message, run_id, ..
        } => {
            let run_id = run_id
                .clone()
                .or_else(|| conversation.status.run_id().map(str::to_owned));
            let status = ConversationStatus::failed(message.clone());
            end_run(&mut conversation, &mut streaming, status.clone(), true);
            transition = Some(RunTransition::Ended { run_id, status });
        }

        Event::TextMessageStart { message_id, .. } => {
            text_start(&mut conversation, &mut streaming, message_id);
        }
        Event::TextMessageContent {
            message_id, delta, ..
        } => {
            text_content(&mut conversation, &mut streaming, message_id, delta);
        }
        Event::TextMessageEnd { message_id, .. } => {
            text_end(&mut conversation, &mut streaming, message_id);
        }
        Event::ThinkingTextMessageStart { message_id, .. } => {
            thinking_start(&mut conversation, &mut streaming, message_id);
        }
        Event::ThinkingTextMessageContent {
            message_id, delta, ..
        } => {
            thinking_content(&mut conversation, &mut streaming, message_id, delta);
        }
        Event::ThinkingTextMessageEnd { message_id, .. } => {
            if !streaming.phase.is_active(message_id) {
                debug!(message_id = %message_id, "thinking end for inactive message");
            }
        }

        Event::ToolCallStart {
            tool_call_id,
            tool_call_name,
            ..
        } => {
            conversation.upsert_tool_call(ToolCallInfo::streaming(
                tool_call_id.clone(),
                tool_call_name.clone(),
            ));
            streaming.tool_activity.insert(tool_call_name.clone());
        }
        Event::ToolCallArgs {
            tool_call_id,
            delta,
            ..
        } => match conversation.tool_call_mut(tool_call_id) {
            Some(call) if call.status == ToolCallStatus::Streaming => {
                call.arguments.push_str(delta);
            }
            Some(call) => {
                debug!(
                    tool_call_id = %tool_call_id,
                    status = ?call.status,
                    "args for closed tool call"
                );
            }
            None => debug!(tool_call_id = %tool_call_id, "args for unknown tool call"),
        },
        Event::ToolCallEnd { tool_call_id, .. } => {
            if let Some(call) = conversation.tool_call_mut(tool_call_id) {
                if call.status == ToolCallStatus::Streaming {
                    call.status = ToolCallStatus::Pending;
                }
                streaming.tool_activity.remove(&call.name);
            } else {
                debug!(tool_call_id = %tool_call_id, "end for unknown tool call");
            }
        }
        Event::ToolCallResult {
            message_id,
            tool_call_id,
            content,
            ..
        } => {
            tool_result(
                &mut conversation,
                &mut streaming,
                message_id,
                tool_call_id,
                content,
            );
        }

        Event::StateSnapshot { snapshot, .. } => {
            conversation.state = snapshot.clone();
        }
        Event::StateDelta { delta, .. } => {
            let ops = parse_patch(delta);
            conversation.state = apply_patch(&conversation.state, &ops);
        }

        Event::ActivitySnapshot {
            message_id,
            activity_type,
            content,
            replace,
            ..
        } => {
            if *replace == Some(false) && conversation.message(message_id).is_some() {
                debug!(message_id = %message_id, "keeping existing activity widget");
            } else {
                conversation.upsert_message(Message::GenUi {
                    id: message_id.clone(),
                    widget_name: activity_type.clone(),
                    data: content.clone(),
                });
            }
        }

        Event::StepStarted { .. }
        | Event::StepFinished { .. }
        | Event::Raw { .. }
        | Event::Custom { .. }
        | Event::Unknown => {}
    }

    EventOutcome {
        conversation,
        streaming,
        transition,
    }
}

/// Stop the current run at the client's request.
///
/// Partial text is kept (no longer streaming), state is untouched and tool
/// calls that were still in progress become failed.
pub fn cancel_run(
    mut conversation: Conversation,
    mut streaming: StreamingState,
    reason: impl Into<String>,
) -> EventOutcome {
    let run_id = conversation.status.run_id().map(str::to_owned);
    let status = ConversationStatus::cancelled(reason);
    end_run(&mut conversation, &mut streaming, status.clone(), true);
    EventOutcome {
        conversation,
        streaming,
        transition: Some(RunTransition::Ended { run_id, status }),
    }
}

fn end_run(
    conversation: &mut Conversation,
    streaming: &mut StreamingState,
    status: ConversationStatus,
    fail_tools: bool,
) {
    flush_thinking(conversation, streaming);
    conversation.finish_streaming();
    if fail_tools {
        conversation.fail_active_tool_calls();
    }
    conversation.status = status;
    *streaming = StreamingState::new();
}

/// Attach held-back thinking to its message, or drop it when the message
/// never started.
fn flush_thinking(conversation: &mut Conversation, streaming: &mut StreamingState) {
    let Some(id) = streaming.active_message_id().map(str::to_owned) else {
        return;
    };
    let Some(thinking) = streaming.take_thinking_for(&id) else {
        return;
    };
    if thinking.is_empty() {
        return;
    }
    if !conversation.update_text(&id, |m| m.thinking_text.push_str(&thinking)) {
        debug!(message_id = %id, "dropping thinking text with no message");
    }
}

/// Create or reopen the streaming message `id` with `thinking` attached.
fn open_message(conversation: &mut Conversation, id: &str, thinking: String) {
    let reopened = conversation.update_text(id, |m| {
        m.is_streaming = true;
        m.thinking_text.push_str(&thinking);
    });
    if !reopened {
        conversation.upsert_message(TextMessage::streaming(id, thinking));
    }
}

fn text_start(conversation: &mut Conversation, streaming: &mut StreamingState, id: &str) {
    conversation.finish_streaming_except(Some(id));
    if !streaming.phase.is_active(id) {
        flush_thinking(conversation, streaming);
    }
    let handoff = streaming.take_thinking_for(id);
    let handed_off = handoff.is_some();
    open_message(conversation, id, handoff.unwrap_or_default());
    streaming.phase = if handed_off {
        TextPhase::StreamingText {
            message_id: id.to_owned(),
        }
    } else {
        TextPhase::AwaitingText {
            message_id: id.to_owned(),
        }
    };
}

fn text_content(
    conversation: &mut Conversation,
    streaming: &mut StreamingState,
    id: &str,
    delta: &str,
) {
    if !streaming.phase.is_active(id) {
        debug!(
            message_id = %id,
            active = ?streaming.active_message_id(),
            "ignoring text delta for inactive message"
        );
        return;
    }
    // Content without TEXT_MESSAGE_START ends the thinking phase implicitly.
    if let Some(thinking) = streaming.take_thinking_for(id) {
        open_message(conversation, id, thinking);
    }
    if !conversation.update_text(id, |m| m.text.push_str(delta)) {
        let mut msg = TextMessage::streaming(id, "");
        msg.text.push_str(delta);
        conversation.upsert_message(msg);
    }
    streaming.phase = TextPhase::StreamingText {
        message_id: id.to_owned(),
    };
}

fn text_end(conversation: &mut Conversation, streaming: &mut StreamingState, id: &str) {
    if !streaming.phase.is_active(id) {
        debug!(message_id = %id, "ignoring end for inactive message");
        return;
    }
    let thinking = streaming.take_thinking_for(id).unwrap_or_default();
    let closed = conversation.update_text(id, |m| {
        m.is_streaming = false;
        m.thinking_text.push_str(&thinking);
    });
    if !closed {
        conversation.upsert_message(TextMessage::streaming(id, thinking).finalized());
    }
    streaming.phase = TextPhase::Idle;
}

fn thinking_start(conversation: &mut Conversation, streaming: &mut StreamingState, id: &str) {
    conversation.finish_streaming_except(Some(id));
    if streaming.phase.is_active(id) {
        return;
    }
    flush_thinking(conversation, streaming);
    streaming.phase = TextPhase::AwaitingText {
        message_id: id.to_owned(),
    };
}

fn thinking_content(
    conversation: &mut Conversation,
    streaming: &mut StreamingState,
    id: &str,
    delta: &str,
) {
    let start_buffer = match &mut streaming.phase {
        TextPhase::BufferingThinking { message_id, buffer } if message_id.as_str() == id => {
            buffer.push_str(delta);
            false
        }
        TextPhase::StreamingText { message_id } if message_id.as_str() == id => {
            conversation.update_text(id, |m| m.thinking_text.push_str(delta));
            false
        }
        TextPhase::AwaitingText { message_id } if message_id.as_str() == id => true,
        TextPhase::Idle => true,
        other => {
            debug!(
                message_id = %id,
                active = ?other.active_message_id(),
                "ignoring thinking delta for inactive message"
            );
            false
        }
    };
    if start_buffer {
        streaming.phase = TextPhase::BufferingThinking {
            message_id: id.to_owned(),
            buffer: delta.to_owned(),
        };
    }
}

fn tool_result(
    conversation: &mut Conversation,
    streaming: &mut StreamingState,
    message_id: &str,
    tool_call_id: &str,
    content: &str,
) {
    let Some(call) = conversation.tool_call_mut(tool_call_id) else {
        debug!(tool_call_id = %tool_call_id, "result for unknown tool call");
        return;
    };
    call.status = ToolCallStatus::Completed;
    call.result = Some(content.to_owned());
    let call = call.clone();
    streaming.tool_activity.remove(&call.name);

    let mut calls = match conversation.message(message_id) {
        Some(Message::ToolCall { calls, .. }) => calls.clone(),
        _ => Vec::new(),
    };
    match calls.iter().position(|c| c.id == call.id) {
        Some(pos) => calls[pos] = call,
        None => calls.push(call),
    }
    conversation.upsert_message(Message::ToolCall {
        id: message_id.to_owned(),
        calls,
    });
}

fn parse_patch(delta: &[Value]) -> Vec<PatchOp> {
    delta
        .iter()
        .filter_map(|raw| match PatchOp::deserialize(raw) {
            Ok(op) => Some(op),
            Err(err) => {
                warn!(error = %err, op = %raw, "skipping unparseable state patch op");
                None
            }
        })
        .collect()
}
