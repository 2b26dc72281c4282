//! One thread's conversation plus the bookkeeping shared by the live and
//! replay drivers.

use crate::events::Event;
use crate::message_state::{MessageStateCorrelator, RunRecord};
use crate::processor::{cancel_run, process_event, EventOutcome, RunTransition};
use crate::streaming::StreamingState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use threadline_contract::{Conversation, MessageState, TextMessage};
use tracing::{debug, warn};

/// Error message recorded when a stream closes mid-run.
pub const STREAM_ENDED_EARLY: &str = "event stream ended before the run finished";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("run {run_id} is still in flight")]
    RunInFlight { run_id: String },
}

/// The user message that opens a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTurn {
    pub id: String,
    pub text: String,
}

impl UserTurn {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Conversation, streaming state and run ledger for one thread.
#[derive(Debug, Clone)]
pub struct ThreadSession {
    conversation: Conversation,
    streaming: StreamingState,
    ledger: Vec<RunRecord>,
    /// Ledger index of the turn whose run has not ended yet.
    open_turn: Option<usize>,
    correlator: MessageStateCorrelator,
}

impl ThreadSession {
    pub fn new(thread_id: impl Into<String>) -> Self {
        Self::with_correlator(thread_id, MessageStateCorrelator::default())
    }

    pub fn with_correlator(
        thread_id: impl Into<String>,
        correlator: MessageStateCorrelator,
    ) -> Self {
        Self::from_conversation(Conversation::new(thread_id), correlator)
    }

    pub fn from_conversation(
        conversation: Conversation,
        correlator: MessageStateCorrelator,
    ) -> Self {
        Self {
            conversation,
            streaming: StreamingState::new(),
            ledger: Vec::new(),
            open_turn: None,
            correlator,
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.conversation.thread_id
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn streaming(&self) -> &StreamingState {
        &self.streaming
    }

    pub fn ledger(&self) -> &[RunRecord] {
        &self.ledger
    }

    pub fn into_conversation(self) -> Conversation {
        self.conversation
    }

    /// Append the user's message and open a ledger entry for the run it
    /// starts. `run_id` is known up front when the client assigns it.
    pub fn begin_turn(
        &mut self,
        turn: UserTurn,
        run_id: Option<String>,
    ) -> Result<(), SessionError> {
        if let Some(active) = self.conversation.status.run_id() {
            return Err(SessionError::RunInFlight {
                run_id: active.to_owned(),
            });
        }
        if let Some(open) = self.open_turn.take() {
            debug!(
                user_message_id = %self.ledger[open].user_message_id,
                "previous turn never started a run"
            );
        }
        let mut record = RunRecord::new(turn.id.clone(), self.conversation.state.clone());
        record.run_id = run_id;
        self.conversation
            .upsert_message(TextMessage::user(turn.id, turn.text));
        self.ledger.push(record);
        self.open_turn = Some(self.ledger.len() - 1);
        Ok(())
    }

    /// Feed one event through the processor.
    pub fn apply(&mut self, event: &Event) -> Option<RunTransition> {
        self.step(|conversation, streaming| process_event(conversation, streaming, event))
    }

    /// Cancel the open turn. Returns `None` when nothing is in flight.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Option<RunTransition> {
        if !self.conversation.status.is_running() && self.open_turn.is_none() {
            debug!(thread_id = %self.thread_id(), "cancel with no run in flight");
            return None;
        }
        let reason = reason.into();
        self.step(|conversation, streaming| cancel_run(conversation, streaming, reason))
    }

    /// Close out a run whose event source has ended. A run still marked
    /// running ends as failed; text left streaming outside a run is closed.
    pub fn finish_stream(&mut self) -> Option<RunTransition> {
        if !self.conversation.status.is_running() {
            if !self.streaming.is_idle() {
                debug!(
                    thread_id = %self.thread_id(),
                    active = ?self.streaming.active_message_id(),
                    "closing streaming state left open outside a run"
                );
                self.conversation.finish_streaming();
                self.streaming = StreamingState::new();
            }
            if let Some(open) = self.open_turn.take() {
                self.ledger[open].end_state = Some(self.conversation.state.clone());
            }
            return None;
        }
        warn!(thread_id = %self.thread_id(), "event stream ended mid-run");
        self.apply(&Event::run_error(STREAM_ENDED_EARLY, None))
    }

    /// Citation records for every user message so far.
    pub fn message_states(&self) -> BTreeMap<String, MessageState> {
        self.correlator.correlate(&self.conversation, &self.ledger)
    }

    fn step(
        &mut self,
        f: impl FnOnce(Conversation, StreamingState) -> EventOutcome,
    ) -> Option<RunTransition> {
        let placeholder = Conversation::new(String::new());
        let conversation = std::mem::replace(&mut self.conversation, placeholder);
        let streaming = std::mem::take(&mut self.streaming);
        let outcome = f(conversation, streaming);
        self.conversation = outcome.conversation;
        self.streaming = outcome.streaming;
        if let Some(transition) = &outcome.transition {
            self.record_transition(transition);
        }
        outcome.transition
    }

    fn record_transition(&mut self, transition: &RunTransition) {
        let Some(open) = self.open_turn else {
            return;
        };
        let record = &mut self.ledger[open];
        match transition {
            RunTransition::Started { run_id } => {
                if record.run_id.as_ref().is_some_and(|id| id != run_id) {
                    debug!(
                        expected = ?record.run_id,
                        run_id = %run_id,
                        "backend assigned a different run id"
                    );
                }
                record.run_id = Some(run_id.clone());
            }
            RunTransition::Ended { run_id, .. } => {
                if record.run_id.is_none() {
                    record.run_id = run_id.clone();
                }
                record.end_state = Some(self.conversation.state.clone());
                self.open_turn = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use threadline_contract::ConversationStatus;

    #[test]
    fn begin_turn_records_start_state() {
        let mut session = ThreadSession::new("t1");
        session.apply(&Event::state_snapshot(json!({"n": 1})));
        session.begin_turn(UserTurn::new("u1", "hi"), None).unwrap();

        assert_eq!(session.ledger()[0].start_state, json!({"n": 1}));
        assert_eq!(session.conversation().messages.len(), 1);
    }

    #[test]
    fn run_transitions_fill_the_ledger() {
        let mut session = ThreadSession::new("t1");
        session.begin_turn(UserTurn::new("u1", "hi"), None).unwrap();
        session.apply(&Event::run_started("t1", "r1", None));
        session.apply(&Event::state_snapshot(json!({"done": true})));
        session.apply(&Event::run_finished("t1", "r1", None));

        let record = &session.ledger()[0];
        assert_eq!(record.run_id.as_deref(), Some("r1"));
        assert_eq!(record.end_state, Some(json!({"done": true})));
    }

    #[test]
    fn begin_turn_rejected_while_running() {
        let mut session = ThreadSession::new("t1");
        session.begin_turn(UserTurn::new("u1", "hi"), None).unwrap();
        session.apply(&Event::run_started("t1", "r1", None));
        assert_eq!(
            session.begin_turn(UserTurn::new("u2", "again"), None),
            Err(SessionError::RunInFlight {
                run_id: "r1".into()
            })
        );
    }

    #[test]
    fn cancel_without_run_is_noop() {
        let mut session = ThreadSession::new("t1");
        assert_eq!(session.cancel("stop"), None);
        assert_eq!(session.conversation().status, ConversationStatus::Idle);
    }

    #[test]
    fn finish_stream_closes_text_streamed_without_a_run() {
        let mut session = ThreadSession::new("t1");
        session.begin_turn(UserTurn::new("u1", "hi"), None).unwrap();
        session.apply(&Event::text_message_start("a1"));
        session.apply(&Event::text_message_content("a1", "partial"));
        assert!(!session.streaming().is_idle());

        assert_eq!(session.finish_stream(), None);
        assert!(session.streaming().is_idle());
        let a1 = session.conversation().text_message("a1").unwrap();
        assert_eq!(a1.text, "partial");
        assert!(!a1.is_streaming);
        assert!(session.conversation().streaming_message().is_none());
    }

    #[test]
    fn finish_stream_fails_unterminated_run() {
        let mut session = ThreadSession::new("t1");
        session.begin_turn(UserTurn::new("u1", "hi"), None).unwrap();
        session.apply(&Event::run_started("t1", "r1", None));
        let transition = session.finish_stream();
        assert_eq!(
            session.conversation().status,
            ConversationStatus::failed(STREAM_ENDED_EARLY)
        );
        assert!(matches!(transition, Some(RunTransition::Ended { .. })));
        assert!(session.ledger()[0].end_state.is_some());
    }
}
