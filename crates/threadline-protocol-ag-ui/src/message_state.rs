//! Per-user-message citation records.

use crate::citation::CitationCorrelator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use threadline_contract::{ChatUser, Conversation, Message, MessageState};

/// What the session remembers about one run: who asked, and the state tree
/// on either side of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    #[serde(default)]
    pub run_id: Option<String>,
    pub user_message_id: String,
    /// State when the user turn began.
    pub start_state: Value,
    /// State when the run ended; `None` while it is still running.
    #[serde(default)]
    pub end_state: Option<Value>,
}

impl RunRecord {
    pub fn new(user_message_id: impl Into<String>, start_state: Value) -> Self {
        Self {
            run_id: None,
            user_message_id: user_message_id.into(),
            start_state,
            end_state: None,
        }
    }
}

/// Builds the [`MessageState`] map from a conversation and its run ledger.
#[derive(Debug, Clone, Default)]
pub struct MessageStateCorrelator {
    citations: CitationCorrelator,
}

impl MessageStateCorrelator {
    pub fn new(citations: CitationCorrelator) -> Self {
        Self { citations }
    }

    pub fn citations(&self) -> &CitationCorrelator {
        &self.citations
    }

    /// One record per user message, keyed by its id.
    ///
    /// Source references come from the assistant turn directly after the
    /// user message, diffed across that message's run. A user message with
    /// no ledger entry is diffed against an empty tree and has no run id.
    pub fn correlate(
        &self,
        conversation: &Conversation,
        ledger: &[RunRecord],
    ) -> BTreeMap<String, MessageState> {
        let mut states = BTreeMap::new();
        for (user_id, turn_index) in user_turns(conversation) {
            let record = ledger.iter().rev().find(|r| r.user_message_id == user_id);
            let run_id = record.and_then(|r| r.run_id.clone());
            let references = match turn_index {
                Some(turn) => {
                    let previous = record.map_or(&Value::Null, |r| &r.start_state);
                    let current = record
                        .and_then(|r| r.end_state.as_ref())
                        .unwrap_or(&conversation.state);
                    self.citations
                        .citations_for_turn(conversation, previous, current, turn)
                }
                None => Vec::new(),
            };
            states.insert(
                user_id.to_owned(),
                MessageState::new(user_id, run_id).with_source_references(references),
            );
        }
        states
    }
}

/// Each user message with the index of the assistant turn that answered it.
fn user_turns(conversation: &Conversation) -> Vec<(&str, Option<usize>)> {
    let mut out: Vec<(&str, Option<usize>)> = Vec::new();
    let mut assistant_turns = 0;
    for message in &conversation.messages {
        let Message::Text(text) = &**message else {
            continue;
        };
        match text.author {
            ChatUser::User => out.push((text.id.as_str(), None)),
            ChatUser::Assistant => {
                if let Some((_, turn @ None)) = out.last_mut() {
                    *turn = Some(assistant_turns);
                }
                assistant_turns += 1;
            }
            ChatUser::System => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use threadline_contract::TextMessage;

    fn history(entries: Vec<Value>) -> Value {
        json!({"ask_history": {"questions": entries}})
    }

    fn entry(doc: &str) -> Value {
        json!({"citations": [{"document_id": doc, "chunk_id": "c"}]})
    }

    #[test]
    fn user_turns_pair_with_following_reply() {
        let conv = Conversation::new("t1")
            .with_message(TextMessage::user("u1", "q1"))
            .with_message(TextMessage::assistant("a1", "r1"))
            .with_message(TextMessage::user("u2", "q2"))
            .with_message(TextMessage::user("u3", "q3"))
            .with_message(TextMessage::assistant("a2", "r3"));
        assert_eq!(
            user_turns(&conv),
            vec![("u1", Some(0)), ("u2", None), ("u3", Some(1))]
        );
    }

    #[test]
    fn only_new_citations_reach_second_turn() {
        let after_first = history(vec![entry("d1")]);
        let after_second = history(vec![entry("d1"), entry("d2")]);
        let conv = Conversation::with_initial_state("t1", after_second.clone())
            .with_message(TextMessage::user("u1", "q1"))
            .with_message(TextMessage::assistant("a1", "r1"))
            .with_message(TextMessage::user("u2", "q2"))
            .with_message(TextMessage::assistant("a2", "r2"));
        let ledger = vec![
            RunRecord {
                run_id: Some("r1".into()),
                user_message_id: "u1".into(),
                start_state: json!({}),
                end_state: Some(after_first.clone()),
            },
            RunRecord {
                run_id: Some("r2".into()),
                user_message_id: "u2".into(),
                start_state: after_first,
                end_state: Some(after_second),
            },
        ];

        let states = MessageStateCorrelator::default().correlate(&conv, &ledger);
        assert_eq!(states["u1"].source_references[0].document_id, "d1");
        assert_eq!(states["u2"].source_references.len(), 1);
        assert_eq!(states["u2"].source_references[0].document_id, "d2");
        assert_eq!(states["u2"].run_id.as_deref(), Some("r2"));
    }

    #[test]
    fn legacy_history_without_ledger_has_no_run_id() {
        let conv = Conversation::with_initial_state("t1", history(vec![entry("d1")]))
            .with_message(TextMessage::user("u1", "q1"))
            .with_message(TextMessage::assistant("a1", "r1"));
        let states = MessageStateCorrelator::default().correlate(&conv, &[]);
        assert_eq!(states["u1"].run_id, None);
        assert_eq!(states["u1"].source_references[0].document_id, "d1");
    }
}
