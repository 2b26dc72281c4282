//! Citation correlation.
//!
//! RAG backends keep a per-turn history array somewhere in the shared state
//! tree; entry *i* carries the citations for the *i*-th assistant turn. The
//! tree layout differs between backends, so each known layout is a
//! [`HistoryShape`] and the correlator tries them in order.

use crate::config::{CitationConfig, ConfigError, HistoryShapeConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use threadline_contract::{Conversation, SourceReference};
use threadline_state::{get_at_path, Path};
use tracing::warn;

/// A state-tree layout holding per-turn citation history.
pub trait HistoryShape: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// The history array, if `state` has this shape.
    fn history<'a>(&self, state: &'a Value) -> Option<&'a [Value]>;

    /// Raw citation list of one history entry.
    fn citations<'a>(&self, entry: &'a Value) -> Option<&'a [Value]>;
}

/// Shape located by a JSON pointer, with citations under a fixed key.
#[derive(Debug, Clone)]
pub struct PointerHistoryShape {
    name: String,
    history: Path,
    citations_key: String,
}

impl PointerHistoryShape {
    pub fn new(name: impl Into<String>, history: Path, citations_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            history,
            citations_key: citations_key.into(),
        }
    }

    pub fn from_config(config: &HistoryShapeConfig) -> Result<Self, ConfigError> {
        let history =
            Path::parse(&config.history_pointer).map_err(|source| ConfigError::InvalidPointer {
                shape: config.name.clone(),
                source,
            })?;
        Ok(Self::new(config.name.clone(), history, config.citations_key.clone()))
    }
}

impl HistoryShape for PointerHistoryShape {
    fn name(&self) -> &str {
        &self.name
    }

    fn history<'a>(&self, state: &'a Value) -> Option<&'a [Value]> {
        get_at_path(state, &self.history)?
            .as_array()
            .map(Vec::as_slice)
    }

    fn citations<'a>(&self, entry: &'a Value) -> Option<&'a [Value]> {
        entry
            .get(&self.citations_key)?
            .as_array()
            .map(Vec::as_slice)
    }
}

/// Citations that became available for one assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnCitations {
    pub turn_index: usize,
    /// Id of the assistant message at `turn_index`; `None` when the history
    /// runs ahead of the transcript.
    pub message_id: Option<String>,
    pub references: Vec<SourceReference>,
}

/// Derives new citations from a before/after pair of state trees.
#[derive(Debug, Clone)]
pub struct CitationCorrelator {
    shapes: Vec<Arc<dyn HistoryShape>>,
}

impl Default for CitationCorrelator {
    fn default() -> Self {
        // The default pointers are literals that always parse.
        Self::from_config(&CitationConfig::default()).unwrap_or_else(|_| Self::new(Vec::new()))
    }
}

impl CitationCorrelator {
    /// Shapes are tried in the given order.
    pub fn new(shapes: Vec<Arc<dyn HistoryShape>>) -> Self {
        Self { shapes }
    }

    pub fn from_config(config: &CitationConfig) -> Result<Self, ConfigError> {
        let shapes = config
            .shapes
            .iter()
            .map(|shape| {
                PointerHistoryShape::from_config(shape)
                    .map(|s| Arc::new(s) as Arc<dyn HistoryShape>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(shapes))
    }

    /// Append a shape with the lowest precedence.
    #[must_use]
    pub fn with_shape(mut self, shape: Arc<dyn HistoryShape>) -> Self {
        self.shapes.push(shape);
        self
    }

    pub fn shape_names(&self) -> Vec<&str> {
        self.shapes.iter().map(|s| s.name()).collect()
    }

    /// First shape present in `state`, with its history array.
    pub fn match_shape<'s, 'v>(
        &'s self,
        state: &'v Value,
    ) -> Option<(&'s dyn HistoryShape, &'v [Value])> {
        self.shapes
            .iter()
            .find_map(|shape| shape.history(state).map(|h| (shape.as_ref(), h)))
    }

    /// Citations present in `new_state` that were absent or empty in
    /// `previous_state`, one entry per history index.
    ///
    /// History index *i* maps to the *i*-th assistant turn. No known shape
    /// yields an empty list.
    pub fn extract(
        &self,
        conversation: &Conversation,
        previous_state: &Value,
        new_state: &Value,
    ) -> Vec<TurnCitations> {
        let Some((shape, history)) = self.match_shape(new_state) else {
            return Vec::new();
        };
        let previous = shape.history(previous_state).unwrap_or_default();
        let turn_ids: Vec<&str> = conversation
            .assistant_turns()
            .map(|m| m.id.as_str())
            .collect();

        history
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                !previous
                    .get(*i)
                    .and_then(|entry| shape.citations(entry))
                    .is_some_and(|c| !c.is_empty())
            })
            .filter_map(|(i, entry)| {
                let references = parse_references(shape, shape.citations(entry)?);
                if references.is_empty() {
                    return None;
                }
                Some(TurnCitations {
                    turn_index: i,
                    message_id: turn_ids.get(i).map(|id| (*id).to_owned()),
                    references,
                })
            })
            .collect()
    }

    /// New citations for one turn; empty when the turn has none or lies
    /// beyond the history.
    pub fn citations_for_turn(
        &self,
        conversation: &Conversation,
        previous_state: &Value,
        new_state: &Value,
        turn_index: usize,
    ) -> Vec<SourceReference> {
        self.extract(conversation, previous_state, new_state)
            .into_iter()
            .find(|t| t.turn_index == turn_index)
            .map(|t| t.references)
            .unwrap_or_default()
    }
}

fn parse_references(shape: &dyn HistoryShape, raw: &[Value]) -> Vec<SourceReference> {
    raw.iter()
        .filter_map(|value| match SourceReference::deserialize(value) {
            Ok(reference) => Some(reference),
            Err(err) => {
                warn!(shape = %shape.name(), error = %err, "skipping malformed citation");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use threadline_contract::TextMessage;

    fn citation(doc: &str) -> Value {
        json!({"document_id": doc, "chunk_id": format!("{doc}-c"), "content": "..."})
    }

    fn two_turns() -> Conversation {
        Conversation::new("t1")
            .with_message(TextMessage::user("u1", "q1"))
            .with_message(TextMessage::assistant("a1", "r1"))
            .with_message(TextMessage::user("u2", "q2"))
            .with_message(TextMessage::assistant("a2", "r2"))
    }

    #[test]
    fn ask_history_takes_precedence() {
        let state = json!({
            "ask_history": {"questions": [{"citations": [citation("a")]}]},
            "haiku.rag.chat": {"qa_history": [{"citations": [citation("b")]}]},
        });
        let found = CitationCorrelator::default().extract(&two_turns(), &json!({}), &state);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].references[0].document_id, "a");
        assert_eq!(found[0].message_id.as_deref(), Some("a1"));
    }

    #[test]
    fn falls_back_to_haiku_shape() {
        let state = json!({"haiku.rag.chat": {"qa_history": [{"citations": [citation("b")]}]}});
        let found = CitationCorrelator::default().extract(&two_turns(), &json!({}), &state);
        assert_eq!(found[0].references[0].document_id, "b");
    }

    #[test]
    fn unknown_shape_yields_nothing() {
        let state = json!({"other": {"questions": [{"citations": [citation("a")]}]}});
        assert!(CitationCorrelator::default()
            .extract(&two_turns(), &json!({}), &state)
            .is_empty());
    }

    #[test]
    fn malformed_citations_are_skipped() {
        let state = json!({"ask_history": {"questions": [
            {"citations": [{"content": "missing ids"}, citation("ok")]}
        ]}});
        let refs =
            CitationCorrelator::default().citations_for_turn(&two_turns(), &json!({}), &state, 0);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].document_id, "ok");
    }

    #[test]
    fn turn_beyond_history_is_empty() {
        let state = json!({"ask_history": {"questions": [{"citations": [citation("a")]}]}});
        let refs =
            CitationCorrelator::default().citations_for_turn(&two_turns(), &json!({}), &state, 5);
        assert!(refs.is_empty());
    }

    #[test]
    fn config_builds_shapes_in_order() {
        let config = CitationConfig {
            shapes: vec![HistoryShapeConfig {
                name: "qa".into(),
                history_pointer: "/qa/turns".into(),
                citations_key: "sources".into(),
            }],
        };
        let correlator = CitationCorrelator::from_config(&config).unwrap();
        assert_eq!(correlator.shape_names(), vec!["qa"]);

        let state = json!({"qa": {"turns": [{"sources": [citation("s")]}]}});
        let found = correlator.extract(&two_turns(), &json!({}), &state);
        assert_eq!(found[0].references[0].document_id, "s");
    }

    #[test]
    fn default_follows_default_config() {
        let config = CitationConfig::default();
        let expected: Vec<_> = config.shapes.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(CitationCorrelator::default().shape_names(), expected);
        assert_eq!(expected, vec!["ask_history", "haiku.rag.chat"]);
    }

    #[test]
    fn invalid_pointer_in_config_is_rejected() {
        let config = CitationConfig {
            shapes: vec![HistoryShapeConfig::new("bad", "no-leading-slash")],
        };
        assert!(matches!(
            CitationCorrelator::from_config(&config),
            Err(ConfigError::InvalidPointer { .. })
        ));
    }
}
