//! Citation records derived from the application state tree.

use serde::{Deserialize, Deserializer, Serialize};

/// A pointer to retrieved document content that backs part of an answer.
///
/// Accepts both the snake_case keys written by RAG backends and camelCase
/// keys; always serializes snake_case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReference {
    #[serde(alias = "documentId")]
    pub document_id: String,
    #[serde(default, alias = "documentUri", deserialize_with = "null_as_default")]
    pub document_uri: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(alias = "chunkId")]
    pub chunk_id: String,
    #[serde(
        default,
        alias = "documentTitle",
        skip_serializing_if = "Option::is_none"
    )]
    pub document_title: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub headings: Vec<String>,
    #[serde(default, alias = "pageNumbers", deserialize_with = "null_as_default")]
    pub page_numbers: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
}

/// Backends write `null` for empty lists and strings.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Per-user-message record consumed by citation display and feedback.
///
/// Keyed by the user message that started the turn, not by the assistant
/// reply, because citations in the state tree are addressed by turn position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageState {
    pub user_message_id: String,
    pub source_references: Vec<SourceReference>,
    /// Run that answered the message; `None` for history recorded before run
    /// ids were tracked.
    #[serde(default)]
    pub run_id: Option<String>,
}

impl MessageState {
    pub fn new(user_message_id: impl Into<String>, run_id: Option<String>) -> Self {
        Self {
            user_message_id: user_message_id.into(),
            source_references: Vec::new(),
            run_id,
        }
    }

    #[must_use]
    pub fn with_source_references(mut self, refs: Vec<SourceReference>) -> Self {
        self.source_references = refs;
        self
    }
}
