//! Citation shape configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_CITATIONS_KEY: &str = "citations";

fn default_citations_key() -> String {
    DEFAULT_CITATIONS_KEY.to_string()
}

/// One state-tree shape that holds per-turn citation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryShapeConfig {
    pub name: String,
    /// JSON pointer to the history array, e.g. `/ask_history/questions`.
    pub history_pointer: String,
    /// Key of the citation list inside each history entry.
    #[serde(default = "default_citations_key")]
    pub citations_key: String,
}

impl HistoryShapeConfig {
    pub fn new(name: impl Into<String>, history_pointer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            history_pointer: history_pointer.into(),
            citations_key: default_citations_key(),
        }
    }
}

/// Ordered list of history shapes; earlier shapes take precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CitationConfig {
    pub shapes: Vec<HistoryShapeConfig>,
}

impl Default for CitationConfig {
    fn default() -> Self {
        Self {
            shapes: vec![
                HistoryShapeConfig::new("ask_history", "/ask_history/questions"),
                HistoryShapeConfig::new("haiku.rag.chat", "/haiku.rag.chat/qa_history"),
            ],
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read citation config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse citation config (JSON): {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid history pointer for shape '{shape}': {source}")]
    InvalidPointer {
        shape: String,
        #[source]
        source: threadline_state::StateError,
    },
}

impl CitationConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_json_str(&raw)
    }
}
