use crate::events::Event;
use crate::session::UserTurn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// One stored run: the user turn that opened it and the events it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRun {
    #[serde(default)]
    pub run_id: Option<String>,
    pub user_message: UserTurn,
    #[serde(default)]
    pub events: Vec<Event>,
    /// Set when the client cancelled the run after these events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_reason: Option<String>,
}

/// A thread's stored runs, as kept in a history file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredThread {
    pub thread_id: String,
    #[serde(default)]
    pub runs: Vec<StoredRun>,
}

#[derive(Debug, Error)]
pub enum HistoryStoreError {
    /// Thread not found.
    #[error("thread not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failure inside the store implementation.
    #[error("history backend error: {0}")]
    Backend(String),
}

/// Source of stored event logs, keyed by thread id.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Runs of a thread in the order they happened.
    async fn load_runs(&self, thread_id: &str) -> Result<Vec<StoredRun>, HistoryStoreError>;
}

/// In-memory history for tests and the replay CLI.
#[derive(Default)]
pub struct MemoryHistoryStore {
    threads: tokio::sync::RwLock<HashMap<String, Vec<StoredRun>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a JSON array of [`StoredThread`]s.
    pub fn from_json_str(raw: &str) -> Result<Self, HistoryStoreError> {
        let threads: Vec<StoredThread> = serde_json::from_str(raw)?;
        Ok(Self::from_threads(threads))
    }

    pub fn from_threads(threads: impl IntoIterator<Item = StoredThread>) -> Self {
        let map = threads.into_iter().map(|t| (t.thread_id, t.runs)).collect();
        Self {
            threads: tokio::sync::RwLock::new(map),
        }
    }

    pub async fn thread_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load_runs(&self, thread_id: &str) -> Result<Vec<StoredRun>, HistoryStoreError> {
        self.threads
            .read()
            .await
            .get(thread_id)
            .cloned()
            .ok_or_else(|| HistoryStoreError::NotFound(thread_id.to_string()))
    }
}
