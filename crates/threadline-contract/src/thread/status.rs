use serde::{Deserialize, Serialize};

/// Run status of a conversation.
///
/// Only the event processor moves a conversation between these states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversationStatus {
    /// No run has started yet.
    #[default]
    Idle,
    Running {
        run_id: String,
    },
    Completed,
    /// The backend reported a run error.
    Failed {
        error: String,
    },
    /// The client stopped the run.
    Cancelled {
        reason: String,
    },
}

impl ConversationStatus {
    pub fn running(run_id: impl Into<String>) -> Self {
        Self::Running {
            run_id: run_id.into(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::Failed {
            error: error.into(),
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Completed, failed or cancelled.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    /// The id of the active run, if any.
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::Running { run_id } => Some(run_id),
            _ => None,
        }
    }
}
