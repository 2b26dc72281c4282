//! Run lifecycle notification seam.

use crate::thread::ConversationStatus;
use std::sync::Arc;

/// Receives run start/end notifications from a driver.
///
/// Used for resource bookkeeping around a run (keep-awake locks, activity
/// indicators). Notification only: nothing flows back into processing.
pub trait RunLifecycleSink: Send + Sync {
    fn run_started(&self, thread_id: &str, run_id: &str);

    /// `status` is the terminal status the run ended with. `run_id` is `None`
    /// when the run ended before the backend assigned one.
    fn run_ended(&self, thread_id: &str, run_id: Option<&str>, status: &ConversationStatus);
}

/// Sink that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLifecycleSink;

impl NoopLifecycleSink {
    pub fn arc() -> Arc<dyn RunLifecycleSink> {
        Arc::new(Self)
    }
}

impl RunLifecycleSink for NoopLifecycleSink {
    fn run_started(&self, _thread_id: &str, _run_id: &str) {}

    fn run_ended(&self, _thread_id: &str, _run_id: Option<&str>, _status: &ConversationStatus) {}
}
