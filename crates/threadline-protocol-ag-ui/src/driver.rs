//! Live and replay drivers.
//!
//! Both feed events into a [`ThreadSession`] one at a time; they differ only
//! in where events come from and how a run is stopped.

use crate::events::Event;
use crate::history::{HistoryStore, HistoryStoreError, StoredRun};
use crate::message_state::MessageStateCorrelator;
use crate::processor::RunTransition;
use crate::session::{SessionError, ThreadSession};
use futures::{Stream, StreamExt};
use thiserror::Error;
use threadline_contract::{ConversationStatus, RunLifecycleSink};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type RunCancellationToken = CancellationToken;

/// Reason recorded when a run is stopped through its cancellation token.
pub const CANCELLED_BY_USER: &str = "cancelled by user";

#[derive(Debug, Error)]
pub enum DriveError {
    /// The transport failed mid-run. The run is already marked failed.
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    History(#[from] HistoryStoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelAware<T> {
    Value(T),
    Cancelled,
}

/// Await `fut` unless the token fires first. A token that has already fired
/// wins over a ready future.
pub async fn await_or_cancel<T, F>(token: Option<&RunCancellationToken>, fut: F) -> CancelAware<T>
where
    F: std::future::Future<Output = T>,
{
    if let Some(token) = token {
        tokio::select! {
            biased;
            _ = token.cancelled() => CancelAware::Cancelled,
            value = fut => CancelAware::Value(value),
        }
    } else {
        CancelAware::Value(fut.await)
    }
}

/// Drive one run from a live event stream.
///
/// The caller opens the turn with [`ThreadSession::begin_turn`] first. The
/// stream is read until it ends, fails or the token fires; each run boundary
/// is reported to `sink`. Returns the terminal status of the conversation.
pub async fn drive_live<S, E>(
    session: &mut ThreadSession,
    events: S,
    cancellation_token: Option<&RunCancellationToken>,
    sink: &dyn RunLifecycleSink,
) -> Result<ConversationStatus, DriveError>
where
    S: Stream<Item = Result<Event, E>>,
    E: std::error::Error,
{
    drive_live_with_reason(session, events, cancellation_token, CANCELLED_BY_USER, sink).await
}

/// [`drive_live`] with the reason recorded if the token fires.
pub async fn drive_live_with_reason<S, E>(
    session: &mut ThreadSession,
    events: S,
    cancellation_token: Option<&RunCancellationToken>,
    cancel_reason: &str,
    sink: &dyn RunLifecycleSink,
) -> Result<ConversationStatus, DriveError>
where
    S: Stream<Item = Result<Event, E>>,
    E: std::error::Error,
{
    let mut events = std::pin::pin!(events);
    loop {
        let next = match await_or_cancel(cancellation_token, events.next()).await {
            CancelAware::Value(next) => next,
            CancelAware::Cancelled => {
                let transition = session.cancel(cancel_reason);
                notify(sink, session.thread_id(), transition.as_ref());
                break;
            }
        };
        match next {
            Some(Ok(event)) => {
                let transition = session.apply(&event);
                notify(sink, session.thread_id(), transition.as_ref());
            }
            Some(Err(err)) => {
                let message = err.to_string();
                let transition = session.apply(&Event::run_error(message.clone(), None));
                notify(sink, session.thread_id(), transition.as_ref());
                return Err(DriveError::Transport(message));
            }
            None => {
                let transition = session.finish_stream();
                notify(sink, session.thread_id(), transition.as_ref());
                break;
            }
        }
    }
    Ok(session.conversation().status.clone())
}

/// Replay stored runs in order through the same session logic used live.
pub fn replay_runs(session: &mut ThreadSession, runs: &[StoredRun]) -> Result<(), DriveError> {
    for run in runs {
        session.begin_turn(run.user_message.clone(), run.run_id.clone())?;
        for event in &run.events {
            session.apply(event);
        }
        if let Some(reason) = &run.cancelled_reason {
            session.cancel(reason.clone());
        }
        session.finish_stream();
    }
    Ok(())
}

/// Load a thread's history and rebuild its session.
pub async fn load_thread(
    store: &dyn HistoryStore,
    thread_id: &str,
    correlator: MessageStateCorrelator,
) -> Result<ThreadSession, DriveError> {
    let runs = store.load_runs(thread_id).await?;
    debug!(thread_id = %thread_id, runs = runs.len(), "replaying stored thread");
    let mut session = ThreadSession::with_correlator(thread_id, correlator);
    replay_runs(&mut session, &runs)?;
    Ok(session)
}

fn notify(sink: &dyn RunLifecycleSink, thread_id: &str, transition: Option<&RunTransition>) {
    match transition {
        Some(RunTransition::Started { run_id }) => sink.run_started(thread_id, run_id),
        Some(RunTransition::Ended { run_id, status }) => {
            sink.run_ended(thread_id, run_id.as_deref(), status)
        }
        None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn await_or_cancel_returns_value_without_token() {
        let out = await_or_cancel(None, async { 42 }).await;
        assert_eq!(out, CancelAware::Value(42));
    }

    #[tokio::test]
    async fn await_or_cancel_prefers_fired_token() {
        let token = RunCancellationToken::new();
        token.cancel();
        let out = await_or_cancel(Some(&token), async { 42 }).await;
        assert_eq!(out, CancelAware::Cancelled);
    }
}
