//! AG-UI client-side event processing.
//!
//! Turns an ordered stream of AG-UI events into a [`Conversation`], tracks
//! per-run streaming state, correlates RAG citations with user turns, and
//! drives the same logic from either a live stream or stored history.
//!
//! [`Conversation`]: threadline_contract::Conversation
#![allow(missing_docs)]

pub mod citation;
pub mod config;
pub mod driver;
pub mod events;
pub mod history;
pub mod message_state;
pub mod processor;
pub mod session;
pub mod streaming;

pub use citation::{CitationCorrelator, HistoryShape, PointerHistoryShape, TurnCitations};
pub use config::{CitationConfig, ConfigError, HistoryShapeConfig};
pub use driver::{
    await_or_cancel, drive_live, drive_live_with_reason, load_thread, replay_runs, CancelAware,
    DriveError, RunCancellationToken, CANCELLED_BY_USER,
};
pub use events::{BaseEvent, Event, Role};
pub use history::{HistoryStore, HistoryStoreError, MemoryHistoryStore, StoredRun, StoredThread};
pub use message_state::{MessageStateCorrelator, RunRecord};
pub use processor::{cancel_run, process_event, EventOutcome, RunTransition};
pub use session::{SessionError, ThreadSession, UserTurn, STREAM_ENDED_EARLY};
pub use streaming::{StreamingState, TextPhase};
