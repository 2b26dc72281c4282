use clap::Parser;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::path::PathBuf;
use threadline_contract::{ConversationStatus, RunLifecycleSink};
use threadline_protocol_ag_ui::{
    drive_live, drive_live_with_reason, load_thread, CitationConfig, CitationCorrelator, Event,
    HistoryStore, MemoryHistoryStore, MessageStateCorrelator, RunCancellationToken, StoredRun,
    ThreadSession,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "threadline-replay",
    about = "Replay a stored AG-UI thread and print its transcript and citation records"
)]
struct Args {
    /// JSON file holding an array of stored threads.
    #[arg(long, env = "THREADLINE_HISTORY")]
    history: PathBuf,

    /// Thread to replay; defaults to the lowest thread id in the file.
    #[arg(long, env = "THREADLINE_THREAD_ID")]
    thread_id: Option<String>,

    /// JSON file listing citation history shapes.
    #[arg(long, env = "THREADLINE_CITATION_CONFIG")]
    citation_config: Option<PathBuf>,

    /// Drive the runs through the async live path instead of bulk replay.
    #[arg(long)]
    live: bool,
}

/// Logs run boundaries.
struct TracingSink;

impl RunLifecycleSink for TracingSink {
    fn run_started(&self, thread_id: &str, run_id: &str) {
        info!(thread_id, run_id, "run started");
    }

    fn run_ended(&self, thread_id: &str, run_id: Option<&str>, status: &ConversationStatus) {
        info!(thread_id, run_id = ?run_id, status = ?status, "run ended");
    }
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("{message}");
    std::process::exit(2);
}

async fn drive_runs_live(
    session: &mut ThreadSession,
    runs: &[StoredRun],
) -> Result<(), threadline_protocol_ag_ui::DriveError> {
    let sink = TracingSink;
    for run in runs {
        session.begin_turn(run.user_message.clone(), run.run_id.clone())?;
        let token = RunCancellationToken::new();
        let events = stream::iter(run.events.clone()).map(Ok::<Event, std::io::Error>);
        match &run.cancelled_reason {
            // Keep the stream open and fire the token once the recorded
            // events are delivered.
            Some(reason) => {
                let cancel = token.clone();
                let events = events.chain(stream::once(async move {
                    cancel.cancel();
                    futures::future::pending::<Result<Event, std::io::Error>>().await
                }));
                drive_live_with_reason(session, events, Some(&token), reason, &sink).await?;
            }
            None => {
                drive_live(session, events, Some(&token), &sink).await?;
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let citation_config = match args.citation_config.as_ref() {
        Some(path) => CitationConfig::load(path)
            .await
            .unwrap_or_else(|e| fail(e)),
        None => CitationConfig::default(),
    };
    let correlator = CitationCorrelator::from_config(&citation_config)
        .map(MessageStateCorrelator::new)
        .unwrap_or_else(|e| fail(e));

    let raw = match tokio::fs::read_to_string(&args.history).await {
        Ok(s) => s,
        Err(e) => fail(format!("cannot read {}: {e}", args.history.display())),
    };
    let store = MemoryHistoryStore::from_json_str(&raw).unwrap_or_else(|e| fail(e));

    let thread_id = match args.thread_id {
        Some(id) => id,
        None => match store.thread_ids().await.into_iter().next() {
            Some(id) => id,
            None => fail("history file contains no threads"),
        },
    };

    let session = if args.live {
        let runs = store
            .load_runs(&thread_id)
            .await
            .unwrap_or_else(|e| fail(e));
        let mut session = ThreadSession::with_correlator(thread_id.clone(), correlator);
        if let Err(e) = drive_runs_live(&mut session, &runs).await {
            fail(e);
        }
        session
    } else {
        load_thread(&store, &thread_id, correlator)
            .await
            .unwrap_or_else(|e| fail(e))
    };

    info!(
        thread_id = %thread_id,
        messages = session.conversation().messages.len(),
        runs = session.ledger().len(),
        "thread rebuilt"
    );

    let output = json!({
        "conversation": session.conversation(),
        "messageStates": session.message_states(),
    });
    match serde_json::to_string_pretty(&output) {
        Ok(text) => println!("{text}"),
        Err(e) => fail(format!("failed to encode output: {e}")),
    }
}
