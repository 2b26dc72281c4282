#![allow(missing_docs)]

use futures::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::sync::Mutex;
use threadline_contract::{ConversationStatus, RunLifecycleSink};
use threadline_protocol_ag_ui::{
    drive_live, load_thread, DriveError, Event, MemoryHistoryStore, MessageStateCorrelator,
    RunCancellationToken, StoredRun, StoredThread, ThreadSession, UserTurn, CANCELLED_BY_USER,
};

#[derive(Default)]
struct RecordingSink {
    calls: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RunLifecycleSink for RecordingSink {
    fn run_started(&self, thread_id: &str, run_id: &str) {
        self.calls
            .lock()
            .unwrap()
            .push(format!("start {thread_id} {run_id}"));
    }

    fn run_ended(&self, thread_id: &str, run_id: Option<&str>, status: &ConversationStatus) {
        self.calls.lock().unwrap().push(format!(
            "end {thread_id} {} {}",
            run_id.unwrap_or("-"),
            serde_json::to_value(status).unwrap()["status"]
        ));
    }
}

fn citation(doc: &str) -> Value {
    json!({"document_id": doc, "chunk_id": format!("{doc}#0"), "content": "..."})
}

fn stored_runs() -> Vec<StoredRun> {
    vec![
        StoredRun {
            run_id: Some("r1".into()),
            user_message: UserTurn::new("u1", "what is rust?"),
            events: vec![
                Event::run_started("t1", "r1", None),
                Event::state_snapshot(json!({"ask_history": {"questions": []}})),
                Event::thinking_start("a1"),
                Event::thinking_content("a1", "look it "),
                Event::thinking_content("a1", "up"),
                Event::text_message_start("a1"),
                Event::text_message_content("a1", "A systems "),
                Event::text_message_content("a1", "language."),
                Event::text_message_end("a1"),
                Event::tool_call_start("c1", "search", Some("a1".into())),
                Event::tool_call_args("c1", "{\"q\":\"rust\"}"),
                Event::tool_call_end("c1"),
                Event::tool_call_result("tm1", "c1", "ok"),
                Event::state_delta(vec![json!({
                    "op": "add",
                    "path": "/ask_history/questions/-",
                    "value": {"question": "what is rust?", "citations": [citation("book")]},
                })]),
                Event::run_finished("t1", "r1", None),
            ],
            cancelled_reason: None,
        },
        StoredRun {
            run_id: Some("r2".into()),
            user_message: UserTurn::new("u2", "and ownership?"),
            events: vec![
                Event::run_started("t1", "r2", None),
                Event::text_message_start("a2"),
                Event::text_message_content("a2", "Each value has"),
                Event::state_delta(vec![json!({
                    "op": "add",
                    "path": "/ask_history/questions/-",
                    "value": {"question": "and ownership?", "citations": [citation("nomicon")]},
                })]),
            ],
            cancelled_reason: Some(CANCELLED_BY_USER.into()),
        },
        StoredRun {
            run_id: None,
            user_message: UserTurn::new("u3", "thanks"),
            events: vec![
                Event::run_started("t1", "r3", None),
                Event::text_message_start("a3"),
                Event::text_message_content("a3", "You're welcome"),
                Event::text_message_end("a3"),
                Event::run_finished("t1", "r3", None),
            ],
            cancelled_reason: None,
        },
    ]
}

/// Drive the runs through the live path, yielding between events the way a
/// network stream would.
async fn drive_runs_live(runs: &[StoredRun], sink: &RecordingSink) -> ThreadSession {
    let mut session = ThreadSession::new("t1");
    for run in runs {
        session
            .begin_turn(run.user_message.clone(), run.run_id.clone())
            .unwrap();
        let token = RunCancellationToken::new();
        let events = stream::iter(run.events.clone())
            .then(|event| async move {
                tokio::task::yield_now().await;
                Ok::<Event, std::io::Error>(event)
            })
            .boxed();
        let events = if run.cancelled_reason.is_some() {
            // Hold the stream open and cancel once every event was delivered.
            let cancel = token.clone();
            events
                .chain(stream::once(async move {
                    cancel.cancel();
                    futures::future::pending::<Result<Event, std::io::Error>>().await
                }))
                .boxed()
        } else {
            events
        };
        drive_live(&mut session, events, Some(&token), sink)
            .await
            .unwrap();
    }
    session
}

#[tokio::test]
async fn live_and_replay_produce_identical_records() {
    let runs = stored_runs();
    let sink = RecordingSink::default();
    let live = drive_runs_live(&runs, &sink).await;

    let store = MemoryHistoryStore::from_threads([StoredThread {
        thread_id: "t1".into(),
        runs: runs.clone(),
    }]);
    let replayed = load_thread(&store, "t1", MessageStateCorrelator::default())
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_string(live.conversation()).unwrap(),
        serde_json::to_string(replayed.conversation()).unwrap()
    );
    assert_eq!(
        serde_json::to_string(&live.message_states()).unwrap(),
        serde_json::to_string(&replayed.message_states()).unwrap()
    );
    assert_eq!(live.ledger(), replayed.ledger());
}

#[tokio::test]
async fn live_run_records_expected_transcript() {
    let sink = RecordingSink::default();
    let session = drive_runs_live(&stored_runs(), &sink).await;
    let conv = session.conversation();

    let a1 = conv.text_message("a1").unwrap();
    assert_eq!(a1.text, "A systems language.");
    assert_eq!(a1.thinking_text, "look it up");
    let a2 = conv.text_message("a2").unwrap();
    assert_eq!(a2.text, "Each value has");
    assert!(!a2.is_streaming);
    assert_eq!(conv.status, ConversationStatus::Completed);

    let states = session.message_states();
    assert_eq!(states["u1"].source_references[0].document_id, "book");
    assert_eq!(states["u2"].source_references[0].document_id, "nomicon");
    assert_eq!(states["u2"].run_id.as_deref(), Some("r2"));
    assert!(states["u3"].source_references.is_empty());
    assert_eq!(states["u3"].run_id.as_deref(), Some("r3"));

    assert_eq!(
        sink.calls(),
        vec![
            "start t1 r1",
            "end t1 r1 \"completed\"",
            "start t1 r2",
            "end t1 r2 \"cancelled\"",
            "start t1 r3",
            "end t1 r3 \"completed\"",
        ]
    );
}

#[tokio::test]
async fn transport_error_fails_the_run() {
    let mut session = ThreadSession::new("t1");
    session.begin_turn(UserTurn::new("u1", "hi"), None).unwrap();
    let events = stream::iter(vec![
        Ok(Event::run_started("t1", "r1", None)),
        Ok(Event::text_message_start("a1")),
        Ok(Event::text_message_content("a1", "par")),
        Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer")),
        Ok(Event::text_message_content("a1", "never seen")),
    ]);
    let sink = RecordingSink::default();

    let err = drive_live(&mut session, events, None, &sink)
        .await
        .unwrap_err();
    assert!(matches!(err, DriveError::Transport(ref msg) if msg.contains("reset by peer")));
    assert!(matches!(
        session.conversation().status,
        ConversationStatus::Failed { .. }
    ));
    assert_eq!(session.conversation().text_message("a1").unwrap().text, "par");
    assert_eq!(sink.calls().last().map(String::as_str), Some("end t1 r1 \"failed\""));
}

#[tokio::test]
async fn stream_closing_mid_run_fails_the_run() {
    let mut session = ThreadSession::new("t1");
    session.begin_turn(UserTurn::new("u1", "hi"), None).unwrap();
    let events = stream::iter(vec![
        Ok::<_, std::io::Error>(Event::run_started("t1", "r1", None)),
        Ok(Event::text_message_start("a1")),
    ]);
    let status = drive_live(&mut session, events, None, &RecordingSink::default())
        .await
        .unwrap();
    assert!(matches!(status, ConversationStatus::Failed { .. }));
    assert!(session.conversation().can_start_run());
}
