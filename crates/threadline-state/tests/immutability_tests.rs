//! Tests for immutability and deterministic replay.
//!
//! These tests verify that:
//! 1. apply_patch never mutates the original document
//! 2. Same (State, Patch) always produces the same result
//! 3. Earlier versions stay usable while later versions are derived

use serde_json::{json, Value};
use threadline_state::{apply_patch, path, try_apply_patch, PatchOp};

fn citation_delta(index: usize) -> Vec<PatchOp> {
    vec![PatchOp::add(
        path!("ask_history", "questions", "-"),
        json!({
            "question": format!("q{index}"),
            "citations": [{"document_id": format!("doc-{index}"), "chunk_id": "c0"}],
        }),
    )]
}

#[test]
fn apply_patch_does_not_mutate_original() {
    let original = json!({"ask_history": {"questions": []}, "counter": 1});
    let snapshot = original.clone();

    let ops = vec![
        PatchOp::replace(path!("counter"), json!(2)),
        PatchOp::add(path!("ask_history", "questions", "-"), json!({"citations": []})),
        PatchOp::remove(path!("counter")),
    ];
    let next = apply_patch(&original, &ops);

    assert_eq!(original, snapshot, "apply_patch mutated the original state!");
    assert_ne!(next, original);
}

#[test]
fn noop_patch_returns_equal_but_distinct_value() {
    let original = json!({"a": [1, 2, 3]});
    let next = apply_patch(
        &original,
        &[PatchOp::replace(path!("missing"), Value::Null)],
    );

    assert_eq!(next, original);
    assert!(!std::ptr::eq(&next, &original));
}

#[test]
fn replay_is_deterministic() {
    let deltas: Vec<Vec<PatchOp>> = (0..5).map(citation_delta).collect();

    let first = deltas
        .iter()
        .fold(json!({"ask_history": {"questions": []}}), |acc, ops| {
            apply_patch(&acc, ops)
        });
    let second = deltas
        .iter()
        .fold(json!({"ask_history": {"questions": []}}), |acc, ops| {
            apply_patch(&acc, ops)
        });

    assert_eq!(first, second);
    assert_eq!(first["ask_history"]["questions"].as_array().unwrap().len(), 5);
}

#[test]
fn every_intermediate_version_stays_valid() {
    let mut versions = vec![json!({"ask_history": {"questions": []}})];
    for i in 0..3 {
        let next = apply_patch(versions.last().unwrap(), &citation_delta(i));
        versions.push(next);
    }

    for (len, version) in versions.iter().enumerate() {
        assert_eq!(
            version["ask_history"]["questions"].as_array().unwrap().len(),
            len
        );
    }
}

#[test]
fn strict_failure_leaves_input_untouched() {
    let original = json!({"list": [1]});
    let snapshot = original.clone();
    let ops = vec![
        PatchOp::add(path!("list", "-"), json!(2)),
        PatchOp::replace(path!("nope"), json!(0)),
    ];

    assert!(try_apply_patch(&original, &ops).is_err());
    assert_eq!(original, snapshot);
}
