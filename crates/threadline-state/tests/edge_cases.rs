//! Lenient application against malformed or stale patches.

use serde_json::json;
use threadline_state::{apply_patch, path, try_apply_patch, PatchOp, StateError};

#[test]
fn replace_on_missing_path_returns_tree_unchanged() {
    let trees = [
        json!({}),
        json!({"a": 1}),
        json!([1, 2, 3]),
        json!("scalar"),
        json!(null),
    ];
    let ops: Vec<PatchOp> =
        serde_json::from_value(json!([{"op": "replace", "path": "/missing"}])).unwrap();

    for tree in trees {
        assert_eq!(apply_patch(&tree, &ops), tree);
    }
}

#[test]
fn append_to_items() {
    let tree = json!({"items": ["A", "B"]});
    let ops: Vec<PatchOp> =
        serde_json::from_value(json!([{"op": "add", "path": "/items/-", "value": "X"}])).unwrap();
    assert_eq!(apply_patch(&tree, &ops), json!({"items": ["A", "B", "X"]}));
}

#[test]
fn stale_index_is_skipped_but_later_ops_apply() {
    let tree = json!({"history": [{"n": 0}], "status": "old"});
    let ops = vec![
        PatchOp::replace(path!("history", 4, "n"), json!(4)),
        PatchOp::remove(path!("history", 9)),
        PatchOp::replace(path!("status"), json!("new")),
    ];

    assert_eq!(
        apply_patch(&tree, &ops),
        json!({"history": [{"n": 0}], "status": "new"})
    );
}

#[test]
fn add_into_scalar_is_skipped() {
    let tree = json!({"name": "x"});
    let ops = vec![PatchOp::add(path!("name", "first"), json!("y"))];

    assert_eq!(apply_patch(&tree, &ops), tree);
    assert!(matches!(
        try_apply_patch(&tree, &ops),
        Err(StateError::TypeMismatch { .. })
    ));
}

#[test]
fn key_segment_on_array_is_skipped() {
    let tree = json!({"items": [1]});
    let ops = vec![PatchOp::add(path!("items", "first"), json!(2))];
    assert_eq!(apply_patch(&tree, &ops), tree);
}

#[test]
fn remove_root_yields_null() {
    let tree = json!({"a": 1});
    assert_eq!(
        apply_patch(&tree, &[PatchOp::remove(path!())]),
        serde_json::Value::Null
    );
}

#[test]
fn append_marker_cannot_be_replaced_or_removed() {
    let tree = json!({"items": [1]});
    let ops = vec![
        PatchOp::replace(path!("items", "-"), json!(2)),
        PatchOp::remove(path!("items", "-")),
    ];
    assert_eq!(apply_patch(&tree, &ops), tree);
}

#[test]
fn pointer_with_invalid_escape_fails_to_deserialize() {
    let parsed = serde_json::from_value::<Vec<PatchOp>>(json!([
        {"op": "add", "path": "/a~9", "value": 1}
    ]));
    assert!(parsed.is_err());
}
