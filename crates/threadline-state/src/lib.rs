//! Immutable JSON state tree with RFC 6902 patch application.
//!
//! `threadline-state` is the patch engine behind AG-UI `STATE_SNAPSHOT` /
//! `STATE_DELTA` handling. It never edits a document in place: every call
//! returns a new tree, so the same `(State, Patch)` pair replays to the same
//! result and earlier versions stay valid.
//!
//! ```text
//! State' = apply_patch(State, Patch)
//! ```
//!
//! Two entry points share one implementation:
//!
//! - [`apply_patch`] is lenient. Operations that do not fit the tree (a
//!   `replace` on a missing path, an out-of-range index) are skipped, and a
//!   failed `test` rejects the patch as a whole. It never fails, which is what a
//!   live event stream needs.
//! - [`try_apply_patch`] is strict and reports the first failure as a
//!   [`StateError`].
//!
//! # Quick Start
//!
//! ```
//! use threadline_state::{apply_patch, PatchOp};
//! use serde_json::json;
//!
//! let state = json!({"items": ["a", "b"]});
//! let ops: Vec<PatchOp> = serde_json::from_value(json!([
//!     {"op": "add", "path": "/items/-", "value": "c"},
//!     {"op": "replace", "path": "/missing", "value": 1},
//! ]))
//! .unwrap();
//!
//! let next = apply_patch(&state, &ops);
//! assert_eq!(next, json!({"items": ["a", "b", "c"]}));
//! assert_eq!(state, json!({"items": ["a", "b"]}));
//! ```

mod apply;
mod error;
mod op;
mod path;

pub use apply::{apply_patch, get_at_path, try_apply_patch};
pub use error::{value_type_name, StateError, StateResult};
pub use op::PatchOp;
pub use path::{Path, Seg};

// Re-export serde_json::Value for convenience
pub use serde_json::Value;
