//! Patch operations for modifying JSON documents.
//!
//! Operations use the RFC 6902 wire shape (`{"op": "add", "path": "/a", ...}`),
//! which is what AG-UI `STATE_DELTA` events carry.

use crate::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single patch operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOp {
    /// Insert into an array or insert/overwrite an object member.
    ///
    /// `/-` appends to an array; an index inserts before that element.
    Add {
        path: Path,
        #[serde(default)]
        value: Value,
    },

    /// Delete the value at the path.
    Remove { path: Path },

    /// Replace an existing value. The path must already exist.
    Replace {
        path: Path,
        #[serde(default)]
        value: Value,
    },

    /// Remove the value at `from` and add it at `path`.
    Move { from: Path, path: Path },

    /// Add a copy of the value at `from` at `path`.
    Copy { from: Path, path: Path },

    /// Assert that the value at `path` equals `value`.
    Test {
        path: Path,
        #[serde(default)]
        value: Value,
    },
}

impl PatchOp {
    #[inline]
    pub fn add(path: Path, value: impl Into<Value>) -> Self {
        PatchOp::Add {
            path,
            value: value.into(),
        }
    }

    #[inline]
    pub fn remove(path: Path) -> Self {
        PatchOp::Remove { path }
    }

    #[inline]
    pub fn replace(path: Path, value: impl Into<Value>) -> Self {
        PatchOp::Replace {
            path,
            value: value.into(),
        }
    }

    #[inline]
    pub fn move_from(from: Path, path: Path) -> Self {
        PatchOp::Move { from, path }
    }

    #[inline]
    pub fn copy_from(from: Path, path: Path) -> Self {
        PatchOp::Copy { from, path }
    }

    #[inline]
    pub fn test(path: Path, value: impl Into<Value>) -> Self {
        PatchOp::Test {
            path,
            value: value.into(),
        }
    }

    /// Get the path this operation targets.
    #[inline]
    pub fn path(&self) -> &Path {
        match self {
            PatchOp::Add { path, .. }
            | PatchOp::Remove { path }
            | PatchOp::Replace { path, .. }
            | PatchOp::Move { path, .. }
            | PatchOp::Copy { path, .. }
            | PatchOp::Test { path, .. } => path,
        }
    }

    /// Get the operation name as it appears on the wire.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            PatchOp::Add { .. } => "add",
            PatchOp::Remove { .. } => "remove",
            PatchOp::Replace { .. } => "replace",
            PatchOp::Move { .. } => "move",
            PatchOp::Copy { .. } => "copy",
            PatchOp::Test { .. } => "test",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn deserializes_rfc6902_wire_shape() {
        let op: PatchOp =
            serde_json::from_value(json!({"op": "add", "path": "/items/-", "value": 3})).unwrap();
        assert_eq!(op, PatchOp::add(path!("items", "-"), json!(3)));
        assert_eq!(op.name(), "add");
    }

    #[test]
    fn replace_without_value_defaults_to_null() {
        let op: PatchOp =
            serde_json::from_value(json!({"op": "replace", "path": "/missing"})).unwrap();
        assert_eq!(op, PatchOp::replace(path!("missing"), Value::Null));
    }

    #[test]
    fn move_carries_from_path() {
        let op: PatchOp =
            serde_json::from_value(json!({"op": "move", "from": "/a", "path": "/b"})).unwrap();
        assert_eq!(op, PatchOp::move_from(path!("a"), path!("b")));
        assert_eq!(op.path(), &path!("b"));
    }

    #[test]
    fn unknown_op_is_rejected() {
        let parsed = serde_json::from_value::<PatchOp>(json!({"op": "merge", "path": "/a"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn serializes_back_to_wire_shape() {
        let op = PatchOp::remove(path!("a", 0));
        assert_eq!(
            serde_json::to_value(&op).unwrap(),
            json!({"op": "remove", "path": "/a/0"})
        );
    }
}
