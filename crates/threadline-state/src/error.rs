//! Patch errors.

use crate::Path;
use serde_json::Value;
use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// Why an operation did not apply.
///
/// Only [`try_apply_patch`](crate::try_apply_patch) returns these. The lenient
/// [`apply_patch`](crate::apply_patch) logs them at debug level and moves on.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("path not found: '{path}'")]
    PathNotFound { path: Path },

    #[error("index {index} out of bounds (len: {len}) at path '{path}'")]
    IndexOutOfBounds { path: Path, index: usize, len: usize },

    #[error("type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: Path,
        expected: &'static str,
        found: &'static str,
    },

    /// A `test` op compared unequal. This one rejects the whole patch.
    #[error("test failed at '{path}'")]
    TestFailed { path: Path },

    #[error("invalid pointer '{pointer}': {reason}")]
    InvalidPointer {
        pointer: String,
        reason: &'static str,
    },

    /// Structurally impossible op, such as moving a value into its own child.
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StateError {
    pub fn path_not_found(path: Path) -> Self {
        Self::PathNotFound { path }
    }

    pub fn index_out_of_bounds(path: Path, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds { path, index, len }
    }

    pub fn type_mismatch(path: Path, expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch {
            path,
            expected,
            found,
        }
    }

    pub fn test_failed(path: Path) -> Self {
        Self::TestFailed { path }
    }

    pub fn invalid_pointer(pointer: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidPointer {
            pointer: pointer.into(),
            reason,
        }
    }

    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    pub fn aborts_patch(&self) -> bool {
        matches!(self, Self::TestFailed { .. })
    }
}

/// JSON type name used in mismatch messages.
pub fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
