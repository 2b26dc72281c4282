//! Patch application logic.
//!
//! Both entry points are pure: the input document is cloned and the clone is
//! edited, so a caller holding the previous tree keeps an unchanged value.

use crate::{
    error::{value_type_name, StateError, StateResult},
    path::ArrayPos,
    PatchOp, Path, Seg,
};
use serde_json::Value;
use tracing::debug;

/// Apply a patch to a JSON document, skipping operations that do not fit.
///
/// This is the stream-safe variant: a `replace`/`remove` on a missing path, an
/// out-of-range index or a type mismatch skips that single operation. A failed
/// `test` rejects the whole patch and the input is returned unchanged. Nothing
/// is ever raised to the caller.
///
/// # Examples
///
/// ```
/// use threadline_state::{apply_patch, PatchOp, path};
/// use serde_json::json;
///
/// let doc = json!({"items": ["a", "b"]});
/// let ops = vec![
///     PatchOp::add(path!("items", "-"), json!("c")),
///     PatchOp::replace(path!("missing"), json!(1)),
/// ];
///
/// let new_doc = apply_patch(&doc, &ops);
/// assert_eq!(new_doc, json!({"items": ["a", "b", "c"]}));
///
/// // the input tree is left as it was
/// assert_eq!(doc, json!({"items": ["a", "b"]}));
/// ```
pub fn apply_patch(doc: &Value, ops: &[PatchOp]) -> Value {
    let mut result = doc.clone();

    for op in ops {
        if let Err(err) = apply_op(&mut result, op) {
            if err.aborts_patch() {
                debug!(error = %err, ops = ops.len(), "patch rejected");
                return doc.clone();
            }
            debug!(
                op = op.name(),
                path = %op.path(),
                error = %err,
                "skipping patch operation"
            );
        }
    }

    result
}

/// Apply a patch, failing on the first operation that does not fit.
///
/// # Examples
///
/// ```
/// use threadline_state::{try_apply_patch, PatchOp, StateError, path};
/// use serde_json::json;
///
/// let doc = json!({"count": 0});
/// let err = try_apply_patch(&doc, &[PatchOp::replace(path!("missing"), json!(1))]);
/// assert!(matches!(err, Err(StateError::PathNotFound { .. })));
/// ```
pub fn try_apply_patch(doc: &Value, ops: &[PatchOp]) -> StateResult<Value> {
    let mut result = doc.clone();

    for op in ops {
        apply_op(&mut result, op)?;
    }

    Ok(result)
}

/// Apply a single operation to a document (mutating).
///
/// On error the document is left as it was before the call.
pub(crate) fn apply_op(doc: &mut Value, op: &PatchOp) -> StateResult<()> {
    match op {
        PatchOp::Add { path, value } => apply_add(doc, path, value.clone()),
        PatchOp::Remove { path } => apply_remove(doc, path).map(|_| ()),
        PatchOp::Replace { path, value } => apply_replace(doc, path, value.clone()),
        PatchOp::Move { from, path } => apply_move(doc, from, path),
        PatchOp::Copy { from, path } => {
            let value = get_at_path(doc, from)
                .cloned()
                .ok_or_else(|| StateError::path_not_found(from.clone()))?;
            apply_add(doc, path, value)
        }
        PatchOp::Test { path, value } => match get_at_path(doc, path) {
            Some(current) if current == value => Ok(()),
            _ => Err(StateError::test_failed(path.clone())),
        },
    }
}

fn apply_add(doc: &mut Value, path: &Path, value: Value) -> StateResult<()> {
    let Some((last, parent)) = path.split_last() else {
        *doc = value;
        return Ok(());
    };

    let container = get_at_path_mut(doc, parent)
        .ok_or_else(|| StateError::path_not_found(Path::from_segments(parent.to_vec())))?;

    match container {
        Value::Object(obj) => {
            obj.insert(last.object_key().into_owned(), value);
            Ok(())
        }
        Value::Array(arr) => match last.array_pos() {
            Some(ArrayPos::End) => {
                arr.push(value);
                Ok(())
            }
            Some(ArrayPos::At(idx)) if idx <= arr.len() => {
                arr.insert(idx, value);
                Ok(())
            }
            Some(ArrayPos::At(idx)) => {
                Err(StateError::index_out_of_bounds(path.clone(), idx, arr.len()))
            }
            None => Err(StateError::type_mismatch(path.clone(), "array index", "key")),
        },
        other => {
            Err(StateError::type_mismatch(path.clone(), "object or array", value_type_name(other)))
        }
    }
}

fn apply_replace(doc: &mut Value, path: &Path, value: Value) -> StateResult<()> {
    let target = get_at_path_mut(doc, path.segments())
        .ok_or_else(|| StateError::path_not_found(path.clone()))?;
    *target = value;
    Ok(())
}

/// Remove and return the value at `path`. Removing the root leaves `null`.
fn apply_remove(doc: &mut Value, path: &Path) -> StateResult<Value> {
    let Some((last, parent)) = path.split_last() else {
        return Ok(std::mem::take(doc));
    };

    let container =
        get_at_path_mut(doc, parent).ok_or_else(|| StateError::path_not_found(path.clone()))?;

    match container {
        Value::Object(obj) => obj
            .remove(&*last.object_key())
            .ok_or_else(|| StateError::path_not_found(path.clone())),
        Value::Array(arr) => match last.array_pos() {
            Some(ArrayPos::At(idx)) if idx < arr.len() => Ok(arr.remove(idx)),
            Some(ArrayPos::At(idx)) => {
                Err(StateError::index_out_of_bounds(path.clone(), idx, arr.len()))
            }
            _ => Err(StateError::path_not_found(path.clone())),
        },
        _ => Err(StateError::path_not_found(path.clone())),
    }
}

fn apply_move(doc: &mut Value, from: &Path, path: &Path) -> StateResult<()> {
    if from == path {
        return get_at_path(doc, from)
            .map(|_| ())
            .ok_or_else(|| StateError::path_not_found(from.clone()));
    }
    if from.is_proper_prefix_of(path) {
        return Err(StateError::invalid_operation(format!(
            "cannot move '{from}' into its own child '{path}'"
        )));
    }

    // Work on a scratch copy so a failing add does not leave the value removed.
    let mut scratch = doc.clone();
    let value = apply_remove(&mut scratch, from)?;
    apply_add(&mut scratch, path, value)?;
    *doc = scratch;
    Ok(())
}

/// Get a mutable reference to an existing value.
fn get_at_path_mut<'a>(current: &'a mut Value, segments: &[Seg]) -> Option<&'a mut Value> {
    match segments {
        [] => Some(current),
        [seg, rest @ ..] => {
            let child = match current {
                Value::Object(obj) => obj.get_mut(&*seg.object_key())?,
                Value::Array(arr) => match seg.array_pos()? {
                    ArrayPos::At(idx) => arr.get_mut(idx)?,
                    ArrayPos::End => return None,
                },
                _ => return None,
            };
            get_at_path_mut(child, rest)
        }
    }
}

/// Get a reference to a value at a path (for reading).
///
/// ```
/// use threadline_state::{get_at_path, path};
/// use serde_json::json;
///
/// let doc = json!({"a": {"b": [10, 20]}});
/// assert_eq!(get_at_path(&doc, &path!("a", "b", 1)), Some(&json!(20)));
/// assert_eq!(get_at_path(&doc, &path!("a", "x")), None);
/// ```
pub fn get_at_path<'a>(doc: &'a Value, path: &Path) -> Option<&'a Value> {
    let mut current = doc;
    for seg in path.segments() {
        current = match current {
            Value::Object(obj) => obj.get(&*seg.object_key())?,
            Value::Array(arr) => match seg.array_pos()? {
                ArrayPos::At(idx) => arr.get(idx)?,
                ArrayPos::End => return None,
            },
            _ => return None,
        };
    }
    Some(current)
}
