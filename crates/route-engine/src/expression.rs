//! Dotted / grouped property-path lookup over a request context tree.
//!
//! An expression is one or more paths joined by a group separator, e.g.
//! `r.args.MediaSourceId:r.args.Tag`. The first segment of every path names
//! the root object and is skipped; callers always write it.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_PROPERTY_SPLIT: &str = ".";
pub const DEFAULT_GROUP_SPLIT: &str = ":";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("missing required root object")]
    MissingRootObject,
    #[error("property and group split must be non-empty strings")]
    InvalidSplitArgument,
}

/// Resolve `expression` with the default `.` / `:` separators.
pub fn resolve_default(
    root: Option<&Value>,
    expression: &str,
) -> Result<Option<String>, ResolveError> {
    resolve(root, expression, DEFAULT_PROPERTY_SPLIT, DEFAULT_GROUP_SPLIT)
}

/// Resolve `expression` against `root`.
///
/// Returns `Ok(None)` for a blank expression. A missing property makes its
/// path contribute nothing; empty and falsy values are dropped before the
/// remaining values are joined with `group_split`.
pub fn resolve(
    root: Option<&Value>,
    expression: &str,
    property_split: &str,
    group_split: &str,
) -> Result<Option<String>, ResolveError> {
    let root = root.ok_or(ResolveError::MissingRootObject)?;
    if expression.trim().is_empty() {
        return Ok(None);
    }
    if property_split.is_empty() || group_split.is_empty() {
        return Err(ResolveError::InvalidSplitArgument);
    }

    let values: Vec<String> = expression
        .split(group_split)
        .filter(|path| !path.trim().is_empty())
        .filter_map(|path| lookup(root, path, property_split))
        .filter_map(truthy_string)
        .collect();

    Ok(Some(values.join(group_split)))
}

fn lookup<'a>(root: &'a Value, path: &str, property_split: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split(property_split).skip(1) {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => {
                debug!(property = segment, path, "property not found; ignoring");
                return None;
            }
        }
    }
    Some(current)
}

/// Render a resolved value, dropping the falsy ones (`""`, `null`, `false`, `0`).
fn truthy_string(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        other => Some(other.to_string()),
    }
}
