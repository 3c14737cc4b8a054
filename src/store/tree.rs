//! Helpers for reading and rewriting a JSON tree addressed by [`StorePath`].
//!
//! Null values and empty objects never exist in the tree: writing `null`
//! deletes a node and any parent left empty by the delete is pruned.

use super::StorePath;
use serde_json::{Map, Value};

const SERVER_VALUE_KEY: &str = ".sv";
const SERVER_TIMESTAMP: &str = "timestamp";

/// Sentinel that a backend replaces with its own clock reading at commit time.
pub fn server_timestamp() -> Value {
    let mut map = Map::new();
    map.insert(SERVER_VALUE_KEY.to_string(), Value::String(SERVER_TIMESTAMP.to_string()));
    Value::Object(map)
}

pub fn is_server_timestamp(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.len() == 1
                && map.get(SERVER_VALUE_KEY).and_then(Value::as_str) == Some(SERVER_TIMESTAMP)
        }
        _ => false,
    }
}

/// Replaces every server timestamp sentinel inside `value` with `now_millis`.
pub fn resolve_server_values(value: &mut Value, now_millis: i64) {
    if is_server_timestamp(value) {
        *value = Value::from(now_millis);
        return;
    }
    match value {
        Value::Object(map) => map
            .values_mut()
            .for_each(|child| resolve_server_values(child, now_millis)),
        Value::Array(items) => items
            .iter_mut()
            .for_each(|child| resolve_server_values(child, now_millis)),
        _ => {}
    }
}

pub fn get_at<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    if is_absent(node) {
        None
    } else {
        Some(node)
    }
}

pub fn set_at(root: &mut Value, path: &StorePath, value: Value) {
    let value = prune(value);
    if is_absent(&value) {
        if path.is_root() {
            *root = Value::Null;
        } else if remove(root, path.segments()) {
            *root = Value::Null;
        }
        return;
    }
    insert(root, path.segments(), value);
}

fn is_absent(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Drops null members and empty objects so the stored shape is canonical.
fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .map(|(key, child)| (key, prune(child)))
                .filter(|(_, child)| !is_absent(child))
                .collect();
            if pruned.is_empty() {
                Value::Null
            } else {
                Value::Object(pruned)
            }
        }
        other => other,
    }
}

fn insert(node: &mut Value, segments: &[String], value: Value) {
    match segments.split_first() {
        None => *node = value,
        Some((head, rest)) => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                let child = map.entry(head.clone()).or_insert(Value::Null);
                insert(child, rest, value);
            }
        }
    }
}

// Returns true when `node` is left empty and should be dropped by its parent.
fn remove(node: &mut Value, segments: &[String]) -> bool {
    match segments.split_first() {
        None => true,
        Some((head, rest)) => {
            let Value::Object(map) = node else {
                return false;
            };
            let emptied = match map.get_mut(head.as_str()) {
                Some(child) => remove(child, rest),
                None => false,
            };
            if emptied {
                map.remove(head.as_str());
            }
            map.is_empty()
        }
    }
}
