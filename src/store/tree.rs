//! JSON tree manipulation shared by the store backends.
//!
//! The tree follows realtime-database semantics: `null` is never stored,
//! and an object that loses its last child disappears.

use serde_json::{Map, Value};

/// Look up the node at `segs`.
pub fn get<'a>(root: &'a Value, segs: &[&str]) -> Option<&'a Value> {
    let mut node = root;
    for seg in segs {
        node = node.as_object()?.get(*seg)?;
    }
    if node.is_null() {
        None
    } else {
        Some(node)
    }
}

/// Replace the node at `segs`.  Writing `None` removes it.
pub fn put(root: &mut Value, segs: &[&str], value: Option<Value>) {
    let value = value.and_then(prune);
    match segs.split_first() {
        None => *root = value.unwrap_or(Value::Null),
        Some((first, rest)) => {
            if !root.is_object() {
                if value.is_none() {
                    return;
                }
                *root = Value::Object(Map::new());
            }
            let Some(map) = root.as_object_mut() else {
                return;
            };
            if rest.is_empty() {
                match value {
                    Some(v) => {
                        map.insert((*first).to_string(), v);
                    }
                    None => {
                        map.remove(*first);
                    }
                }
            } else {
                let removing = value.is_none();
                if removing && !map.contains_key(*first) {
                    return;
                }
                let child = map
                    .entry((*first).to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                put(child, rest, value);
                if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
                    map.remove(*first);
                }
            }
        }
    }
}

/// Strip nulls and empty objects from a value about to be stored.
pub fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let cleaned: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| prune(v).map(|v| (k, v)))
                .collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Object(cleaned))
            }
        }
        other => Some(other),
    }
}

/// Flatten a value into `(relative path, leaf)` pairs.
///
/// Arrays are kept whole as leaves.
pub fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (k, v) in map {
                let child = super::path::join(prefix, k);
                flatten(&child, v, out);
            }
        }
        leaf => out.push((prefix.to_string(), leaf.clone())),
    }
}

/// Rebuild a tree from `(relative path, leaf)` pairs.
pub fn unflatten(leaves: Vec<(String, Value)>) -> Option<Value> {
    let mut root = Value::Null;
    for (rel, leaf) in leaves {
        let segs = super::path::segments(&rel);
        put(&mut root, &segs, Some(leaf));
    }
    if root.is_null() {
        None
    } else {
        Some(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn put_creates_intermediate_objects() {
        let mut root = Value::Null;
        put(&mut root, &["a", "b", "c"], Some(json!(1)));
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));
        assert_eq!(get(&root, &["a", "b"]), Some(&json!({"c": 1})));
    }

    #[test]
    fn removing_last_child_prunes_parents() {
        let mut root = json!({"a": {"b": {"c": 1}}, "z": true});
        put(&mut root, &["a", "b", "c"], None);
        assert_eq!(root, json!({"z": true}));
    }

    #[test]
    fn removing_missing_path_is_noop() {
        let mut root = json!({"a": 1});
        put(&mut root, &["x", "y"], None);
        assert_eq!(root, json!({"a": 1}));
    }

    #[test]
    fn writing_below_scalar_replaces_it() {
        let mut root = json!({"a": 5});
        put(&mut root, &["a", "b"], Some(json!(true)));
        assert_eq!(root, json!({"a": {"b": true}}));
    }

    #[test]
    fn prune_drops_nulls_and_empty_objects() {
        let v = json!({"a": null, "b": {}, "c": {"d": null}, "e": 0});
        assert_eq!(prune(v), Some(json!({"e": 0})));
        assert_eq!(prune(json!({})), None);
    }

    #[test]
    fn flatten_and_unflatten_agree() {
        let v = json!({"a": {"b": 1, "c": "x"}, "d": [1, 2]});
        let mut leaves = Vec::new();
        flatten("", &v, &mut leaves);
        assert_eq!(leaves.len(), 3);
        assert_eq!(unflatten(leaves), Some(v));
    }
}
