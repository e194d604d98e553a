//! Ordered and limited queries over the children of a node.

use std::cmp::Ordering;

use serde_json::Value;

/// A query over the direct children of a store node.
///
/// Children are ordered by key unless [`Query::order_by_child`] is set, in
/// which case they are ordered by that field (missing fields sort first)
/// with the key as tie-break.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub order_by_child: Option<String>,
    pub equal_to: Option<Value>,
    pub limit_to_last: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_by_child(mut self, field: impl Into<String>) -> Self {
        self.order_by_child = Some(field.into());
        self
    }

    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    pub fn limit_to_last(mut self, n: usize) -> Self {
        self.limit_to_last = Some(n);
        self
    }

    /// Run the query against a node snapshot.
    pub fn apply(&self, node: Option<&Value>) -> Vec<(String, Value)> {
        let Some(Value::Object(map)) = node else {
            return Vec::new();
        };
        let mut children: Vec<(String, Value)> =
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

        if let Some(expected) = &self.equal_to {
            children.retain(|(_, v)| self.sort_value(v) == Some(expected));
        }

        match &self.order_by_child {
            Some(_) => children.sort_by(|(ka, va), (kb, vb)| {
                compare_values(self.sort_value(va), self.sort_value(vb)).then_with(|| ka.cmp(kb))
            }),
            None => children.sort_by(|(ka, _), (kb, _)| ka.cmp(kb)),
        }

        if let Some(n) = self.limit_to_last {
            if children.len() > n {
                children.drain(..children.len() - n);
            }
        }
        children
    }

    fn sort_value<'a>(&self, child: &'a Value) -> Option<&'a Value> {
        match &self.order_by_child {
            Some(field) => child.get(field),
            None => Some(child),
        }
    }
}

/// Realtime-database ordering: missing < null < false < true < numbers <
/// strings < objects/arrays.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    rank(a).cmp(&rank(b)).then_with(|| match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => Ordering::Equal,
    })
}

fn rank(v: Option<&Value>) -> u8 {
    match v {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(false)) => 2,
        Some(Value::Bool(true)) => 3,
        Some(Value::Number(_)) => 4,
        Some(Value::String(_)) => 5,
        Some(_) => 6,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn keys(rows: &[(String, Value)]) -> Vec<&str> {
        rows.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn orders_by_key_by_default() {
        let node = json!({"b": 1, "a": 2, "c": 0});
        assert_eq!(keys(&Query::new().apply(Some(&node))), ["a", "b", "c"]);
    }

    #[test]
    fn orders_by_child_and_limits_to_last() {
        let node = json!({
            "k1": {"timestamp": 30},
            "k2": {"timestamp": 10},
            "k3": {"timestamp": 20},
            "k4": {}
        });
        let q = Query::new().order_by_child("timestamp").limit_to_last(2);
        assert_eq!(keys(&q.apply(Some(&node))), ["k3", "k1"]);

        let all = Query::new().order_by_child("timestamp").apply(Some(&node));
        assert_eq!(keys(&all), ["k4", "k2", "k3", "k1"]);
    }

    #[test]
    fn equal_to_filters_on_child() {
        let node = json!({
            "u1": {"username": "ada"},
            "u2": {"username": "bob"},
            "u3": {"username": "ada"}
        });
        let q = Query::new().order_by_child("username").equal_to("ada");
        assert_eq!(keys(&q.apply(Some(&node))), ["u1", "u3"]);
    }

    #[test]
    fn non_object_nodes_have_no_children() {
        assert!(Query::new().apply(Some(&json!(5))).is_empty());
        assert!(Query::new().apply(None).is_empty());
    }
}
