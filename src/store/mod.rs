//! Realtime tree store contract.
//!
//! Every engine reads and writes through [`RealtimeStore`]: a path-addressed
//! JSON tree with one-shot reads, live subscriptions, single and multi-path
//! writes, push keys, atomic counters and ordered queries.
//!
//! Backends only implement the primitives ([`RealtimeStore::read_once`],
//! [`RealtimeStore::commit`], [`RealtimeStore::commit_increment`]); the
//! provided methods handle path validation, push keys and subscription
//! dispatch so both backends behave identically.

pub mod memory;
pub mod path;
pub mod push_id;
pub mod query;
pub mod sqlite;
pub mod subscription;
pub mod tree;

use std::collections::BTreeMap;

use serde_json::Value;

pub use memory::MemoryStore;
pub use push_id::PushIdGenerator;
pub use query::Query;
pub use sqlite::SqliteStore;
pub use subscription::{Snapshot, SnapshotCallback, Subscription, SubscriptionHub};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    InvalidPath(String),
    Conflict(String),
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StoreError::Serde(e) => write!(f, "serialization error: {e}"),
            StoreError::InvalidPath(msg) => write!(f, "invalid path: {msg}"),
            StoreError::Conflict(msg) => write!(f, "conflict: {msg}"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e)
    }
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Relative path → new value.  `Value::Null` deletes the path.
pub type UpdateMap = BTreeMap<String, Value>;

/// A single committed write: normalized absolute path and new value
/// (`None` removes).
#[derive(Debug, Clone, PartialEq)]
pub struct Write {
    pub path: String,
    pub value: Option<Value>,
}

pub trait RealtimeStore: Send + Sync {
    /// Read the value at a path, or `None` if nothing is stored there.
    fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Apply a batch of writes atomically, in order.  Paths are already
    /// normalized.
    fn commit(&self, writes: &[Write]) -> Result<(), StoreError>;

    /// Atomically add `delta` to the integer at `path` (absent counts as 0)
    /// and return the new value.
    fn commit_increment(&self, path: &str, delta: i64) -> Result<i64, StoreError>;

    /// The hub that receives change notifications for this store.
    fn hub(&self) -> &SubscriptionHub;

    /// The push-key generator for this store.
    fn keys(&self) -> &PushIdGenerator;

    // -----------------------------------------------------------------------
    // Provided operations
    // -----------------------------------------------------------------------

    /// Replace the value at `path`.  Writing `Value::Null` removes it.
    fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let path = path::normalize(path)?;
        self.apply(vec![Write {
            value: tree::prune(value),
            path,
        }])
    }

    /// Multi-path update relative to `base`.  All writes land together or
    /// none do.
    fn update(&self, base: &str, changes: UpdateMap) -> Result<(), StoreError> {
        let base = path::normalize(base)?;
        let mut writes = Vec::with_capacity(changes.len());
        for (rel, value) in changes {
            let rel = path::normalize(&rel)?;
            if rel.is_empty() {
                return Err(StoreError::InvalidPath(
                    "update keys must name a child path".to_string(),
                ));
            }
            writes.push(Write {
                path: path::join(&base, &rel),
                value: tree::prune(value),
            });
        }
        if writes.is_empty() {
            return Ok(());
        }
        for (i, a) in writes.iter().enumerate() {
            for b in &writes[i + 1..] {
                if path::related(&a.path, &b.path) {
                    return Err(StoreError::InvalidPath(format!(
                        "update paths '{}' and '{}' overlap",
                        a.path, b.path
                    )));
                }
            }
        }
        self.apply(writes)
    }

    fn remove(&self, path: &str) -> Result<(), StoreError> {
        let path = path::normalize(path)?;
        self.apply(vec![Write { path, value: None }])
    }

    /// Generate a fresh, chronologically ordered child key.
    fn new_key(&self) -> String {
        self.keys().next_id()
    }

    /// Append `value` under `path` with a generated key.
    fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let key = self.new_key();
        let base = path::normalize(path)?;
        self.apply(vec![Write {
            path: path::join(&base, &key),
            value: tree::prune(value),
        }])?;
        Ok(key)
    }

    /// Atomic counter update; subscribers see the change like any other write.
    fn increment(&self, path: &str, delta: i64) -> Result<i64, StoreError> {
        let path = path::normalize(path)?;
        let value = self.commit_increment(&path, delta)?;
        self.hub()
            .dispatch(std::slice::from_ref(&path), &|p: &str| self.read_once(p));
        Ok(value)
    }

    /// Run an ordered/limited query over the children of `path`.
    fn query(&self, path: &str, query: &Query) -> Result<Vec<(String, Value)>, StoreError> {
        let path = path::normalize(path)?;
        let node = self.read_once(&path)?;
        Ok(query.apply(node.as_ref()))
    }

    /// Subscribe to the value at `path`.  The callback fires immediately with
    /// the current value and again after every related write.
    fn subscribe(&self, path: &str, callback: SnapshotCallback) -> Result<Subscription, StoreError> {
        let path = path::normalize(path)?;
        let current = self.read_once(&path)?;
        let sub = self.hub().register(path, callback);
        self.hub()
            .deliver(sub.id(), current, &|p: &str| self.read_once(p));
        Ok(sub)
    }

    /// Subscribe to a query over the children of `path`.
    fn subscribe_query(
        &self,
        path: &str,
        query: Query,
        callback: Box<dyn Fn(&[(String, Value)]) + Send + Sync>,
    ) -> Result<Subscription, StoreError> {
        self.subscribe(
            path,
            Box::new(move |snapshot| {
                let rows = query.apply(snapshot.value.as_ref());
                callback(&rows);
            }),
        )
    }

    /// Commit writes and notify subscribers.
    fn apply(&self, writes: Vec<Write>) -> Result<(), StoreError> {
        self.commit(&writes)?;
        let changed: Vec<String> = writes.into_iter().map(|w| w.path).collect();
        self.hub().dispatch(&changed, &|p: &str| self.read_once(p));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn update_rejects_overlapping_paths() {
        let store = MemoryStore::new();
        let mut changes = UpdateMap::new();
        changes.insert("a".to_string(), json!(1));
        changes.insert("a/b".to_string(), json!(2));
        assert!(matches!(
            store.update("", changes),
            Err(StoreError::InvalidPath(_))
        ));
        assert_eq!(store.read_once("a").unwrap(), None);
    }

    #[test]
    fn subscription_sees_initial_and_later_values() {
        let store = MemoryStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let sub = store
            .subscribe(
                "counters/x",
                Box::new(move |snap| s.lock().unwrap().push(snap.value.clone())),
            )
            .unwrap();

        store.increment("counters/x", 2).unwrap();
        store.remove("counters").unwrap();
        drop(sub);
        store.set("counters/x", json!(9)).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![None, Some(json!(2)), None]);
    }

    #[test]
    fn subscribe_query_reapplies_on_change() {
        let store = MemoryStore::new();
        let latest = Arc::new(Mutex::new(Vec::<String>::new()));
        let l = latest.clone();
        let _sub = store
            .subscribe_query(
                "log",
                Query::new().order_by_child("t").limit_to_last(2),
                Box::new(move |rows| {
                    *l.lock().unwrap() = rows.iter().map(|(k, _)| k.clone()).collect();
                }),
            )
            .unwrap();

        store.set("log/a", json!({"t": 3})).unwrap();
        store.set("log/b", json!({"t": 1})).unwrap();
        store.set("log/c", json!({"t": 2})).unwrap();
        assert_eq!(*latest.lock().unwrap(), ["c", "a"]);
    }

    #[test]
    fn callbacks_may_write_to_the_store() {
        let store = Arc::new(MemoryStore::new());
        let inner = store.clone();
        let _sub = store
            .subscribe(
                "trigger",
                Box::new(move |snap| {
                    if snap.exists() {
                        inner.set("echo", json!(true)).unwrap();
                    }
                }),
            )
            .unwrap();
        store.set("trigger", json!(1)).unwrap();
        assert_eq!(store.read_once("echo").unwrap(), Some(json!(true)));
    }

    #[test]
    fn concurrent_writers_leave_the_latest_snapshot_last() {
        let store = Arc::new(MemoryStore::new());
        let seen: Arc<Mutex<Vec<Option<Value>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = store
            .subscribe(
                "thread",
                Box::new(move |snap| {
                    // Hold up the first delivery of `a` so the second
                    // writer commits while it is in flight.
                    if snap.value == Some(json!({"a": 1})) {
                        std::thread::sleep(std::time::Duration::from_millis(150));
                    }
                    sink.lock().unwrap().push(snap.value.clone());
                }),
            )
            .unwrap();

        let slow = {
            let store = store.clone();
            std::thread::spawn(move || store.set("thread/a", json!(1)).unwrap())
        };
        std::thread::sleep(std::time::Duration::from_millis(30));
        store.set("thread/b", json!(2)).unwrap();
        slow.join().unwrap();

        let latest = store.read_once("thread").unwrap();
        assert_eq!(latest, Some(json!({"a": 1, "b": 2})));
        assert_eq!(seen.lock().unwrap().last().cloned().flatten(), latest);
    }
}
