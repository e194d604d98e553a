//! In-process store backend.

use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use super::{path, tree, PushIdGenerator, RealtimeStore, StoreError, SubscriptionHub, Write};

/// A realtime store held entirely in memory.  Used by tests and by the
/// server when started with `--in-memory`.
pub struct MemoryStore {
    root: Mutex<Value>,
    hub: SubscriptionHub,
    keys: PushIdGenerator,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Null),
            hub: SubscriptionHub::new(),
            keys: PushIdGenerator::new(),
        }
    }

    /// Seed a store with an initial tree.
    pub fn with_root(root: Value) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.root.lock() {
            *guard = tree::prune(root).unwrap_or(Value::Null);
        }
        store
    }

    fn root(&self) -> Result<MutexGuard<'_, Value>, StoreError> {
        self.root
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl RealtimeStore for MemoryStore {
    fn read_once(&self, p: &str) -> Result<Option<Value>, StoreError> {
        let p = path::normalize(p)?;
        let root = self.root()?;
        Ok(tree::get(&root, &path::segments(&p)).cloned())
    }

    fn commit(&self, writes: &[Write]) -> Result<(), StoreError> {
        let mut root = self.root()?;
        for w in writes {
            tree::put(&mut root, &path::segments(&w.path), w.value.clone());
        }
        Ok(())
    }

    fn commit_increment(&self, p: &str, delta: i64) -> Result<i64, StoreError> {
        let mut root = self.root()?;
        let segs = path::segments(p);
        let current = match tree::get(&root, &segs) {
            None => 0,
            Some(v) => v.as_i64().ok_or_else(|| {
                StoreError::Conflict(format!("value at '{p}' is not an integer"))
            })?,
        };
        let next = current.saturating_add(delta);
        tree::put(&mut root, &segs, Some(Value::from(next)));
        Ok(next)
    }

    fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    fn keys(&self) -> &PushIdGenerator {
        &self.keys
    }
}
