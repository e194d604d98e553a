//! Live subscriptions on store paths.
//!
//! A [`SubscriptionHub`] keeps one callback per subscription.  After a write
//! commits, the store hands the hub the set of paths it touched; every
//! subscription whose path is related to one of them (ancestor, descendant
//! or equal) gets a fresh snapshot of its own path.
//!
//! Callbacks run on the writer's thread, after the store has released its
//! own lock, so a callback may read from or write to the store.
//!
//! Deliveries to one subscription never overlap.  A writer that finds a
//! delivery in flight marks it dirty instead of waiting; the thread already
//! delivering re-reads and delivers again before it lets go.  The last
//! snapshot a subscriber sees is therefore never older than the last write
//! that touched its path.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use super::{path, StoreError};

/// The value at a path at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: String,
    pub value: Option<Value>,
}

impl Snapshot {
    pub fn exists(&self) -> bool {
        self.value.is_some()
    }

    /// Direct children as `(key, value)` pairs in key order.
    pub fn children(&self) -> Vec<(String, Value)> {
        match &self.value {
            Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => Vec::new(),
        }
    }
}

pub type SnapshotCallback = Box<dyn Fn(&Snapshot) + Send + Sync>;

type Callback = Arc<dyn Fn(&Snapshot) + Send + Sync>;

struct Entry {
    path: String,
    callback: Callback,
    delivery: Arc<Mutex<Delivery>>,
}

#[derive(Default)]
struct Delivery {
    busy: bool,
    dirty: bool,
}

/// Clears `busy` if a callback panics mid-delivery.
struct Unwind<'a> {
    delivery: &'a Mutex<Delivery>,
    armed: bool,
}

impl Drop for Unwind<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut d = lock(self.delivery);
            d.busy = false;
            d.dirty = false;
        }
    }
}

/// Deliver to one subscription, starting from `first` when given and
/// re-reading for as long as writes arrive during delivery.
fn run(
    path: &str,
    callback: &Callback,
    delivery: &Mutex<Delivery>,
    mut first: Option<Option<Value>>,
    read: &dyn Fn(&str) -> Result<Option<Value>, StoreError>,
) {
    {
        let mut d = lock(delivery);
        if d.busy {
            d.dirty = true;
            return;
        }
        d.busy = true;
    }
    let mut unwind = Unwind {
        delivery,
        armed: true,
    };
    loop {
        lock(delivery).dirty = false;
        let value = match first.take() {
            Some(value) => Ok(value),
            None => read(path),
        };
        match value {
            Ok(value) => callback(&Snapshot {
                path: path.to_string(),
                value,
            }),
            Err(e) => crate::alog!(
                "store: skipping notification for {}: {}",
                crate::logging::path(path),
                e
            ),
        }
        let mut d = lock(delivery);
        if !d.dirty {
            d.busy = false;
            unwind.armed = false;
            break;
        }
    }
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    entries: BTreeMap<u64, Entry>,
}

#[derive(Default)]
pub struct SubscriptionHub {
    inner: Arc<Mutex<HubInner>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback on an already-normalized path.
    pub fn register(&self, path: String, callback: SnapshotCallback) -> Subscription {
        let mut inner = lock(&self.inner);
        inner.next_id += 1;
        let id = inner.next_id;
        inner.entries.insert(
            id,
            Entry {
                path: path.clone(),
                callback: Arc::from(callback),
                delivery: Arc::default(),
            },
        );
        Subscription {
            id,
            path,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an already-read value to one subscription, used for the
    /// initial value.
    pub fn deliver(
        &self,
        id: u64,
        value: Option<Value>,
        read: &dyn Fn(&str) -> Result<Option<Value>, StoreError>,
    ) {
        let entry = lock(&self.inner)
            .entries
            .get(&id)
            .map(|e| (e.path.clone(), e.callback.clone(), e.delivery.clone()));
        if let Some((path, callback, delivery)) = entry {
            run(&path, &callback, &delivery, Some(value), read);
        }
    }

    /// Notify every subscription affected by writes at `changed`.
    ///
    /// `read` fetches the current value at a normalized path.  Each affected
    /// subscription reads its own path at delivery time.
    pub fn dispatch(
        &self,
        changed: &[String],
        read: &dyn Fn(&str) -> Result<Option<Value>, StoreError>,
    ) {
        let affected: Vec<(String, Callback, Arc<Mutex<Delivery>>)> = {
            let inner = lock(&self.inner);
            inner
                .entries
                .values()
                .filter(|e| changed.iter().any(|c| path::related(&e.path, c)))
                .map(|e| (e.path.clone(), e.callback.clone(), e.delivery.clone()))
                .collect()
        };
        for (sub_path, callback, delivery) in affected {
            run(&sub_path, &callback, &delivery, None, read);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to a live subscription.  Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    path: String,
    hub: Weak<Mutex<HubInner>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Explicitly tear down the subscription.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            lock(&inner).entries.remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}

fn lock<T>(inner: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dispatch_reaches_related_paths_only() {
        let hub = SubscriptionHub::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        let _a = hub.register(
            "users/u1".to_string(),
            Box::new(move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let h = hits.clone();
        let _b = hub.register(
            "social/u1".to_string(),
            Box::new(move |_| {
                h.fetch_add(100, Ordering::SeqCst);
            }),
        );

        hub.dispatch(&["users/u1/unread/u2".to_string()], &|_| Ok(Some(json!(1))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_subscription_unregisters() {
        let hub = SubscriptionHub::new();
        let sub = hub.register("a".to_string(), Box::new(|_| {}));
        assert_eq!(hub.len(), 1);
        sub.unsubscribe();
        assert!(hub.is_empty());
    }

    #[test]
    fn snapshot_children_in_key_order() {
        let snap = Snapshot {
            path: "x".to_string(),
            value: Some(json!({"b": 1, "a": 2})),
        };
        let keys: Vec<String> = snap.children().into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["a", "b"]);
    }
}
