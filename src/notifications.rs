//! Notification fan-out.
//!
//! Delivery is a plain append to the recipient's inbox, independent of the
//! write that triggered it: a like can land without its notification and
//! nothing retries.  Coalescing of repeated likes happens at display time,
//! over whatever the inbox holds when it is read.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

use crate::error::{ensure_key, ensure_user_key, SocialError};
use crate::model::{decode_children, encode, Notification, NotificationKind};
use crate::paths;
use crate::policy::AccessPolicy;
use crate::store::{Query, RealtimeStore, Subscription, UpdateMap};

/// A stored notification and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboxItem {
    pub id: String,
    pub global: bool,
    #[serde(flatten)]
    pub notification: Notification,
}

/// One display row: a notification, possibly standing in for several.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationEntry {
    pub id: String,
    /// Ids of every stored notification folded into this row.
    pub ids: Vec<String>,
    pub global: bool,
    pub count: u32,
    #[serde(flatten)]
    pub notification: Notification,
}

/// Sort newest first (ties broken by id) and fold runs of `post_like`
/// notifications from the same sender into a single entry.
///
/// A merged entry keeps the newest timestamp and counts as read only when
/// every notification in it is read.
pub fn coalesce(items: &[InboxItem]) -> Vec<NotificationEntry> {
    let mut sorted: Vec<&InboxItem> = items.iter().collect();
    sorted.sort_by(|a, b| {
        b.notification
            .timestamp
            .cmp(&a.notification.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    });

    let mut out: Vec<NotificationEntry> = Vec::new();
    for item in sorted {
        let n = &item.notification;
        if let Some(last) = out.last_mut() {
            if n.kind == NotificationKind::PostLike
                && last.notification.kind == NotificationKind::PostLike
                && last.notification.from_id == n.from_id
            {
                last.count += 1;
                last.ids.push(item.id.clone());
                last.notification.timestamp = last.notification.timestamp.max(n.timestamp);
                last.notification.read = last.notification.read && n.read;
                continue;
            }
        }
        out.push(NotificationEntry {
            id: item.id.clone(),
            ids: vec![item.id.clone()],
            global: item.global,
            count: 1,
            notification: n.clone(),
        });
    }
    out
}

#[derive(Clone)]
pub struct NotificationCenter {
    store: Arc<dyn RealtimeStore>,
    policy: Arc<AccessPolicy>,
}

impl NotificationCenter {
    pub fn new(store: Arc<dyn RealtimeStore>, policy: Arc<AccessPolicy>) -> Self {
        Self { store, policy }
    }

    /// Append a notification to a recipient's inbox and return its key.
    pub fn notify(&self, recipient_id: &str, notification: &Notification) -> Result<String, SocialError> {
        ensure_user_key("recipient", recipient_id)?;
        let key = self
            .store
            .push(&paths::inbox(recipient_id), encode(notification)?)?;
        crate::alog!(
            "notifications: {:?} from {} to {}",
            notification.kind,
            crate::logging::user_id(&notification.from_id),
            crate::logging::user_id(recipient_id)
        );
        Ok(key)
    }

    /// Broadcast a notification to every user.
    pub fn notify_global(&self, notification: &Notification) -> Result<String, SocialError> {
        Ok(self
            .store
            .push(&paths::global_inbox(), encode(notification)?)?)
    }

    pub fn mark_read(&self, recipient_id: &str, notification_id: &str) -> Result<(), SocialError> {
        ensure_user_key("recipient", recipient_id)?;
        ensure_key("notification", notification_id)?;
        let path = format!("{}/{notification_id}", paths::inbox(recipient_id));
        if self.store.read_once(&path)?.is_none() {
            return Err(SocialError::NotFound(format!(
                "notification {notification_id}"
            )));
        }
        self.store.set(&format!("{path}/read"), Value::Bool(true))?;
        Ok(())
    }

    /// Mark every unread personal notification read in one update.
    pub fn mark_all_read(&self, recipient_id: &str) -> Result<usize, SocialError> {
        let changes: UpdateMap = self
            .personal(recipient_id)?
            .into_iter()
            .filter(|item| !item.notification.read)
            .map(|item| (format!("{}/read", item.id), Value::Bool(true)))
            .collect();
        let count = changes.len();
        self.store.update(&paths::inbox(recipient_id), changes)?;
        Ok(count)
    }

    /// Personal and global notifications, newest first, with senders
    /// masked for the recipient.
    pub fn inbox(&self, recipient_id: &str) -> Result<Vec<InboxItem>, SocialError> {
        let mut items = self.personal(recipient_id)?;
        items.extend(self.global()?);
        sort_newest_first(&mut items);
        let viewer = self.viewer_username(recipient_id)?;
        Ok(mask_items(&self.policy, &viewer, items))
    }

    /// The coalesced display list.
    pub fn entries(&self, recipient_id: &str) -> Result<Vec<NotificationEntry>, SocialError> {
        Ok(coalesce(&self.inbox(recipient_id)?))
    }

    pub fn unread_count(&self, recipient_id: &str) -> Result<usize, SocialError> {
        Ok(self
            .personal(recipient_id)?
            .iter()
            .filter(|item| !item.notification.read)
            .count())
    }

    /// Re-deliver the coalesced list whenever the personal or global inbox
    /// changes.  Nothing is delivered until both have loaded.
    pub fn watch(
        &self,
        recipient_id: &str,
        callback: Box<dyn Fn(Vec<NotificationEntry>) + Send + Sync>,
    ) -> Result<InboxWatch, SocialError> {
        ensure_user_key("recipient", recipient_id)?;
        let viewer = self.viewer_username(recipient_id)?;
        let state: Arc<Mutex<WatchState>> = Arc::new(Mutex::new(WatchState::default()));
        let callback: Arc<dyn Fn(Vec<NotificationEntry>) + Send + Sync> = Arc::from(callback);

        let personal_path = paths::inbox(recipient_id);
        let personal = {
            let state = state.clone();
            let callback = callback.clone();
            let path = personal_path.clone();
            let policy = self.policy.clone();
            let viewer = viewer.clone();
            self.store.subscribe(
                &personal_path,
                Box::new(move |snap| {
                    let items = to_items(&path, snap.children(), false);
                    let items = mask_items(&policy, &viewer, items);
                    emit(&state, &*callback, |s| s.personal = Some(items));
                }),
            )?
        };
        let global_path = paths::global_inbox();
        let global = {
            let state = state.clone();
            let callback = callback.clone();
            let path = global_path.clone();
            let policy = self.policy.clone();
            self.store.subscribe(
                &global_path,
                Box::new(move |snap| {
                    let items = to_items(&path, snap.children(), true);
                    let items = mask_items(&policy, &viewer, items);
                    emit(&state, &*callback, |s| s.global = Some(items));
                }),
            )?
        };
        Ok(InboxWatch {
            _subscriptions: [personal, global],
        })
    }

    /// The recipient's current handle; empty when they have no record,
    /// which sees the restricted identity masked like any member.
    fn viewer_username(&self, recipient_id: &str) -> Result<String, SocialError> {
        let stored = self
            .store
            .read_once(&format!("{}/username", paths::user(recipient_id)))?;
        Ok(stored
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    fn personal(&self, recipient_id: &str) -> Result<Vec<InboxItem>, SocialError> {
        ensure_user_key("recipient", recipient_id)?;
        let path = paths::inbox(recipient_id);
        let rows = self.store.query(&path, &Query::new())?;
        Ok(to_items(&path, rows, false))
    }

    fn global(&self) -> Result<Vec<InboxItem>, SocialError> {
        let path = paths::global_inbox();
        let rows = self.store.query(&path, &Query::new())?;
        Ok(to_items(&path, rows, true))
    }
}

/// Live inbox subscription; dropping it stops delivery.
pub struct InboxWatch {
    _subscriptions: [Subscription; 2],
}

impl InboxWatch {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

#[derive(Default)]
struct WatchState {
    personal: Option<Vec<InboxItem>>,
    global: Option<Vec<InboxItem>>,
}

fn emit(
    state: &Mutex<WatchState>,
    callback: &(dyn Fn(Vec<NotificationEntry>) + Send + Sync),
    update: impl FnOnce(&mut WatchState),
) {
    let combined = {
        let mut s = match state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        update(&mut s);
        match (&s.personal, &s.global) {
            (Some(p), Some(g)) => {
                let mut all = p.clone();
                all.extend(g.iter().cloned());
                Some(all)
            }
            _ => None,
        }
    };
    if let Some(items) = combined {
        callback(coalesce(&items));
    }
}

fn to_items(path: &str, rows: Vec<(String, Value)>, global: bool) -> Vec<InboxItem> {
    decode_children::<Notification>(path, rows)
        .into_iter()
        .map(|(id, notification)| InboxItem {
            id,
            global,
            notification,
        })
        .collect()
}

fn mask_items(policy: &AccessPolicy, viewer: &str, items: Vec<InboxItem>) -> Vec<InboxItem> {
    items
        .into_iter()
        .map(|mut item| {
            item.notification = policy.mask(viewer, item.notification);
            item
        })
        .collect()
}

fn sort_newest_first(items: &mut [InboxItem]) {
    items.sort_by(|a, b| {
        b.notification
            .timestamp
            .cmp(&a.notification.timestamp)
            .then_with(|| b.id.cmp(&a.id))
    });
}
