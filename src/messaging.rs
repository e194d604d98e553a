//! Direct threads and the global channel.
//!
//! A 1:1 thread is addressed by [`thread_id_for`], which both participants
//! compute independently.  Messages are append-only; the rendered list is
//! always rebuilt from the latest snapshot, never patched in place.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::directory::UserDirectory;
use crate::error::{ensure_user_key, SocialError};
use crate::identity::Actor;
use crate::model::{decode_children, encode, now_millis, Message, User};
use crate::paths;
use crate::policy::{ensure_not_locked, AccessPolicy};
use crate::social::{FriendStatus, SocialGraph};
use crate::store::{Query, RealtimeStore, Subscription, UpdateMap};

/// Messages kept in view per thread unless configured otherwise.
pub const DEFAULT_THREAD_LIMIT: usize = 100;

/// The thread shared by two users: their ids sorted and joined by `_`.
pub fn thread_id_for(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}_{b}")
    } else {
        format!("{b}_{a}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadTarget {
    User(String),
    Global,
}

impl ThreadTarget {
    /// `"global"` names the community channel, anything else a user id.
    pub fn parse(raw: &str) -> Self {
        if raw == paths::GLOBAL_THREAD_ID {
            ThreadTarget::Global
        } else {
            ThreadTarget::User(raw.to_string())
        }
    }

    pub fn thread_id(&self, actor_id: &str) -> String {
        match self {
            ThreadTarget::User(other) => thread_id_for(actor_id, other),
            ThreadTarget::Global => paths::GLOBAL_THREAD_ID.to_string(),
        }
    }

    pub fn path(&self, actor_id: &str) -> String {
        paths::thread(&self.thread_id(actor_id))
    }

    fn user(&self) -> Option<&str> {
        match self {
            ThreadTarget::User(id) => Some(id),
            ThreadTarget::Global => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub url: String,
    pub media_type: String,
}

/// What the actor wants to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDraft {
    pub text: String,
    pub media: Option<Media>,
}

impl MessageDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.media.is_none()
    }
}

/// One row of the conversation list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub user: User,
    pub thread_id: String,
    pub last_message: Option<Message>,
    pub unread: i64,
    pub is_request: bool,
}

#[derive(Clone)]
pub struct Messenger {
    store: Arc<dyn RealtimeStore>,
    directory: UserDirectory,
    social: SocialGraph,
    policy: Arc<AccessPolicy>,
    thread_limit: usize,
}

impl Messenger {
    pub fn new(
        store: Arc<dyn RealtimeStore>,
        directory: UserDirectory,
        social: SocialGraph,
        policy: Arc<AccessPolicy>,
    ) -> Self {
        Self {
            store,
            directory,
            social,
            policy,
            thread_limit: DEFAULT_THREAD_LIMIT,
        }
    }

    pub fn with_thread_limit(mut self, limit: usize) -> Self {
        self.thread_limit = limit.max(1);
        self
    }

    pub fn thread_limit(&self) -> usize {
        self.thread_limit
    }

    /// Append a message to a thread.
    ///
    /// For a user target this also marks the conversation on both sides and
    /// bumps the recipient's unread counter for the sender.  A target with
    /// no user record yields `NotFound` and nothing is written.  A failed
    /// counter bump is logged and the stored message is still returned.
    pub fn send_message(
        &self,
        actor: &Actor,
        target: &ThreadTarget,
        draft: &MessageDraft,
    ) -> Result<Message, SocialError> {
        if draft.is_empty() {
            return Err(SocialError::Validation(
                "message needs text or media".to_string(),
            ));
        }
        ensure_user_key("user", &actor.id)?;
        if let Some(other) = target.user() {
            ensure_user_key("user", other)?;
            if other == actor.id {
                return Err(SocialError::Validation(
                    "cannot message yourself".to_string(),
                ));
            }
        }
        let now = now_millis();
        ensure_not_locked(self.directory.get(&actor.id)?.as_ref(), now)?;
        if let Some(other) = target.user() {
            self.directory.require(other)?;
        }

        let key = self.store.new_key();
        let text = draft.text.trim();
        let message = Message {
            id: key.clone(),
            sender_id: actor.id.clone(),
            sender_name: actor.display_name.clone(),
            sender_username: actor.username.clone(),
            sender_avatar: actor.avatar_url.clone(),
            text: (!text.is_empty()).then(|| text.to_string()),
            media_url: draft.media.as_ref().map(|m| m.url.clone()),
            media_type: draft.media.as_ref().map(|m| m.media_type.clone()),
            timestamp: now,
        };

        let thread_id = target.thread_id(&actor.id);
        let mut changes = UpdateMap::new();
        changes.insert(
            format!("{}/{key}", paths::thread(&thread_id)),
            encode(&message)?,
        );
        if let Some(other) = target.user() {
            changes.insert(paths::conversation(&actor.id, other), Value::Bool(true));
            changes.insert(paths::conversation(other, &actor.id), Value::Bool(true));
        }
        self.store.update("", changes)?;
        // The message is already stored; a missed bump must not invite a resend.
        if let Some(other) = target.user() {
            if let Err(e) = self.store.increment(&paths::unread(other, &actor.id), 1) {
                crate::alog!(
                    "messaging: unread counter for {} not bumped: {}",
                    crate::logging::user_id(other),
                    e
                );
            }
        }

        crate::alog!(
            "messaging: {} posted to {}",
            crate::logging::user_id(&actor.id),
            crate::logging::thread_id(&thread_id)
        );
        Ok(message)
    }

    /// Watch the last messages of a thread, oldest first, senders masked
    /// for the actor.  Opening a user thread clears its unread counter.
    pub fn open_thread(
        &self,
        actor: &Actor,
        target: &ThreadTarget,
        callback: Box<dyn Fn(Vec<Message>) + Send + Sync>,
    ) -> Result<ThreadSubscription, SocialError> {
        ensure_user_key("user", &actor.id)?;
        if let Some(other) = target.user() {
            ensure_user_key("user", other)?;
        }
        let thread_id = target.thread_id(&actor.id);
        let path = paths::thread(&thread_id);
        let policy = self.policy.clone();
        let viewer = actor.username.clone();
        let row_path = path.clone();
        let subscription = self.store.subscribe_query(
            &path,
            self.window(),
            Box::new(move |rows| {
                callback(render_thread(&policy, &viewer, &row_path, rows.to_vec()));
            }),
        )?;
        if let Some(other) = target.user() {
            self.reset_unread(actor, other)?;
        }
        Ok(ThreadSubscription {
            thread_id,
            _subscription: subscription,
        })
    }

    /// One-shot read with the same window, order and masking as
    /// [`Messenger::open_thread`].
    pub fn thread_messages(
        &self,
        actor: &Actor,
        target: &ThreadTarget,
    ) -> Result<Vec<Message>, SocialError> {
        if let Some(other) = target.user() {
            ensure_user_key("user", other)?;
        }
        let path = target.path(&actor.id);
        let rows = self.store.query(&path, &self.window())?;
        Ok(render_thread(&self.policy, &actor.username, &path, rows))
    }

    fn window(&self) -> Query {
        Query::new().limit_to_last(self.thread_limit)
    }

    pub fn reset_unread(&self, actor: &Actor, other: &str) -> Result<(), SocialError> {
        ensure_user_key("user", other)?;
        self.store.set(&paths::unread(&actor.id, other), Value::from(0))?;
        Ok(())
    }

    /// Unread counters by sender id.
    pub fn unread_counts(&self, actor: &Actor) -> Result<BTreeMap<String, i64>, SocialError> {
        ensure_user_key("user", &actor.id)?;
        let rows = self
            .store
            .query(&paths::unread_all(&actor.id), &Query::new())?;
        Ok(rows
            .into_iter()
            .filter_map(|(sender, value)| value.as_i64().map(|n| (sender, n)))
            .collect())
    }

    /// A thread from a non-friend who has written into it.  Purely a
    /// display hint; nothing stops either side from writing.
    pub fn is_message_request(&self, viewer: &Actor, other: &str) -> Result<bool, SocialError> {
        if self.social.friend_status(&viewer.id, other)? == FriendStatus::Friends {
            return Ok(false);
        }
        let path = paths::thread(&thread_id_for(&viewer.id, other));
        let rows = self.store.query(&path, &Query::new())?;
        Ok(decode_children::<Message>(&path, rows)
            .iter()
            .any(|(_, m)| m.sender_id == other))
    }

    /// Every conversation the actor has, most recent first.
    pub fn conversations(&self, actor: &Actor) -> Result<Vec<ConversationSummary>, SocialError> {
        ensure_user_key("user", &actor.id)?;
        let unread = self.unread_counts(actor)?;
        let rows = self
            .store
            .query(&paths::conversations(&actor.id), &Query::new())?;

        let mut summaries = Vec::with_capacity(rows.len());
        for (other, _) in rows {
            let Some(user) = self.directory.get(&other)? else {
                continue;
            };
            let target = ThreadTarget::User(other.clone());
            let path = target.path(&actor.id);
            let rows = self.store.query(&path, &Query::new().limit_to_last(1))?;
            let last_message = render_thread(&self.policy, &actor.username, &path, rows).pop();
            summaries.push(ConversationSummary {
                user: self.policy.mask(&actor.username, user),
                thread_id: target.thread_id(&actor.id),
                last_message,
                unread: unread.get(&other).copied().unwrap_or(0),
                is_request: self.is_message_request(actor, &other)?,
            });
        }
        summaries.sort_by(|a, b| {
            let ts = |s: &ConversationSummary| s.last_message.as_ref().map_or(0, |m| m.timestamp);
            ts(b).cmp(&ts(a)).then_with(|| a.thread_id.cmp(&b.thread_id))
        });
        Ok(summaries)
    }
}

/// Decode, order by timestamp (key breaks ties) and mask.
fn render_thread(
    policy: &AccessPolicy,
    viewer: &str,
    path: &str,
    rows: Vec<(String, Value)>,
) -> Vec<Message> {
    let mut messages: Vec<(String, Message)> = decode_children(path, rows);
    messages.sort_by(|(ka, a), (kb, b)| a.timestamp.cmp(&b.timestamp).then_with(|| ka.cmp(kb)));
    messages
        .into_iter()
        .map(|(key, mut m)| {
            if m.id.is_empty() {
                m.id = key;
            }
            policy.mask(viewer, m)
        })
        .collect()
}

/// Live thread view; dropping it stops delivery.
pub struct ThreadSubscription {
    thread_id: String,
    _subscription: Subscription,
}

impl ThreadSubscription {
    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

/// Input state for one thread.  The draft survives a failed send.
#[derive(Debug, Clone)]
pub struct Composer {
    target: ThreadTarget,
    draft: MessageDraft,
}

impl Composer {
    pub fn new(target: ThreadTarget) -> Self {
        Self {
            target,
            draft: MessageDraft::default(),
        }
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.draft.text = text.into();
    }

    pub fn attach(&mut self, media: Media) {
        self.draft.media = Some(media);
    }

    pub fn draft(&self) -> &MessageDraft {
        &self.draft
    }

    pub fn target(&self) -> &ThreadTarget {
        &self.target
    }

    /// Send the draft and clear it once the write has been accepted.
    pub fn send(&mut self, messenger: &Messenger, actor: &Actor) -> Result<Message, SocialError> {
        let message = messenger.send_message(actor, &self.target, &self.draft)?;
        self.draft = MessageDraft::default();
        Ok(message)
    }
}
