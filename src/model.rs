//! Record types stored in the realtime tree.
//!
//! Records are decoded at the store boundary with [`decode`]; anything that
//! does not match its schema is logged and dropped instead of being passed
//! on as untyped JSON.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::Actor;

/// Current time as milliseconds since UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Restricted,
    #[default]
    Member,
}

impl Role {
    pub fn can_moderate(self) -> bool {
        matches!(self, Role::Owner | Role::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub last_active_at: u64,
    /// SHA-256 digest of the chat passcode, see [`crate::policy::hash_passcode`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_passcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_badge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl User {
    pub fn is_locked_at(&self, now: u64) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    pub fn has_passcode(&self) -> bool {
        self.chat_passcode.is_some()
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub timestamp: u64,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Follow,
    FriendRequest,
    FriendAccepted,
    PostLike,
    PostComment,
    CommentReply,
    NewOrder,
    UserReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub from_id: String,
    pub from_name: String,
    /// Handle of the sender.  Records written before it was added carry
    /// it empty and are never masked.
    #[serde(default)]
    pub from_username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_avatar: Option<String>,
    #[serde(default)]
    pub text: String,
    pub timestamp: u64,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<String>,
}

impl Notification {
    /// An unread notification from `actor`, stamped now.
    pub fn from_actor(kind: NotificationKind, actor: &Actor, text: impl Into<String>) -> Self {
        Self {
            kind,
            from_id: actor.id.clone(),
            from_name: actor.display_name.clone(),
            from_username: actor.username.clone(),
            from_avatar: actor.avatar_url.clone(),
            text: text.into(),
            timestamp: now_millis(),
            read: false,
            post_id: None,
            comment_id: None,
        }
    }

    pub fn with_post(mut self, post_id: impl Into<String>) -> Self {
        self.post_id = Some(post_id.into());
        self
    }

    pub fn with_comment(mut self, comment_id: impl Into<String>) -> Self {
        self.comment_id = Some(comment_id.into());
        self
    }

    pub fn at(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    pub timestamp: u64,
    #[serde(default)]
    pub likes: BTreeMap<String, bool>,
    #[serde(default)]
    pub comments: BTreeMap<String, Comment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    pub text: String,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_badge: Option<String>,
    #[serde(default)]
    pub likes: BTreeMap<String, bool>,
    #[serde(default)]
    pub replies: BTreeMap<String, Reply>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(default)]
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_avatar: Option<String>,
    pub text: String,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_badge: Option<String>,
    #[serde(default)]
    pub likes: BTreeMap<String, bool>,
}

impl Post {
    /// Fill nested ids from their map keys; older records carry them only
    /// as keys.
    pub(crate) fn with_keys(mut self, key: &str) -> Self {
        if self.id.is_empty() {
            self.id = key.to_string();
        }
        for (comment_key, comment) in self.comments.iter_mut() {
            if comment.id.is_empty() {
                comment.id = comment_key.clone();
            }
            for (reply_key, reply) in comment.replies.iter_mut() {
                if reply.id.is_empty() {
                    reply.id = reply_key.clone();
                }
            }
        }
        self
    }

    pub fn like_count(&self) -> usize {
        self.likes.values().filter(|v| **v).count()
    }

    pub fn is_liked_by(&self, user_id: &str) -> bool {
        self.likes.get(user_id).copied().unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Decoding at the store boundary
// ---------------------------------------------------------------------------

/// Decode a record read from `path`, logging and dropping malformed data.
pub fn decode<T: DeserializeOwned>(path: &str, value: Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
            crate::alog!(
                "store: dropping malformed record at {}: {}",
                crate::logging::path(path),
                e
            );
            None
        }
    }
}

/// Decode every child of a node, keeping the keys of those that parse.
pub fn decode_children<T: DeserializeOwned>(
    path: &str,
    children: Vec<(String, Value)>,
) -> Vec<(String, T)> {
    children
        .into_iter()
        .filter_map(|(key, value)| {
            let child_path = crate::store::path::join(path, &key);
            decode(&child_path, value).map(|record| (key, record))
        })
        .collect()
}

/// Serialize a record for writing.
pub fn encode<T: Serialize>(record: &T) -> Result<Value, serde_json::Error> {
    serde_json::to_value(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_type_is_snake_case() {
        let n: Notification = serde_json::from_value(json!({
            "type": "friend_accepted",
            "fromId": "u2",
            "fromName": "Bob",
            "timestamp": 5
        }))
        .unwrap();
        assert_eq!(n.kind, NotificationKind::FriendAccepted);
        assert!(!n.read);
        let back = encode(&n).unwrap();
        assert_eq!(back["type"], json!("friend_accepted"));
        assert!(back.get("postId").is_none());
    }

    #[test]
    fn user_ignores_nested_maps() {
        let u: User = serde_json::from_value(json!({
            "id": "u1",
            "name": "Ada",
            "username": "ada",
            "unread": {"u2": 4},
            "conversations": {"u2": true}
        }))
        .unwrap();
        assert_eq!(u.role, Role::Member);
        assert!(!u.has_passcode());
    }

    #[test]
    fn malformed_records_are_dropped() {
        let rows = vec![
            ("ok".to_string(), json!({"senderId": "u1", "senderName": "A", "senderUsername": "a", "timestamp": 1})),
            ("bad".to_string(), json!({"senderId": 7})),
        ];
        let decoded: Vec<(String, Message)> = decode_children("messages/t", rows);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, "ok");
    }

    #[test]
    fn post_keys_fill_nested_ids() {
        let post: Post = serde_json::from_value(json!({
            "userId": "u1", "userName": "Ada", "username": "ada", "timestamp": 1,
            "comments": {"c1": {
                "userId": "u2", "userName": "Bob", "username": "bob",
                "text": "nice", "timestamp": 2,
                "replies": {"r1": {"userId": "u1", "userName": "Ada", "username": "ada", "text": "ty", "timestamp": 3}}
            }}
        }))
        .unwrap();
        let post = post.with_keys("p1");
        assert_eq!(post.id, "p1");
        assert_eq!(post.comments["c1"].id, "c1");
        assert_eq!(post.comments["c1"].replies["r1"].id, "r1");
    }

    #[test]
    fn lock_expires() {
        let mut u: User = serde_json::from_value(json!({"name": "A", "username": "a"})).unwrap();
        u.locked_until = Some(100);
        assert!(u.is_locked_at(99));
        assert!(!u.is_locked_at(100));
    }
}
