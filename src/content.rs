//! Explore posts with their likes, comments and replies.
//!
//! Likes at every level are presence toggles: `likes/{userId}` exists
//! exactly when that user likes the item.  Only post likes notify.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::directory::UserDirectory;
use crate::error::{ensure_key, ensure_user_key, SocialError};
use crate::identity::Actor;
use crate::messaging::Media;
use crate::model::{
    decode, decode_children, encode, now_millis, Comment, Notification, NotificationKind, Post,
    Reply,
};
use crate::notifications::NotificationCenter;
use crate::paths;
use crate::policy::{ensure_not_locked, AccessPolicy};
use crate::store::{Query, RealtimeStore};

/// Posts returned by [`ContentEngine::feed`] unless a limit is given.
pub const DEFAULT_FEED_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostDraft {
    pub text: String,
    pub media: Option<Media>,
}

/// A post as one viewer sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub username: String,
    pub user_avatar: Option<String>,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
    pub timestamp: u64,
    pub like_count: usize,
    pub liked: bool,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub username: String,
    pub user_avatar: Option<String>,
    pub text: String,
    pub timestamp: u64,
    pub custom_badge: Option<String>,
    pub like_count: usize,
    pub liked: bool,
    /// The post's author likes this comment.
    pub author_liked: bool,
    pub replies: Vec<ReplyView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyView {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub username: String,
    pub user_avatar: Option<String>,
    pub text: String,
    pub timestamp: u64,
    pub custom_badge: Option<String>,
    pub like_count: usize,
    pub liked: bool,
}

/// Whether the post's author is among the comment's likers.
pub fn author_liked(post: &Post, comment: &Comment) -> bool {
    comment.likes.get(&post.user_id).copied().unwrap_or(false)
}

fn like_count(likes: &BTreeMap<String, bool>) -> usize {
    likes.values().filter(|v| **v).count()
}

fn is_liked(likes: &BTreeMap<String, bool>, user_id: &str) -> bool {
    likes.get(user_id).copied().unwrap_or(false)
}

#[derive(Clone)]
pub struct ContentEngine {
    store: Arc<dyn RealtimeStore>,
    directory: UserDirectory,
    notifications: NotificationCenter,
    policy: Arc<AccessPolicy>,
}

impl ContentEngine {
    pub fn new(
        store: Arc<dyn RealtimeStore>,
        directory: UserDirectory,
        notifications: NotificationCenter,
        policy: Arc<AccessPolicy>,
    ) -> Self {
        Self {
            store,
            directory,
            notifications,
            policy,
        }
    }

    fn ensure_can_write(&self, actor: &Actor) -> Result<(), SocialError> {
        ensure_user_key("user", &actor.id)?;
        ensure_not_locked(self.directory.get(&actor.id)?.as_ref(), now_millis())
    }

    pub fn create_post(&self, actor: &Actor, draft: PostDraft) -> Result<Post, SocialError> {
        let text = draft.text.trim().to_string();
        if text.is_empty() && draft.media.is_none() {
            return Err(SocialError::Validation(
                "post needs text or media".to_string(),
            ));
        }
        self.ensure_can_write(actor)?;

        let key = self.store.new_key();
        let post = Post {
            id: key.clone(),
            user_id: actor.id.clone(),
            user_name: actor.display_name.clone(),
            username: actor.username.clone(),
            user_avatar: actor.avatar_url.clone(),
            text: (!text.is_empty()).then_some(text),
            media_url: draft.media.as_ref().map(|m| m.url.clone()),
            media_type: draft.media.as_ref().map(|m| m.media_type.clone()),
            timestamp: now_millis(),
            likes: Default::default(),
            comments: Default::default(),
        };
        self.store.set(&paths::post(&key), encode(&post)?)?;
        crate::alog!(
            "content: {} created post {}",
            crate::logging::user_id(&actor.id),
            key
        );
        Ok(post)
    }

    /// Load a post with nested ids filled in.
    pub fn post(&self, post_id: &str) -> Result<Post, SocialError> {
        ensure_key("post", post_id)?;
        let path = paths::post(post_id);
        self.store
            .read_once(&path)?
            .and_then(|value| decode::<Post>(&path, value))
            .map(|post| post.with_keys(post_id))
            .ok_or_else(|| SocialError::NotFound(format!("post {post_id}")))
    }

    fn comment(&self, post_id: &str, comment_id: &str) -> Result<Comment, SocialError> {
        ensure_key("comment", comment_id)?;
        self.post(post_id)?
            .comments
            .remove(comment_id)
            .ok_or_else(|| SocialError::NotFound(format!("comment {comment_id}")))
    }

    /// Flip presence at `path`; returns whether the item is now liked.
    fn toggle(&self, path: &str) -> Result<bool, SocialError> {
        if self.store.read_once(path)?.is_some() {
            self.store.remove(path)?;
            Ok(false)
        } else {
            self.store.set(path, Value::Bool(true))?;
            Ok(true)
        }
    }

    /// Like or unlike a post.  A new like notifies the post's author
    /// unless they liked their own post.
    pub fn toggle_like(&self, actor: &Actor, post_id: &str) -> Result<bool, SocialError> {
        ensure_user_key("user", &actor.id)?;
        let post = self.post(post_id)?;
        let liked = self.toggle(&paths::post_like(post_id, &actor.id))?;
        if liked && post.user_id != actor.id {
            let n = Notification::from_actor(
                NotificationKind::PostLike,
                actor,
                format!("{} liked your post", actor.display_name),
            )
            .with_post(post_id);
            self.notifications.notify(&post.user_id, &n)?;
        }
        Ok(liked)
    }

    /// Comment on a post.  The actor's current badge is copied onto the
    /// comment and does not follow later badge changes.
    pub fn post_comment(&self, actor: &Actor, post_id: &str, text: &str) -> Result<Comment, SocialError> {
        let text = non_empty(text, "comment")?;
        self.ensure_can_write(actor)?;
        let post = self.post(post_id)?;
        let badge = self
            .directory
            .get(&actor.id)?
            .and_then(|u| u.custom_badge);

        let key = self.store.new_key();
        let comment = Comment {
            id: key.clone(),
            user_id: actor.id.clone(),
            user_name: actor.display_name.clone(),
            username: actor.username.clone(),
            user_avatar: actor.avatar_url.clone(),
            text,
            timestamp: now_millis(),
            custom_badge: badge,
            likes: Default::default(),
            replies: Default::default(),
        };
        self.store
            .set(&paths::comment(post_id, &key), encode(&comment)?)?;

        if post.user_id != actor.id {
            let n = Notification::from_actor(
                NotificationKind::PostComment,
                actor,
                format!("{} commented on your post", actor.display_name),
            )
            .with_post(post_id)
            .with_comment(key.as_str());
            self.notifications.notify(&post.user_id, &n)?;
        }
        Ok(comment)
    }

    /// Reply to a comment.  The comment's author is notified, not the
    /// post's.
    pub fn post_reply(
        &self,
        actor: &Actor,
        post_id: &str,
        comment_id: &str,
        text: &str,
    ) -> Result<Reply, SocialError> {
        let text = non_empty(text, "reply")?;
        self.ensure_can_write(actor)?;
        let comment = self.comment(post_id, comment_id)?;
        let badge = self
            .directory
            .get(&actor.id)?
            .and_then(|u| u.custom_badge);

        let key = self.store.new_key();
        let reply = Reply {
            id: key.clone(),
            user_id: actor.id.clone(),
            user_name: actor.display_name.clone(),
            username: actor.username.clone(),
            user_avatar: actor.avatar_url.clone(),
            text,
            timestamp: now_millis(),
            custom_badge: badge,
            likes: Default::default(),
        };
        self.store
            .set(&paths::reply(post_id, comment_id, &key), encode(&reply)?)?;

        if comment.user_id != actor.id {
            let n = Notification::from_actor(
                NotificationKind::CommentReply,
                actor,
                format!("{} replied to your comment", actor.display_name),
            )
            .with_post(post_id)
            .with_comment(comment_id);
            self.notifications.notify(&comment.user_id, &n)?;
        }
        Ok(reply)
    }

    pub fn toggle_comment_like(
        &self,
        actor: &Actor,
        post_id: &str,
        comment_id: &str,
    ) -> Result<bool, SocialError> {
        ensure_user_key("user", &actor.id)?;
        self.comment(post_id, comment_id)?;
        self.toggle(&paths::comment_like(post_id, comment_id, &actor.id))
    }

    pub fn toggle_reply_like(
        &self,
        actor: &Actor,
        post_id: &str,
        comment_id: &str,
        reply_id: &str,
    ) -> Result<bool, SocialError> {
        ensure_user_key("user", &actor.id)?;
        ensure_key("reply", reply_id)?;
        if !self.comment(post_id, comment_id)?.replies.contains_key(reply_id) {
            return Err(SocialError::NotFound(format!("reply {reply_id}")));
        }
        self.toggle(&paths::reply_like(post_id, comment_id, reply_id, &actor.id))
    }

    pub fn post_view(&self, viewer: &Actor, post_id: &str) -> Result<PostView, SocialError> {
        let post = self.post(post_id)?;
        Ok(self.render(viewer, post))
    }

    /// Most recent posts first.
    pub fn feed(&self, viewer: &Actor, limit: Option<usize>) -> Result<Vec<PostView>, SocialError> {
        let q = Query::new()
            .order_by_child("timestamp")
            .limit_to_last(limit.unwrap_or(DEFAULT_FEED_LIMIT));
        let rows = self.store.query(paths::POSTS, &q)?;
        Ok(decode_children::<Post>(paths::POSTS, rows)
            .into_iter()
            .rev()
            .map(|(key, post)| self.render(viewer, post.with_keys(&key)))
            .collect())
    }

    fn render(&self, viewer: &Actor, post: Post) -> PostView {
        let post = self.policy.mask_post(&viewer.username, post);
        let mut comments: Vec<CommentView> = post
            .comments
            .values()
            .map(|c| {
                let mut replies: Vec<ReplyView> = c
                    .replies
                    .values()
                    .map(|r| ReplyView {
                        id: r.id.clone(),
                        user_id: r.user_id.clone(),
                        user_name: r.user_name.clone(),
                        username: r.username.clone(),
                        user_avatar: r.user_avatar.clone(),
                        text: r.text.clone(),
                        timestamp: r.timestamp,
                        custom_badge: r.custom_badge.clone(),
                        like_count: like_count(&r.likes),
                        liked: is_liked(&r.likes, &viewer.id),
                    })
                    .collect();
                replies.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
                CommentView {
                    id: c.id.clone(),
                    user_id: c.user_id.clone(),
                    user_name: c.user_name.clone(),
                    username: c.username.clone(),
                    user_avatar: c.user_avatar.clone(),
                    text: c.text.clone(),
                    timestamp: c.timestamp,
                    custom_badge: c.custom_badge.clone(),
                    like_count: like_count(&c.likes),
                    liked: is_liked(&c.likes, &viewer.id),
                    author_liked: author_liked(&post, c),
                    replies,
                }
            })
            .collect();
        comments.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

        PostView {
            like_count: post.like_count(),
            liked: post.is_liked_by(&viewer.id),
            id: post.id,
            user_id: post.user_id,
            user_name: post.user_name,
            username: post.username,
            user_avatar: post.user_avatar,
            text: post.text,
            media_url: post.media_url,
            media_type: post.media_type,
            timestamp: post.timestamp,
            comments,
        }
    }
}

fn non_empty(text: &str, what: &str) -> Result<String, SocialError> {
    let text = text.trim();
    if text.is_empty() {
        Err(SocialError::Validation(format!("{what} text cannot be empty")))
    } else {
        Ok(text.to_string())
    }
}
