//! Store schema: every path the engines read or write.

/// Thread id of the community-wide broadcast channel.
pub const GLOBAL_THREAD_ID: &str = "global";
/// Where global channel messages live.
pub const GLOBAL_THREAD: &str = "community/global";
/// Inbox key for notifications addressed to everyone.
pub const GLOBAL_INBOX_KEY: &str = "global";

pub const USERS: &str = "users";
pub const POSTS: &str = "explore_posts";

pub fn user(id: &str) -> String {
    format!("users/{id}")
}

pub fn unread(user_id: &str, other: &str) -> String {
    format!("users/{user_id}/unread/{other}")
}

pub fn unread_all(user_id: &str) -> String {
    format!("users/{user_id}/unread")
}

pub fn conversation(user_id: &str, other: &str) -> String {
    format!("users/{user_id}/conversations/{other}")
}

pub fn conversations(user_id: &str) -> String {
    format!("users/{user_id}/conversations")
}

/// Relation sets kept under `social/{id}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Following,
    Followers,
    Friends,
    RequestsSent,
    RequestsReceived,
}

impl Relation {
    fn segment(self) -> &'static str {
        match self {
            Relation::Following => "following",
            Relation::Followers => "followers",
            Relation::Friends => "friends",
            Relation::RequestsSent => "requests/sent",
            Relation::RequestsReceived => "requests/received",
        }
    }
}

pub fn relation_set(user_id: &str, relation: Relation) -> String {
    format!("social/{user_id}/{}", relation.segment())
}

pub fn relation(user_id: &str, relation: Relation, other: &str) -> String {
    format!("social/{user_id}/{}/{other}", relation.segment())
}

pub fn thread(thread_id: &str) -> String {
    if thread_id == GLOBAL_THREAD_ID {
        GLOBAL_THREAD.to_string()
    } else {
        format!("messages/{thread_id}")
    }
}

pub fn inbox(user_id: &str) -> String {
    format!("notifications/{user_id}")
}

pub fn global_inbox() -> String {
    inbox(GLOBAL_INBOX_KEY)
}

pub fn post(post_id: &str) -> String {
    format!("explore_posts/{post_id}")
}

pub fn post_like(post_id: &str, user_id: &str) -> String {
    format!("explore_posts/{post_id}/likes/{user_id}")
}

pub fn comments(post_id: &str) -> String {
    format!("explore_posts/{post_id}/comments")
}

pub fn comment(post_id: &str, comment_id: &str) -> String {
    format!("explore_posts/{post_id}/comments/{comment_id}")
}

pub fn comment_like(post_id: &str, comment_id: &str, user_id: &str) -> String {
    format!("explore_posts/{post_id}/comments/{comment_id}/likes/{user_id}")
}

pub fn replies(post_id: &str, comment_id: &str) -> String {
    format!("explore_posts/{post_id}/comments/{comment_id}/replies")
}

pub fn reply(post_id: &str, comment_id: &str, reply_id: &str) -> String {
    format!("explore_posts/{post_id}/comments/{comment_id}/replies/{reply_id}")
}

pub fn reply_like(post_id: &str, comment_id: &str, reply_id: &str, user_id: &str) -> String {
    format!("explore_posts/{post_id}/comments/{comment_id}/replies/{reply_id}/likes/{user_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relation_paths() {
        assert_eq!(
            relation("u1", Relation::RequestsSent, "u2"),
            "social/u1/requests/sent/u2"
        );
        assert_eq!(relation_set("u1", Relation::Followers), "social/u1/followers");
    }

    #[test]
    fn global_thread_has_its_own_root() {
        assert_eq!(thread(GLOBAL_THREAD_ID), "community/global");
        assert_eq!(thread("u1_u2"), "messages/u1_u2");
    }
}
