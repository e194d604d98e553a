//! Integration tests for explore posts: likes, comments, replies, badges
//! and author masking.

use atelier::content::PostDraft;
use atelier::identity::Actor;
use atelier::messaging::Media;
use atelier::model::{now_millis, NotificationKind};
use atelier::policy::{AccessPolicy, MASKED_NAME, MASKED_USERNAME};
use atelier::{Atelier, SocialError};
use serde_json::json;

// ----- Helpers -----

fn setup() -> (Atelier, Actor, Actor) {
    let app = Atelier::in_memory(AccessPolicy::new("owner", "hidden"));
    let ada = Actor::new("u1", "ada", "Ada");
    let bob = Actor::new("u2", "bob", "Bob");
    app.directory.upsert_on_login(&ada).expect("login ada");
    app.directory.upsert_on_login(&bob).expect("login bob");
    (app, ada, bob)
}

fn text_post(app: &Atelier, author: &Actor, text: &str) -> String {
    app.content
        .create_post(
            author,
            PostDraft {
                text: text.to_string(),
                media: None,
            },
        )
        .expect("create post")
        .id
}

fn count_kind(app: &Atelier, user_id: &str, kind: NotificationKind) -> usize {
    app.notifications
        .inbox(user_id)
        .expect("inbox")
        .iter()
        .filter(|i| i.notification.kind == kind)
        .count()
}

// ----- Posts and likes -----

#[test]
fn create_post_requires_content_and_an_unlocked_author() {
    let (app, ada, _bob) = setup();
    let empty = app.content.create_post(
        &ada,
        PostDraft {
            text: "  ".to_string(),
            media: None,
        },
    );
    assert!(matches!(empty, Err(SocialError::Validation(_))));

    let photo = app
        .content
        .create_post(
            &ada,
            PostDraft {
                text: String::new(),
                media: Some(Media {
                    url: "https://cdn.example/p.jpg".to_string(),
                    media_type: "image".to_string(),
                }),
            },
        )
        .expect("media post");
    assert_eq!(photo.text, None);

    app.store
        .set("users/u1/lockedUntil", json!(now_millis() + 60_000))
        .unwrap();
    let locked = app.content.create_post(
        &ada,
        PostDraft {
            text: "hello".to_string(),
            media: None,
        },
    );
    assert!(matches!(locked, Err(SocialError::Unauthorized(_))));
}

#[test]
fn like_toggles_and_notifies_on_each_new_like_only() {
    let (app, ada, bob) = setup();
    let post_id = text_post(&app, &ada, "first light");

    assert!(app.content.toggle_like(&bob, &post_id).unwrap());
    let view = app.content.post_view(&bob, &post_id).unwrap();
    assert_eq!(view.like_count, 1);
    assert!(view.liked);
    assert_eq!(count_kind(&app, "u1", NotificationKind::PostLike), 1);

    assert!(!app.content.toggle_like(&bob, &post_id).unwrap());
    let view = app.content.post_view(&bob, &post_id).unwrap();
    assert_eq!(view.like_count, 0);
    assert!(!view.liked);
    assert_eq!(count_kind(&app, "u1", NotificationKind::PostLike), 1);
    assert_eq!(
        app.store
            .read_once(&format!("explore_posts/{post_id}/likes/u2"))
            .unwrap(),
        None
    );
}

#[test]
fn own_activity_does_not_notify() {
    let (app, ada, _bob) = setup();
    let post_id = text_post(&app, &ada, "mine");
    app.content.toggle_like(&ada, &post_id).unwrap();
    let comment = app.content.post_comment(&ada, &post_id, "note to self").unwrap();
    app.content
        .post_reply(&ada, &post_id, &comment.id, "and another")
        .unwrap();
    assert!(app.notifications.inbox("u1").unwrap().is_empty());
}

#[test]
fn missing_posts_and_comments_are_not_found() {
    let (app, ada, _bob) = setup();
    assert!(matches!(
        app.content.toggle_like(&ada, "nope"),
        Err(SocialError::NotFound(_))
    ));
    let post_id = text_post(&app, &ada, "here");
    assert!(matches!(
        app.content.post_reply(&ada, &post_id, "nope", "hi"),
        Err(SocialError::NotFound(_))
    ));
    let comment = app.content.post_comment(&ada, &post_id, "c").unwrap();
    assert!(matches!(
        app.content
            .toggle_reply_like(&ada, &post_id, &comment.id, "nope"),
        Err(SocialError::NotFound(_))
    ));
}

// ----- Comments and replies -----

#[test]
fn comment_notifies_the_post_author_and_reply_the_comment_author() {
    let (app, ada, bob) = setup();
    let cat = Actor::new("u3", "cat", "Cat");
    app.directory.upsert_on_login(&cat).unwrap();

    let post_id = text_post(&app, &ada, "question of the day");
    let comment = app
        .content
        .post_comment(&bob, &post_id, "good one")
        .expect("comment");
    assert_eq!(count_kind(&app, "u1", NotificationKind::PostComment), 1);
    let inbox = app.notifications.inbox("u1").unwrap();
    assert_eq!(inbox[0].notification.post_id.as_deref(), Some(post_id.as_str()));
    assert_eq!(
        inbox[0].notification.comment_id.as_deref(),
        Some(comment.id.as_str())
    );

    app.content
        .post_reply(&cat, &post_id, &comment.id, "agreed")
        .expect("reply");
    assert_eq!(count_kind(&app, "u2", NotificationKind::CommentReply), 1);
    assert_eq!(count_kind(&app, "u1", NotificationKind::CommentReply), 0);

    let view = app.content.post_view(&ada, &post_id).unwrap();
    assert_eq!(view.comments.len(), 1);
    assert_eq!(view.comments[0].text, "good one");
    assert_eq!(view.comments[0].replies.len(), 1);
    assert_eq!(view.comments[0].replies[0].username, "cat");
}

#[test]
fn author_like_is_flagged_on_the_comment() {
    let (app, ada, bob) = setup();
    let post_id = text_post(&app, &ada, "thoughts?");
    let comment = app.content.post_comment(&bob, &post_id, "yes").unwrap();

    let guest = Actor::new("u7", "guest123", "Guest");
    assert!(!app.content.post_view(&guest, &post_id).unwrap().comments[0].author_liked);

    assert!(app
        .content
        .toggle_comment_like(&ada, &post_id, &comment.id)
        .unwrap());
    let view = app.content.post_view(&guest, &post_id).unwrap();
    assert!(view.comments[0].author_liked);
    assert_eq!(view.comments[0].like_count, 1);
    assert!(!view.comments[0].liked);
    // Comment likes do not notify.
    assert_eq!(app.notifications.inbox("u2").unwrap().len(), 0);
}

#[test]
fn reply_likes_toggle() {
    let (app, ada, bob) = setup();
    let post_id = text_post(&app, &ada, "p");
    let comment = app.content.post_comment(&bob, &post_id, "c").unwrap();
    let reply = app
        .content
        .post_reply(&ada, &post_id, &comment.id, "r")
        .unwrap();

    assert!(app
        .content
        .toggle_reply_like(&bob, &post_id, &comment.id, &reply.id)
        .unwrap());
    let view = app.content.post_view(&bob, &post_id).unwrap();
    let shown = &view.comments[0].replies[0];
    assert_eq!(shown.like_count, 1);
    assert!(shown.liked);

    assert!(!app
        .content
        .toggle_reply_like(&bob, &post_id, &comment.id, &reply.id)
        .unwrap());
}

#[test]
fn comment_badge_is_a_snapshot() {
    let (app, ada, bob) = setup();
    app.store.set("users/u2/customBadge", json!("Founder")).unwrap();
    let post_id = text_post(&app, &ada, "launch day");
    let comment = app.content.post_comment(&bob, &post_id, "congrats").unwrap();
    assert_eq!(comment.custom_badge.as_deref(), Some("Founder"));

    app.store.remove("users/u2/customBadge").unwrap();
    let view = app.content.post_view(&ada, &post_id).unwrap();
    assert_eq!(view.comments[0].custom_badge.as_deref(), Some("Founder"));

    let later = app.content.post_comment(&bob, &post_id, "again").unwrap();
    assert_eq!(later.custom_badge, None);
}

// ----- Feed and masking -----

#[test]
fn feed_lists_newest_first_with_a_limit() {
    let (app, ada, _bob) = setup();
    for text in ["one", "two", "three"] {
        text_post(&app, &ada, text);
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
    let feed = app.content.feed(&ada, None).unwrap();
    let texts: Vec<_> = feed.iter().filter_map(|p| p.text.as_deref()).collect();
    assert_eq!(texts, vec!["three", "two", "one"]);

    let top = app.content.feed(&ada, Some(2)).unwrap();
    assert_eq!(top.len(), 2);
    assert_eq!(top[0].text.as_deref(), Some("three"));
}

#[test]
fn restricted_author_is_masked_across_posts_comments_and_replies() {
    let (app, ada, _bob) = setup();
    let hidden = Actor::new("u3", "hidden", "Hidden Person").with_avatar("https://a/h.png");
    let owner = Actor::new("u9", "owner", "Owner");
    app.directory.upsert_on_login(&hidden).unwrap();
    app.directory.upsert_on_login(&owner).unwrap();

    let post_id = text_post(&app, &hidden, "from the shadows");
    let comment = app.content.post_comment(&hidden, &post_id, "c").unwrap();
    app.content
        .post_reply(&hidden, &post_id, &comment.id, "r")
        .unwrap();

    let guest = Actor::new("u7", "guest123", "Guest");
    for viewer in [&guest, &ada] {
        let view = app.content.post_view(viewer, &post_id).unwrap();
        assert_eq!(view.username, MASKED_USERNAME);
        assert_eq!(view.user_name, MASKED_NAME);
        assert_eq!(view.user_avatar, None);
        assert_eq!(view.comments[0].username, MASKED_USERNAME);
        assert_eq!(view.comments[0].replies[0].username, MASKED_USERNAME);
        assert_eq!(view.text.as_deref(), Some("from the shadows"));
    }

    let feed = app.content.feed(&guest, None).unwrap();
    assert_eq!(feed[0].username, MASKED_USERNAME);

    let view = app.content.post_view(&owner, &post_id).unwrap();
    assert_eq!(view.username, "hidden");
    assert_eq!(view.user_avatar.as_deref(), Some("https://a/h.png"));
    assert_eq!(view.comments[0].replies[0].username, "hidden");
}
