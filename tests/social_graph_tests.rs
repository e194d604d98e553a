//! Integration tests for the social graph: follows, friend requests,
//! friendships and live status watches.

use std::sync::{Arc, Mutex};

use atelier::identity::Actor;
use atelier::model::NotificationKind;
use atelier::policy::{AccessPolicy, PresetPrompt, MASKED_USERNAME};
use atelier::social::FriendStatus;
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

fn kinds(app: &Atelier, user_id: &str) -> Vec<NotificationKind> {
    app.notifications
        .inbox(user_id)
        .expect("inbox")
        .into_iter()
        .map(|item| item.notification.kind)
        .collect()
}

fn exists(app: &Atelier, path: &str) -> bool {
    app.store.read_once(path).expect("read").is_some()
}

// ----- Follows -----

#[test]
fn follow_writes_both_edges_and_notifies_once() {
    let (app, ada, _bob) = setup();
    app.social.follow(&ada, "u2").expect("follow");
    app.social.follow(&ada, "u2").expect("follow again");

    assert_eq!(
        app.store.read_once("social/u1/following/u2").unwrap(),
        Some(json!(true))
    );
    assert_eq!(
        app.store.read_once("social/u2/followers/u1").unwrap(),
        Some(json!(true))
    );
    assert!(app.social.is_following("u1", "u2").unwrap());
    assert!(!app.social.is_following("u2", "u1").unwrap());

    let follows = kinds(&app, "u2")
        .into_iter()
        .filter(|k| *k == NotificationKind::Follow)
        .count();
    assert_eq!(follows, 1);
}

#[test]
fn follow_rejects_self_and_missing_users() {
    let (app, ada, _bob) = setup();
    assert!(matches!(
        app.social.follow(&ada, "u1"),
        Err(SocialError::Validation(_))
    ));
    assert!(matches!(
        app.social.follow(&ada, "ghost"),
        Err(SocialError::NotFound(_))
    ));
    assert!(!exists(&app, "social/u1/following"));
}

#[test]
fn unfollow_removes_both_edges() {
    let (app, ada, _bob) = setup();
    app.social.follow(&ada, "u2").unwrap();
    app.social
        .unfollow(&ada, "u2", &mut PresetPrompt::default())
        .expect("unfollow");
    assert!(!exists(&app, "social/u1/following/u2"));
    assert!(!exists(&app, "social/u2/followers/u1"));
}

// ----- Friend requests -----

#[test]
fn accepted_request_makes_friends_and_notifies_requester() {
    let (app, ada, bob) = setup();
    app.social.request_friend(&ada, "u2").expect("request");

    assert!(exists(&app, "social/u1/requests/sent/u2"));
    assert!(exists(&app, "social/u2/requests/received/u1"));
    assert_eq!(
        app.social.friend_status("u1", "u2").unwrap(),
        FriendStatus::RequestSent
    );
    assert_eq!(
        app.social.friend_status("u2", "u1").unwrap(),
        FriendStatus::RequestReceived
    );
    assert!(kinds(&app, "u2").contains(&NotificationKind::FriendRequest));

    let incoming = app.social.incoming_requests(&bob).unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].id, "u1");

    let status = app
        .social
        .respond_to_request(&bob, "u1", true)
        .expect("accept");
    assert_eq!(status, FriendStatus::Friends);

    for path in [
        "social/u1/requests/sent/u2",
        "social/u2/requests/received/u1",
        "social/u2/requests/sent/u1",
        "social/u1/requests/received/u2",
    ] {
        assert!(!exists(&app, path), "{path} should be cleared");
    }
    assert_eq!(
        app.store.read_once("social/u1/friends/u2").unwrap(),
        Some(json!(true))
    );
    assert_eq!(
        app.store.read_once("social/u2/friends/u1").unwrap(),
        Some(json!(true))
    );
    assert_eq!(
        app.social.friend_status("u1", "u2").unwrap(),
        FriendStatus::Friends
    );
    assert!(kinds(&app, "u1").contains(&NotificationKind::FriendAccepted));

    let friends = app.social.friends(&ada, "u1").unwrap();
    assert_eq!(friends.len(), 1);
    assert_eq!(friends[0].username, "bob");
}

#[test]
fn rejected_request_clears_flags_without_notifying() {
    let (app, ada, bob) = setup();
    app.social.request_friend(&ada, "u2").unwrap();
    let status = app.social.respond_to_request(&bob, "u1", false).unwrap();
    assert_eq!(status, FriendStatus::None);
    assert_eq!(
        app.social.friend_status("u1", "u2").unwrap(),
        FriendStatus::None
    );
    assert!(!kinds(&app, "u1").contains(&NotificationKind::FriendAccepted));
}

#[test]
fn responding_without_a_request_is_rejected() {
    let (app, _ada, bob) = setup();
    assert!(matches!(
        app.social.respond_to_request(&bob, "u1", true),
        Err(SocialError::Validation(_))
    ));
    assert!(!exists(&app, "social/u2/friends/u1"));
}

#[test]
fn cancel_withdraws_a_pending_request() {
    let (app, ada, _bob) = setup();
    app.social.request_friend(&ada, "u2").unwrap();
    app.social.cancel_request(&ada, "u2").expect("cancel");
    assert_eq!(
        app.social.friend_status("u2", "u1").unwrap(),
        FriendStatus::None
    );
    assert!(!exists(&app, "social/u2/requests/received/u1"));
}

// ----- Friendships -----

fn befriend(app: &Atelier, ada: &Actor, bob: &Actor) {
    app.social.request_friend(ada, &bob.id).unwrap();
    app.social.respond_to_request(bob, &ada.id, true).unwrap();
    app.social.follow(ada, &bob.id).unwrap();
    app.social.follow(bob, &ada.id).unwrap();
}

#[test]
fn unfriend_needs_confirmation() {
    let (app, ada, bob) = setup();
    befriend(&app, &ada, &bob);

    let refused = app
        .social
        .unfriend(&ada, "u2", &mut PresetPrompt::default());
    assert!(matches!(refused, Err(SocialError::Unauthorized(_))));
    assert!(exists(&app, "social/u1/friends/u2"));

    app.social
        .unfriend(&ada, "u2", &mut PresetPrompt::confirmed())
        .expect("unfriend");
    for path in [
        "social/u1/friends/u2",
        "social/u2/friends/u1",
        "social/u1/following/u2",
        "social/u2/followers/u1",
        "social/u2/following/u1",
        "social/u1/followers/u2",
    ] {
        assert!(!exists(&app, path), "{path} should be removed");
    }

    // Retrying a completed unfriend is harmless.
    app.social
        .unfriend(&ada, "u2", &mut PresetPrompt::confirmed())
        .expect("retry");
}

#[test]
fn passcode_gates_unfriend_and_unfollowing_a_friend() {
    let (app, ada, bob) = setup();
    befriend(&app, &ada, &bob);
    app.directory
        .set_passcode(&ada, Some("1234"))
        .expect("passcode");

    let wrong = app.social.unfriend(
        &ada,
        "u2",
        &mut PresetPrompt::confirmed().with_passcode("9999"),
    );
    assert!(matches!(wrong, Err(SocialError::Unauthorized(_))));

    let missing = app
        .social
        .unfollow(&ada, "u2", &mut PresetPrompt::default());
    assert!(matches!(missing, Err(SocialError::Unauthorized(_))));
    assert!(app.social.is_following("u1", "u2").unwrap());

    app.social
        .unfollow(&ada, "u2", &mut PresetPrompt::default().with_passcode("1234"))
        .expect("unfollow with passcode");
    assert!(!app.social.is_following("u1", "u2").unwrap());
    assert_eq!(
        app.social.friend_status("u1", "u2").unwrap(),
        FriendStatus::Friends
    );
}

#[test]
fn status_stays_exclusive_through_a_full_cycle() {
    let (app, ada, bob) = setup();
    let flags = |app: &Atelier| {
        [
            exists(app, "social/u1/friends/u2"),
            exists(app, "social/u1/requests/sent/u2"),
            exists(app, "social/u1/requests/received/u2"),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    };

    app.social.request_friend(&ada, "u2").unwrap();
    assert_eq!(flags(&app), 1);
    app.social.respond_to_request(&bob, "u1", true).unwrap();
    assert_eq!(flags(&app), 1);
    app.social
        .unfriend(&bob, "u1", &mut PresetPrompt::confirmed())
        .unwrap();
    assert_eq!(flags(&app), 0);
    app.social.request_friend(&bob, "u1").unwrap();
    assert_eq!(flags(&app), 1);
    assert_eq!(
        app.social.friend_status("u1", "u2").unwrap(),
        FriendStatus::RequestReceived
    );
}

// ----- Live status -----

#[test]
fn watch_friend_status_follows_the_relationship() {
    let (app, ada, bob) = setup();
    let seen: Arc<Mutex<Vec<FriendStatus>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let watch = app
        .social
        .watch_friend_status(
            "u1",
            "u2",
            Box::new(move |status| sink.lock().unwrap().push(status)),
        )
        .expect("watch");

    assert_eq!(*seen.lock().unwrap(), vec![FriendStatus::None]);

    app.social.request_friend(&ada, "u2").unwrap();
    assert_eq!(
        seen.lock().unwrap().last().copied(),
        Some(FriendStatus::RequestSent)
    );

    app.social.respond_to_request(&bob, "u1", true).unwrap();
    assert_eq!(
        seen.lock().unwrap().last().copied(),
        Some(FriendStatus::Friends)
    );

    watch.unsubscribe();
    let before = seen.lock().unwrap().len();
    app.social
        .unfriend(&ada, "u2", &mut PresetPrompt::confirmed())
        .unwrap();
    assert_eq!(seen.lock().unwrap().len(), before);
}

// ----- Masking -----

#[test]
fn follower_lists_mask_the_restricted_identity() {
    let (app, _ada, bob) = setup();
    let hidden = Actor::new("u3", "hidden", "Hidden Person");
    let owner = Actor::new("u9", "owner", "Owner");
    app.directory.upsert_on_login(&hidden).unwrap();
    app.directory.upsert_on_login(&owner).unwrap();
    app.social.follow(&hidden, "u2").unwrap();

    let seen_by_bob = app.social.followers(&bob, "u2").unwrap();
    assert_eq!(seen_by_bob.len(), 1);
    assert_eq!(seen_by_bob[0].username, MASKED_USERNAME);
    assert_eq!(seen_by_bob[0].avatar_url, None);

    let seen_by_owner = app.social.followers(&owner, "u2").unwrap();
    assert_eq!(seen_by_owner[0].username, "hidden");
    assert_eq!(seen_by_owner[0].name, "Hidden Person");
}
