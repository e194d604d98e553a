//! Social graph: follow edges and the friend-request state machine.
//!
//! Every relationship lives on both users' `social/{id}` nodes.  A change
//! is described once as a [`RelationshipMutation`] and written as a single
//! multi-path update, so the two sides never disagree after a write.
//! Status shown to a user is always derived from the stored flags, never
//! cached.
//!
//! ```text
//! none ──request──▶ requested ──accept──▶ friends
//!   ▲                  │                     │
//!   └──cancel/reject───┘◀─────unfriend───────┘
//! ```

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{json, Value};

use crate::directory::UserDirectory;
use crate::error::{ensure_user_key, SocialError};
use crate::identity::Actor;
use crate::model::{now_millis, Notification, NotificationKind, User};
use crate::notifications::NotificationCenter;
use crate::paths::{self, Relation};
use crate::policy::{verify_passcode, AccessPolicy, Prompt};
use crate::store::{Query, RealtimeStore, Subscription, UpdateMap};

/// Friendship between two users, from the first user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FriendStatus {
    None,
    RequestSent,
    RequestReceived,
    Friends,
}

impl FriendStatus {
    /// Resolve the three stored flags, highest priority first.
    pub fn derive(friends: bool, sent: bool, received: bool) -> Self {
        if friends {
            FriendStatus::Friends
        } else if sent {
            FriendStatus::RequestSent
        } else if received {
            FriendStatus::RequestReceived
        } else {
            FriendStatus::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    Follow,
    Unfollow,
    Request,
    Cancel,
    Accept,
    Reject,
    Unfriend,
}

/// One relationship change between `actor` and `target`, rendered as the
/// complete set of paths it touches on both sides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipMutation {
    pub kind: RelationshipKind,
    pub actor: String,
    pub target: String,
    pub timestamp: u64,
}

impl RelationshipMutation {
    pub fn new(kind: RelationshipKind, actor: &str, target: &str) -> Self {
        Self {
            kind,
            actor: actor.to_string(),
            target: target.to_string(),
            timestamp: now_millis(),
        }
    }

    /// The update map, relative to the store root.
    pub fn changes(&self) -> UpdateMap {
        let (a, b) = (self.actor.as_str(), self.target.as_str());
        let mut m = UpdateMap::new();
        match self.kind {
            RelationshipKind::Follow => follow_edge(&mut m, a, b, Value::Bool(true)),
            RelationshipKind::Unfollow => follow_edge(&mut m, a, b, Value::Null),
            RelationshipKind::Request => {
                let stamp = json!({ "timestamp": self.timestamp });
                m.insert(paths::relation(a, Relation::RequestsSent, b), stamp.clone());
                m.insert(paths::relation(b, Relation::RequestsReceived, a), stamp);
            }
            RelationshipKind::Cancel | RelationshipKind::Reject => clear_requests(&mut m, a, b),
            RelationshipKind::Accept => {
                clear_requests(&mut m, a, b);
                m.insert(paths::relation(a, Relation::Friends, b), Value::Bool(true));
                m.insert(paths::relation(b, Relation::Friends, a), Value::Bool(true));
            }
            RelationshipKind::Unfriend => {
                m.insert(paths::relation(a, Relation::Friends, b), Value::Null);
                m.insert(paths::relation(b, Relation::Friends, a), Value::Null);
                follow_edge(&mut m, a, b, Value::Null);
                follow_edge(&mut m, b, a, Value::Null);
            }
        }
        m
    }
}

fn follow_edge(m: &mut UpdateMap, from: &str, to: &str, value: Value) {
    m.insert(paths::relation(from, Relation::Following, to), value.clone());
    m.insert(paths::relation(to, Relation::Followers, from), value);
}

/// Pending requests in both directions.
fn clear_requests(m: &mut UpdateMap, a: &str, b: &str) {
    for (x, y) in [(a, b), (b, a)] {
        m.insert(paths::relation(x, Relation::RequestsSent, y), Value::Null);
        m.insert(paths::relation(y, Relation::RequestsReceived, x), Value::Null);
    }
}

#[derive(Clone)]
pub struct SocialGraph {
    store: Arc<dyn RealtimeStore>,
    directory: UserDirectory,
    notifications: NotificationCenter,
    policy: Arc<AccessPolicy>,
}

impl SocialGraph {
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

    fn apply(&self, mutation: RelationshipMutation) -> Result<(), SocialError> {
        self.store.update("", mutation.changes())?;
        crate::alog!(
            "social: {:?} {} -> {}",
            mutation.kind,
            crate::logging::user_id(&mutation.actor),
            crate::logging::user_id(&mutation.target)
        );
        Ok(())
    }

    /// Validate the pair and make sure the target exists.
    fn resolve_target(&self, actor: &Actor, target_id: &str) -> Result<User, SocialError> {
        ensure_user_key("user", target_id)?;
        if actor.id == target_id {
            return Err(SocialError::Validation(
                "cannot change a relationship with yourself".to_string(),
            ));
        }
        self.directory.require(target_id)
    }

    fn has(&self, user_id: &str, relation: Relation, other: &str) -> Result<bool, SocialError> {
        Ok(self
            .store
            .read_once(&paths::relation(user_id, relation, other))?
            .is_some())
    }

    pub fn is_following(&self, user_id: &str, other: &str) -> Result<bool, SocialError> {
        self.has(user_id, Relation::Following, other)
    }

    /// Follow a user.  Re-following rewrites the same edge and does not
    /// notify again.
    pub fn follow(&self, actor: &Actor, target_id: &str) -> Result<(), SocialError> {
        self.resolve_target(actor, target_id)?;
        let already = self.is_following(&actor.id, target_id)?;
        self.apply(RelationshipMutation::new(
            RelationshipKind::Follow,
            &actor.id,
            target_id,
        ))?;
        if !already {
            let n = Notification::from_actor(
                NotificationKind::Follow,
                actor,
                format!("{} started following you", actor.display_name),
            );
            self.notifications.notify(target_id, &n)?;
        }
        Ok(())
    }

    /// Unfollow a user.  Unfollowing a friend needs the actor's passcode
    /// when one is set.
    pub fn unfollow(
        &self,
        actor: &Actor,
        target_id: &str,
        prompt: &mut dyn Prompt,
    ) -> Result<(), SocialError> {
        self.resolve_target(actor, target_id)?;
        if self.friend_status(&actor.id, target_id)? == FriendStatus::Friends {
            self.check_passcode(actor, prompt)?;
        }
        self.apply(RelationshipMutation::new(
            RelationshipKind::Unfollow,
            &actor.id,
            target_id,
        ))
    }

    /// Send a friend request.  Callers check [`SocialGraph::friend_status`]
    /// is `None` first; the engine writes whatever it is asked to.
    pub fn request_friend(&self, actor: &Actor, target_id: &str) -> Result<(), SocialError> {
        self.resolve_target(actor, target_id)?;
        self.apply(RelationshipMutation::new(
            RelationshipKind::Request,
            &actor.id,
            target_id,
        ))?;
        let n = Notification::from_actor(
            NotificationKind::FriendRequest,
            actor,
            format!("{} sent you a friend request", actor.display_name),
        );
        self.notifications.notify(target_id, &n)?;
        Ok(())
    }

    /// Accept or reject a request the actor received from `requester_id`.
    pub fn respond_to_request(
        &self,
        actor: &Actor,
        requester_id: &str,
        accept: bool,
    ) -> Result<FriendStatus, SocialError> {
        self.resolve_target(actor, requester_id)?;
        if !self.has(&actor.id, Relation::RequestsReceived, requester_id)? {
            return Err(SocialError::Validation(format!(
                "no pending friend request from {requester_id}"
            )));
        }
        if accept {
            self.apply(RelationshipMutation::new(
                RelationshipKind::Accept,
                &actor.id,
                requester_id,
            ))?;
            let n = Notification::from_actor(
                NotificationKind::FriendAccepted,
                actor,
                format!("{} accepted your friend request", actor.display_name),
            );
            self.notifications.notify(requester_id, &n)?;
            Ok(FriendStatus::Friends)
        } else {
            self.apply(RelationshipMutation::new(
                RelationshipKind::Reject,
                &actor.id,
                requester_id,
            ))?;
            Ok(FriendStatus::None)
        }
    }

    /// Withdraw a pending request in either direction.
    pub fn cancel_request(&self, actor: &Actor, other_id: &str) -> Result<(), SocialError> {
        ensure_user_key("user", other_id)?;
        if actor.id == other_id {
            return Err(SocialError::Validation(
                "cannot change a relationship with yourself".to_string(),
            ));
        }
        self.apply(RelationshipMutation::new(
            RelationshipKind::Cancel,
            &actor.id,
            other_id,
        ))
    }

    /// Remove a friendship together with the follow edges both ways.
    ///
    /// Requires confirmation, then the passcode if the actor has one.  The
    /// write is a single update, so retrying after a failure is safe.
    pub fn unfriend(
        &self,
        actor: &Actor,
        target_id: &str,
        prompt: &mut dyn Prompt,
    ) -> Result<(), SocialError> {
        let target = self.resolve_target(actor, target_id)?;
        let shown = self.policy.mask(&actor.username, target);
        if !prompt.confirm(&format!("Remove {} from your friends?", shown.name)) {
            return Err(SocialError::Unauthorized(
                "unfriend was not confirmed".to_string(),
            ));
        }
        self.check_passcode(actor, prompt)?;
        self.apply(RelationshipMutation::new(
            RelationshipKind::Unfriend,
            &actor.id,
            target_id,
        ))
    }

    fn check_passcode(&self, actor: &Actor, prompt: &mut dyn Prompt) -> Result<(), SocialError> {
        match self.directory.get(&actor.id)? {
            Some(user) => verify_passcode(&user, prompt),
            None => Ok(()),
        }
    }

    /// One-shot status of `user_id` towards `other`.
    pub fn friend_status(&self, user_id: &str, other: &str) -> Result<FriendStatus, SocialError> {
        ensure_user_key("user", user_id)?;
        ensure_user_key("user", other)?;
        Ok(FriendStatus::derive(
            self.has(user_id, Relation::Friends, other)?,
            self.has(user_id, Relation::RequestsSent, other)?,
            self.has(user_id, Relation::RequestsReceived, other)?,
        ))
    }

    /// Live status: watches the three flags and calls back with the
    /// derived status once all three have loaded, then on every change.
    pub fn watch_friend_status(
        &self,
        user_id: &str,
        other: &str,
        callback: Box<dyn Fn(FriendStatus) + Send + Sync>,
    ) -> Result<FriendStatusWatch, SocialError> {
        ensure_user_key("user", user_id)?;
        ensure_user_key("user", other)?;
        let flags: Arc<Mutex<[Option<bool>; 3]>> = Arc::new(Mutex::new([None; 3]));
        let callback: Arc<dyn Fn(FriendStatus) + Send + Sync> = Arc::from(callback);

        let relations = [
            Relation::Friends,
            Relation::RequestsSent,
            Relation::RequestsReceived,
        ];
        let mut subscriptions = Vec::with_capacity(relations.len());
        for (slot, relation) in relations.into_iter().enumerate() {
            let flags = flags.clone();
            let callback = callback.clone();
            let sub = self.store.subscribe(
                &paths::relation(user_id, relation, other),
                Box::new(move |snap| {
                    let status = {
                        let mut f = match flags.lock() {
                            Ok(guard) => guard,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        f[slot] = Some(snap.exists());
                        match *f {
                            [Some(friends), Some(sent), Some(received)] => {
                                Some(FriendStatus::derive(friends, sent, received))
                            }
                            _ => None,
                        }
                    };
                    if let Some(status) = status {
                        callback(status);
                    }
                }),
            )?;
            subscriptions.push(sub);
        }
        Ok(FriendStatusWatch {
            _subscriptions: subscriptions,
        })
    }

    fn related_users(
        &self,
        viewer: &Actor,
        user_id: &str,
        relation: Relation,
    ) -> Result<Vec<User>, SocialError> {
        ensure_user_key("user", user_id)?;
        let rows = self
            .store
            .query(&paths::relation_set(user_id, relation), &Query::new())?;
        let mut users = Vec::with_capacity(rows.len());
        for (other_id, _) in rows {
            match self.directory.get(&other_id)? {
                Some(user) => users.push(self.policy.mask(&viewer.username, user)),
                None => crate::alog!(
                    "social: {} lists unknown user {}",
                    crate::logging::user_id(user_id),
                    crate::logging::user_id(&other_id)
                ),
            }
        }
        Ok(users)
    }

    pub fn followers(&self, viewer: &Actor, user_id: &str) -> Result<Vec<User>, SocialError> {
        self.related_users(viewer, user_id, Relation::Followers)
    }

    pub fn following(&self, viewer: &Actor, user_id: &str) -> Result<Vec<User>, SocialError> {
        self.related_users(viewer, user_id, Relation::Following)
    }

    pub fn friends(&self, viewer: &Actor, user_id: &str) -> Result<Vec<User>, SocialError> {
        self.related_users(viewer, user_id, Relation::Friends)
    }

    /// Users who sent the actor a request that is still pending.
    pub fn incoming_requests(&self, actor: &Actor) -> Result<Vec<User>, SocialError> {
        self.related_users(actor, &actor.id, Relation::RequestsReceived)
    }
}

/// Live friend-status subscription; dropping it tears down all three
/// underlying listeners.
pub struct FriendStatusWatch {
    _subscriptions: Vec<Subscription>,
}

impl FriendStatusWatch {
    pub fn unsubscribe(self) {
        drop(self);
    }
}
