//! User directory: canonical `users/{id}` records.
//!
//! User nodes also hold the `unread` and `conversations` maps, so records
//! are always written field-by-field through a multi-path update and never
//! replaced wholesale.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{ensure_user_key, SocialError};
use crate::identity::{normalize_username, Actor};
use crate::model::{decode, decode_children, now_millis, Role, User};
use crate::paths;
use crate::policy::{hash_passcode, validate_passcode, AccessPolicy};
use crate::store::{Query, RealtimeStore, UpdateMap};

/// Requested profile changes.  `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn RealtimeStore>,
    policy: Arc<AccessPolicy>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn RealtimeStore>, policy: Arc<AccessPolicy>) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Load a user record, with its role resolved from configuration.
    pub fn get(&self, id: &str) -> Result<Option<User>, SocialError> {
        ensure_user_key("user", id)?;
        let path = paths::user(id);
        let Some(value) = self.store.read_once(&path)? else {
            return Ok(None);
        };
        Ok(decode::<User>(&path, value).map(|mut user| {
            if user.id.is_empty() {
                user.id = id.to_string();
            }
            self.policy.resolve(user)
        }))
    }

    pub fn require(&self, id: &str) -> Result<User, SocialError> {
        self.get(id)?
            .ok_or_else(|| SocialError::NotFound(format!("user {id}")))
    }

    /// Find a user by handle.  Should two records share a handle, the most
    /// recently active one wins.
    pub fn find_by_username(&self, handle: &str) -> Result<Option<User>, SocialError> {
        Ok(self
            .holders_of(&normalize_username(handle))?
            .into_iter()
            .max_by_key(|u| u.last_active_at))
    }

    fn holders_of(&self, username: &str) -> Result<Vec<User>, SocialError> {
        let q = Query::new().order_by_child("username").equal_to(username);
        let rows = self.store.query(paths::USERS, &q)?;
        Ok(decode_children::<User>(paths::USERS, rows)
            .into_iter()
            .map(|(key, mut user)| {
                if user.id.is_empty() {
                    user.id = key;
                }
                self.policy.resolve(user)
            })
            .collect())
    }

    /// Create or refresh the actor's record on sign-in.
    ///
    /// The identity provider is authoritative for handles at login, so a
    /// collision with another record is logged and the login proceeds.
    pub fn upsert_on_login(&self, actor: &Actor) -> Result<User, SocialError> {
        ensure_user_key("user", &actor.id)?;
        let now = now_millis();
        let existing = self.get(&actor.id)?;

        for other in self.holders_of(&actor.username)? {
            if other.id != actor.id {
                crate::alog!(
                    "directory: @{} is also claimed by {}; provider session for {} wins",
                    actor.username,
                    crate::logging::user_id(&other.id),
                    crate::logging::user_id(&actor.id)
                );
            }
        }

        let mut changes = UpdateMap::new();
        changes.insert("lastActiveAt".to_string(), Value::from(now));
        let stale = match &existing {
            None => true,
            Some(user) => {
                user.username != actor.username
                    || user.avatar_url != actor.avatar_url
                    || user.name.is_empty()
            }
        };
        if stale {
            changes.insert("id".to_string(), Value::from(actor.id.clone()));
            changes.insert("username".to_string(), Value::from(actor.username.clone()));
            changes.insert(
                "avatarUrl".to_string(),
                actor.avatar_url.clone().map(Value::from).unwrap_or(Value::Null),
            );
            let role = self.policy.role_for(&actor.username);
            changes.insert("role".to_string(), serde_json::to_value(role)?);
            let keep_name = existing.as_ref().is_some_and(|u| !u.name.is_empty());
            if !keep_name {
                changes.insert("name".to_string(), Value::from(actor.display_name.clone()));
            }
        }
        self.store.update(&paths::user(&actor.id), changes)?;

        if existing.is_none() {
            crate::alog!(
                "directory: created @{} as {}",
                actor.username,
                crate::logging::user_id(&actor.id)
            );
        } else if stale {
            crate::alog!(
                "directory: synced profile of {} from identity provider",
                crate::logging::user_id(&actor.id)
            );
        }
        self.require(&actor.id)
    }

    /// Apply a profile edit.  A username already held by another record is
    /// rejected, as is a privileged handle the identity provider did not
    /// assert for this actor.
    pub fn update_profile(&self, actor: &Actor, update: ProfileUpdate) -> Result<User, SocialError> {
        self.require(&actor.id)?;
        let mut changes = UpdateMap::new();

        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(SocialError::Validation("name cannot be empty".to_string()));
            }
            changes.insert("name".to_string(), Value::from(name));
        }
        if let Some(raw) = update.username {
            let username = normalize_username(&raw);
            validate_username(&username)?;
            let role = self.policy.role_for(&username);
            if role != Role::Member && username != normalize_username(&actor.username) {
                return Err(SocialError::Unauthorized(format!(
                    "username @{username} is reserved"
                )));
            }
            if self
                .holders_of(&username)?
                .iter()
                .any(|u| u.id != actor.id)
            {
                return Err(SocialError::Validation(format!(
                    "username @{username} is already taken"
                )));
            }
            changes.insert("role".to_string(), serde_json::to_value(role)?);
            changes.insert("username".to_string(), Value::from(username));
        }
        if let Some(url) = update.avatar_url {
            let url = url.trim().to_string();
            changes.insert(
                "avatarUrl".to_string(),
                if url.is_empty() { Value::Null } else { Value::from(url) },
            );
        }

        if !changes.is_empty() {
            self.store.update(&paths::user(&actor.id), changes)?;
        }
        self.require(&actor.id)
    }

    /// Set or clear the chat passcode.
    pub fn set_passcode(&self, actor: &Actor, passcode: Option<&str>) -> Result<(), SocialError> {
        self.require(&actor.id)?;
        let value = match passcode {
            Some(code) => {
                let code = code.trim();
                validate_passcode(code)?;
                Value::from(hash_passcode(&actor.id, code))
            }
            None => Value::Null,
        };
        self.set_fields(&actor.id, [("chatPasscode", value)])
    }

    /// Refresh `lastActiveAt` on an existing record.
    pub fn touch(&self, id: &str) -> Result<(), SocialError> {
        self.require(id)?;
        self.set_fields(id, [("lastActiveAt", Value::from(now_millis()))])
    }

    /// Write individual fields of an existing record.
    pub(crate) fn set_fields<'a, I>(&self, id: &str, fields: I) -> Result<(), SocialError>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        ensure_user_key("user", id)?;
        let changes: UpdateMap = fields
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        self.store.update(&paths::user(id), changes)?;
        Ok(())
    }

    /// The user as `viewer_username` is allowed to see them.
    pub fn view(&self, viewer_username: &str, id: &str) -> Result<User, SocialError> {
        let user = self.require(id)?;
        Ok(self.policy.mask(viewer_username, user))
    }

    /// Look up by handle and mask for the viewer.
    pub fn view_by_username(&self, viewer_username: &str, handle: &str) -> Result<User, SocialError> {
        let user = self
            .find_by_username(handle)?
            .ok_or_else(|| SocialError::NotFound(format!("user @{handle}")))?;
        Ok(self.policy.mask(viewer_username, user))
    }
}

/// Handles are 3-30 characters of lowercase letters, digits, `_` or `-`.
pub fn validate_username(username: &str) -> Result<(), SocialError> {
    let ok_len = (3..=30).contains(&username.chars().count());
    let ok_chars = username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if ok_len && ok_chars {
        Ok(())
    } else {
        Err(SocialError::Validation(format!(
            "username '{username}' must be 3-30 lowercase letters, digits, '_' or '-'"
        )))
    }
}
