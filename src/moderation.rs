//! Account moderation: locks, warnings, badges and reports.
//!
//! Only owner and admin roles may moderate.  Reports go to the owner
//! account's inbox.

use serde_json::Value;

use crate::directory::UserDirectory;
use crate::error::{ensure_user_key, SocialError};
use crate::identity::Actor;
use crate::model::{now_millis, Notification, NotificationKind, Role, User};
use crate::notifications::NotificationCenter;

#[derive(Clone)]
pub struct Moderation {
    directory: UserDirectory,
    notifications: NotificationCenter,
}

impl Moderation {
    pub fn new(directory: UserDirectory, notifications: NotificationCenter) -> Self {
        Self {
            directory,
            notifications,
        }
    }

    /// Check the moderator's role and load the target.  Admins cannot act
    /// on the owner account.
    fn authorize(&self, moderator: &Actor, target_id: &str) -> Result<User, SocialError> {
        let role = self.directory.policy().ensure_moderator(&moderator.username)?;
        let target = self.directory.require(target_id)?;
        if target.role == Role::Owner && role != Role::Owner {
            return Err(SocialError::Unauthorized(
                "the owner account cannot be moderated".to_string(),
            ));
        }
        Ok(target)
    }

    fn write(
        &self,
        moderator: &Actor,
        target_id: &str,
        field: &str,
        value: Value,
    ) -> Result<User, SocialError> {
        ensure_user_key("user", target_id)?;
        self.authorize(moderator, target_id)?;
        self.directory.set_fields(target_id, [(field, value)])?;
        crate::alog!(
            "moderation: @{} set {} on {}",
            moderator.username,
            field,
            crate::logging::user_id(target_id)
        );
        self.directory.require(target_id)
    }

    /// Lock an account until `until` (milliseconds since epoch).
    pub fn lock_user(&self, moderator: &Actor, target_id: &str, until: u64) -> Result<User, SocialError> {
        if until <= now_millis() {
            return Err(SocialError::Validation(
                "lock must end in the future".to_string(),
            ));
        }
        self.write(moderator, target_id, "lockedUntil", Value::from(until))
    }

    pub fn unlock_user(&self, moderator: &Actor, target_id: &str) -> Result<User, SocialError> {
        self.write(moderator, target_id, "lockedUntil", Value::Null)
    }

    pub fn warn_user(&self, moderator: &Actor, target_id: &str, text: &str) -> Result<User, SocialError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SocialError::Validation("warning text cannot be empty".to_string()));
        }
        self.write(moderator, target_id, "warning", Value::from(text))
    }

    pub fn clear_warning(&self, moderator: &Actor, target_id: &str) -> Result<User, SocialError> {
        self.write(moderator, target_id, "warning", Value::Null)
    }

    /// Set or clear a badge.  Existing comments keep the badge they were
    /// written with.
    pub fn set_badge(
        &self,
        moderator: &Actor,
        target_id: &str,
        badge: Option<&str>,
    ) -> Result<User, SocialError> {
        let value = match badge.map(str::trim).filter(|b| !b.is_empty()) {
            Some(b) => Value::from(b),
            None => Value::Null,
        };
        self.write(moderator, target_id, "customBadge", value)
    }

    /// Report a user to the owner.  Returns `false` when no owner account
    /// exists to receive it.
    pub fn report_user(&self, actor: &Actor, target_id: &str, reason: &str) -> Result<bool, SocialError> {
        ensure_user_key("user", target_id)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SocialError::Validation("report needs a reason".to_string()));
        }
        let target = self.directory.require(target_id)?;
        let owner_handle = self.directory.policy().owner_handle().to_string();
        let Some(owner) = self.directory.find_by_username(&owner_handle)? else {
            crate::alog!("moderation: report dropped, no @{} account", owner_handle);
            return Ok(false);
        };
        let n = Notification::from_actor(
            NotificationKind::UserReport,
            actor,
            format!("reported @{}: {reason}", target.username),
        );
        self.notifications.notify(&owner.id, &n)?;
        Ok(true)
    }
}
