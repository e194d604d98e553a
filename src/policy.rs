//! Access control and identity masking.
//!
//! Every check here is advisory: it runs in the engines before a write, and
//! nothing in the store itself enforces it.
//!
//! The restricted identity's real profile is only shown to the owner and
//! to the restricted identity itself.  Everyone else sees
//! [`masked_profile`] wherever that identity is the author of something.

use std::collections::BTreeSet;

use sha2::{Digest, Sha256};

use crate::error::SocialError;
use crate::identity::normalize_username;
use crate::model::{Comment, Message, Notification, Post, Reply, Role, User};

pub const MASKED_NAME: &str = "Community Member";
pub const MASKED_USERNAME: &str = "masked_member";

/// The display fields of whoever authored a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub username: String,
    pub avatar: Option<String>,
}

pub fn masked_profile() -> Profile {
    Profile {
        name: MASKED_NAME.to_string(),
        username: MASKED_USERNAME.to_string(),
        avatar: None,
    }
}

/// Records that carry an author profile which may need masking.
pub trait Maskable {
    fn profile(&self) -> Profile;
    fn set_profile(&mut self, profile: Profile);
}

impl Maskable for User {
    fn profile(&self) -> Profile {
        Profile {
            name: self.name.clone(),
            username: self.username.clone(),
            avatar: self.avatar_url.clone(),
        }
    }

    fn set_profile(&mut self, profile: Profile) {
        self.name = profile.name;
        self.username = profile.username;
        self.avatar_url = profile.avatar;
    }
}

impl Maskable for Message {
    fn profile(&self) -> Profile {
        Profile {
            name: self.sender_name.clone(),
            username: self.sender_username.clone(),
            avatar: self.sender_avatar.clone(),
        }
    }

    fn set_profile(&mut self, profile: Profile) {
        self.sender_name = profile.name;
        self.sender_username = profile.username;
        self.sender_avatar = profile.avatar;
    }
}

impl Maskable for Notification {
    fn profile(&self) -> Profile {
        Profile {
            name: self.from_name.clone(),
            username: self.from_username.clone(),
            avatar: self.from_avatar.clone(),
        }
    }

    /// The text was rendered with the sender's name in front; that prefix
    /// is swapped along with the profile fields.
    fn set_profile(&mut self, profile: Profile) {
        if !self.from_name.is_empty() {
            if let Some(rest) = self.text.strip_prefix(self.from_name.as_str()) {
                self.text = format!("{}{rest}", profile.name);
            }
        }
        self.from_name = profile.name;
        self.from_username = profile.username;
        self.from_avatar = profile.avatar;
    }
}

macro_rules! authored_maskable {
    ($ty:ty) => {
        impl Maskable for $ty {
            fn profile(&self) -> Profile {
                Profile {
                    name: self.user_name.clone(),
                    username: self.username.clone(),
                    avatar: self.user_avatar.clone(),
                }
            }

            fn set_profile(&mut self, profile: Profile) {
                self.user_name = profile.name;
                self.username = profile.username;
                self.user_avatar = profile.avatar;
            }
        }
    };
}

authored_maskable!(Post);
authored_maskable!(Comment);
authored_maskable!(Reply);

/// Privileged handles and the rules that depend on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    owner_handle: String,
    restricted_handle: String,
    admin_handles: BTreeSet<String>,
}

impl AccessPolicy {
    pub fn new(owner_handle: &str, restricted_handle: &str) -> Self {
        Self {
            owner_handle: normalize_username(owner_handle),
            restricted_handle: normalize_username(restricted_handle),
            admin_handles: BTreeSet::new(),
        }
    }

    pub fn with_admins<I, S>(mut self, admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.admin_handles = admins
            .into_iter()
            .map(|a| normalize_username(a.as_ref()))
            .filter(|a| !a.is_empty())
            .collect();
        self
    }

    pub fn owner_handle(&self) -> &str {
        &self.owner_handle
    }

    pub fn restricted_handle(&self) -> &str {
        &self.restricted_handle
    }

    /// Resolve the role a username carries.
    pub fn role_for(&self, username: &str) -> Role {
        let username = normalize_username(username);
        if username.is_empty() {
            Role::Member
        } else if username == self.owner_handle {
            Role::Owner
        } else if username == self.restricted_handle {
            Role::Restricted
        } else if self.admin_handles.contains(&username) {
            Role::Admin
        } else {
            Role::Member
        }
    }

    /// Whether the viewer may see the restricted identity unmasked.
    pub fn can_view_restricted(&self, viewer_username: &str) -> bool {
        matches!(
            self.role_for(viewer_username),
            Role::Owner | Role::Restricted
        )
    }

    pub fn mask_identity(&self, viewer_username: &str, subject: Profile) -> Profile {
        if self.role_for(&subject.username) == Role::Restricted
            && !self.can_view_restricted(viewer_username)
        {
            masked_profile()
        } else {
            subject
        }
    }

    /// Mask a record's author for the given viewer.
    pub fn mask<T: Maskable>(&self, viewer_username: &str, mut subject: T) -> T {
        let profile = subject.profile();
        let shown = self.mask_identity(viewer_username, profile.clone());
        if shown != profile {
            subject.set_profile(shown);
        }
        subject
    }

    /// Mask a post together with every comment and reply under it.
    pub fn mask_post(&self, viewer_username: &str, post: Post) -> Post {
        let mut post = self.mask(viewer_username, post);
        for comment in post.comments.values_mut() {
            let masked = self.mask(viewer_username, comment.clone());
            *comment = masked;
            for reply in comment.replies.values_mut() {
                let masked = self.mask(viewer_username, reply.clone());
                *reply = masked;
            }
        }
        post
    }

    /// Re-resolve a stored user's role from its current username.
    pub fn resolve(&self, mut user: User) -> User {
        user.role = self.role_for(&user.username);
        user
    }

    pub fn ensure_moderator(&self, username: &str) -> Result<Role, SocialError> {
        let role = self.role_for(username);
        if role.can_moderate() {
            Ok(role)
        } else {
            Err(SocialError::Unauthorized(format!(
                "@{username} may not moderate"
            )))
        }
    }
}

/// Reject writes from a locked account.
pub fn ensure_not_locked(user: Option<&User>, now: u64) -> Result<(), SocialError> {
    match user {
        Some(u) if u.is_locked_at(now) => Err(SocialError::Unauthorized(format!(
            "@{} is locked until {}",
            u.username,
            u.locked_until.unwrap_or_default()
        ))),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Confirmation and passcode gate
// ---------------------------------------------------------------------------

/// Interactive gate consulted before destructive relationship changes.
pub trait Prompt {
    /// Ask the user to confirm an action.
    fn confirm(&mut self, question: &str) -> bool;
    /// Ask the user for their 4-digit passcode.  `None` means they declined.
    fn passcode(&mut self) -> Option<String>;
}

/// A prompt with answers supplied up front, e.g. from a request body.
#[derive(Debug, Clone, Default)]
pub struct PresetPrompt {
    pub confirmed: bool,
    pub passcode: Option<String>,
}

impl PresetPrompt {
    pub fn confirmed() -> Self {
        Self {
            confirmed: true,
            passcode: None,
        }
    }

    pub fn with_passcode(mut self, passcode: impl Into<String>) -> Self {
        self.passcode = Some(passcode.into());
        self
    }
}

impl Prompt for PresetPrompt {
    fn confirm(&mut self, _question: &str) -> bool {
        self.confirmed
    }

    fn passcode(&mut self) -> Option<String> {
        self.passcode.clone()
    }
}

pub fn validate_passcode(passcode: &str) -> Result<(), SocialError> {
    if passcode.len() == 4 && passcode.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(SocialError::Validation(
            "passcode must be exactly 4 digits".to_string(),
        ))
    }
}

/// Digest stored in `chatPasscode`.  Salted with the user id so equal
/// passcodes do not produce equal digests.
pub fn hash_passcode(user_id: &str, passcode: &str) -> String {
    let digest = Sha256::digest(format!("{user_id}:{passcode}").as_bytes());
    hex::encode(digest)
}

/// If the user has a passcode, prompt for it and compare.  Users without
/// one pass straight through.
pub fn verify_passcode(user: &User, prompt: &mut dyn Prompt) -> Result<(), SocialError> {
    let Some(expected) = &user.chat_passcode else {
        return Ok(());
    };
    let entered = prompt
        .passcode()
        .ok_or_else(|| SocialError::Unauthorized("passcode required".to_string()))?;
    if hash_passcode(&user.id, entered.trim()) == *expected {
        Ok(())
    } else {
        Err(SocialError::Unauthorized("incorrect passcode".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn policy() -> AccessPolicy {
        AccessPolicy::new("owner", "hidden").with_admins(["Mod"])
    }

    fn user(username: &str) -> User {
        serde_json::from_value(json!({
            "id": format!("id-{username}"),
            "name": username.to_uppercase(),
            "username": username,
            "avatarUrl": "https://img/x.png"
        }))
        .unwrap()
    }

    #[test]
    fn roles_resolve_from_handles() {
        let p = policy();
        assert_eq!(p.role_for("OWNER"), Role::Owner);
        assert_eq!(p.role_for("hidden"), Role::Restricted);
        assert_eq!(p.role_for("mod"), Role::Admin);
        assert_eq!(p.role_for("guest123"), Role::Member);
    }

    #[test]
    fn restricted_identity_is_masked_for_members() {
        let p = policy();
        let masked = p.mask("guest123", user("hidden"));
        assert_eq!(masked.username, MASKED_USERNAME);
        assert_eq!(masked.name, MASKED_NAME);
        assert_eq!(masked.avatar_url, None);
        assert_eq!(masked.id, "id-hidden");
    }

    #[test]
    fn owner_and_restricted_see_real_profile() {
        let p = policy();
        assert_eq!(p.mask("owner", user("hidden")).username, "hidden");
        assert_eq!(p.mask("hidden", user("hidden")).username, "hidden");
        // Admins are not cleared for the restricted identity.
        assert_eq!(p.mask("mod", user("hidden")).username, MASKED_USERNAME);
    }

    #[test]
    fn other_users_are_never_masked() {
        let p = policy();
        assert_eq!(p.mask("guest123", user("bob")), user("bob"));
    }

    #[test]
    fn notification_sender_and_text_are_masked() {
        let p = policy();
        let n: Notification = serde_json::from_value(json!({
            "type": "follow",
            "fromId": "id-hidden",
            "fromName": "Real Name",
            "fromUsername": "hidden",
            "fromAvatar": "https://img/h.png",
            "text": "Real Name started following you",
            "timestamp": 1
        }))
        .unwrap();
        let masked = p.mask("guest123", n.clone());
        assert_eq!(masked.from_name, MASKED_NAME);
        assert_eq!(masked.from_username, MASKED_USERNAME);
        assert_eq!(masked.from_avatar, None);
        assert_eq!(masked.text, format!("{MASKED_NAME} started following you"));
        assert_eq!(masked.from_id, "id-hidden");
        assert_eq!(p.mask("owner", n.clone()), n);
    }

    #[test]
    fn passcode_gate() {
        let mut u = user("ada");
        let mut prompt = PresetPrompt::default();
        assert!(verify_passcode(&u, &mut prompt).is_ok());

        u.chat_passcode = Some(hash_passcode(&u.id, "1234"));
        assert!(matches!(
            verify_passcode(&u, &mut prompt),
            Err(SocialError::Unauthorized(_))
        ));
        let mut wrong = PresetPrompt::confirmed().with_passcode("4321");
        assert!(verify_passcode(&u, &mut wrong).is_err());
        let mut right = PresetPrompt::confirmed().with_passcode("1234");
        assert!(verify_passcode(&u, &mut right).is_ok());
    }

    #[test]
    fn passcode_format() {
        assert!(validate_passcode("0420").is_ok());
        assert!(validate_passcode("420").is_err());
        assert!(validate_passcode("12a4").is_err());
    }

    #[test]
    fn locked_accounts_are_rejected() {
        let mut u = user("ada");
        assert!(ensure_not_locked(Some(&u), 10).is_ok());
        u.locked_until = Some(20);
        assert!(ensure_not_locked(Some(&u), 10).is_err());
        assert!(ensure_not_locked(None, 10).is_ok());
    }
}
