//! Adapter from the external identity provider's session to an [`Actor`].
//!
//! The provider is the authority for who the caller is: its user id is the
//! immutable primary key for every record the actor writes.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_user_key, SocialError};

/// What the identity provider exposes for a signed-in session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentitySession {
    pub id: String,
    pub username: Option<String>,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
    pub image_url: Option<String>,
}

/// The identity every engine write is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl Actor {
    pub fn new(
        id: impl Into<String>,
        username: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            username: normalize_username(&username.into()),
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    /// Build an actor from a provider session.
    ///
    /// A session without a username gets `user_` plus the first eight
    /// characters of its id.  The display name falls back from full name to
    /// first name to username.
    pub fn from_session(session: &IdentitySession) -> Result<Self, SocialError> {
        let id = session.id.trim();
        if id.is_empty() {
            return Err(SocialError::Unauthorized(
                "session has no user id".to_string(),
            ));
        }
        ensure_user_key("user", id)?;

        let username = session
            .username
            .as_deref()
            .map(normalize_username)
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| {
                let prefix: String = id.chars().take(8).collect();
                format!("user_{}", prefix.to_lowercase())
            });

        let display_name = [&session.full_name, &session.first_name]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| username.clone());

        Ok(Self {
            id: id.to_string(),
            username,
            display_name,
            avatar_url: session
                .image_url
                .clone()
                .filter(|u| !u.trim().is_empty()),
        })
    }
}

/// Usernames are compared and stored lowercase.
pub fn normalize_username(raw: &str) -> String {
    raw.trim().trim_start_matches('@').to_lowercase()
}
