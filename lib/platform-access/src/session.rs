//! The in-memory session.
//!
//! A session is either anonymous or holds a full set of credentials. The
//! credentials bundle the access token together with the user profile, so a
//! token without an identity (or an identity without a token) cannot be
//! represented.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::role::Role;
use crate::user::{ProfileUpdate, UserProfile};

/// An opaque bearer credential.
///
/// The value is only reachable through [`Token::expose`]; `Debug` redacts it.
pub struct Token(SecretString);

impl Token {
    /// Wraps a raw token value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    /// Returns the raw token value.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for Token {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Token {}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Token([REDACTED])")
    }
}

impl From<String> for Token {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Where session material may be written.
///
/// Decided once, at login, from the user's "remember me" choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistMode {
    /// Survives a process restart.
    Durable,
    /// Lives only as long as the process.
    #[default]
    Ephemeral,
}

impl PersistMode {
    /// Maps the "remember me" choice to a persistence mode.
    #[must_use]
    pub fn from_remember(remember: bool) -> Self {
        if remember {
            Self::Durable
        } else {
            Self::Ephemeral
        }
    }

    /// Returns true for [`PersistMode::Durable`].
    #[must_use]
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable)
    }
}

/// Credentials issued by a successful login, verification or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub access_token: Token,
    pub refresh_token: Option<Token>,
    pub user: UserProfile,
}

impl SessionGrant {
    /// Creates a grant.
    #[must_use]
    pub fn new(access_token: Token, refresh_token: Option<Token>, user: UserProfile) -> Self {
        Self {
            access_token,
            refresh_token,
            user,
        }
    }
}

/// Represents the process's single logical session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Present exactly when someone is signed in.
    credentials: Option<SessionGrant>,
    /// Fixed at login.
    persist_mode: PersistMode,
    /// Bumped by the session owner on every establish and destroy.
    epoch: u64,
    /// When the credentials were first issued in this process.
    established_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Creates an anonymous session.
    #[must_use]
    pub fn anonymous(epoch: u64) -> Self {
        Self {
            credentials: None,
            persist_mode: PersistMode::Ephemeral,
            epoch,
            established_at: None,
        }
    }

    /// Creates an authenticated session from a grant.
    #[must_use]
    pub fn authenticated(grant: SessionGrant, persist_mode: PersistMode, epoch: u64) -> Self {
        Self {
            credentials: Some(grant),
            persist_mode,
            epoch,
            established_at: Some(Utc::now()),
        }
    }

    /// Re-stamps the session with the owner's epoch.
    #[must_use]
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Returns true if a user is signed in.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    /// Returns the access token, if signed in.
    #[must_use]
    pub fn access_token(&self) -> Option<&Token> {
        self.credentials.as_ref().map(|c| &c.access_token)
    }

    /// Returns the refresh token, if signed in and one was issued.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&Token> {
        self.credentials
            .as_ref()
            .and_then(|c| c.refresh_token.as_ref())
    }

    /// Returns the signed-in user's profile.
    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.credentials.as_ref().map(|c| &c.user)
    }

    /// Returns the signed-in user's role.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.user().map(UserProfile::role)
    }

    /// Returns the persistence mode chosen at login.
    #[must_use]
    pub fn persist_mode(&self) -> PersistMode {
        self.persist_mode
    }

    /// Returns the session epoch.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns when the credentials were issued, if signed in.
    #[must_use]
    pub fn established_at(&self) -> Option<DateTime<Utc>> {
        self.established_at
    }

    /// Rotates tokens after a refresh.
    ///
    /// A missing `refresh_token` keeps the current one. Returns false (and
    /// changes nothing) on an anonymous session.
    pub fn rotate(&mut self, access_token: Token, refresh_token: Option<Token>) -> bool {
        let Some(credentials) = self.credentials.as_mut() else {
            return false;
        };
        credentials.access_token = access_token;
        if let Some(refresh_token) = refresh_token {
            credentials.refresh_token = Some(refresh_token);
        }
        true
    }

    /// Replaces the user with a server-restated profile for the same account.
    ///
    /// Returns false if anonymous or if the profile belongs to another user.
    pub fn restate_user(&mut self, user: UserProfile) -> bool {
        match self.credentials.as_mut() {
            Some(credentials) if credentials.user.id() == user.id() => {
                credentials.user = user;
                true
            }
            _ => false,
        }
    }

    /// Applies a profile edit to the signed-in user. Role and tokens are untouched.
    pub fn apply_profile_update(&mut self, update: &ProfileUpdate) -> bool {
        let Some(credentials) = self.credentials.as_mut() else {
            return false;
        };
        credentials.user.apply(update);
        true
    }

    /// Merges an edited profile echoed by the API into the signed-in user.
    pub fn merge_profile(&mut self, echoed: &UserProfile) -> bool {
        let Some(credentials) = self.credentials.as_mut() else {
            return false;
        };
        credentials.user.merge_editable(echoed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant() -> SessionGrant {
        SessionGrant::new(
            Token::new("access_1"),
            Some(Token::new("refresh_1")),
            UserProfile::new("1", "a@example.com", Role::Organizer),
        )
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = Token::new("super-secret");
        let debug = format!("{token:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn session_debug_does_not_leak_tokens() {
        let session = Session::authenticated(grant(), PersistMode::Durable, 1);
        let debug = format!("{session:?}");
        assert!(!debug.contains("access_1"));
        assert!(!debug.contains("refresh_1"));
    }

    #[test]
    fn persist_mode_from_remember() {
        assert_eq!(PersistMode::from_remember(true), PersistMode::Durable);
        assert_eq!(PersistMode::from_remember(false), PersistMode::Ephemeral);
    }

    #[test]
    fn anonymous_session_has_nothing() {
        let session = Session::anonymous(0);
        assert!(!session.is_authenticated());
        assert!(session.access_token().is_none());
        assert!(session.refresh_token().is_none());
        assert!(session.user().is_none());
        assert!(session.role().is_none());
        assert!(session.established_at().is_none());
    }

    #[test]
    fn authenticated_session_exposes_credentials() {
        let session = Session::authenticated(grant(), PersistMode::Durable, 3);
        assert_eq!(session.access_token().map(Token::expose), Some("access_1"));
        assert_eq!(session.refresh_token().map(Token::expose), Some("refresh_1"));
        assert_eq!(session.role(), Some(Role::Organizer));
        assert_eq!(session.persist_mode(), PersistMode::Durable);
        assert_eq!(session.epoch(), 3);
    }

    #[test]
    fn rotate_keeps_refresh_when_not_reissued() {
        let mut session = Session::authenticated(grant(), PersistMode::Ephemeral, 1);
        assert!(session.rotate(Token::new("access_2"), None));
        assert_eq!(session.access_token().map(Token::expose), Some("access_2"));
        assert_eq!(session.refresh_token().map(Token::expose), Some("refresh_1"));

        assert!(session.rotate(Token::new("access_3"), Some(Token::new("refresh_3"))));
        assert_eq!(session.refresh_token().map(Token::expose), Some("refresh_3"));
    }

    #[test]
    fn rotate_on_anonymous_is_refused() {
        let mut session = Session::anonymous(0);
        assert!(!session.rotate(Token::new("x"), None));
        assert!(session.access_token().is_none());
    }

    #[test]
    fn restate_user_requires_same_account() {
        let mut session = Session::authenticated(grant(), PersistMode::Ephemeral, 1);
        let other = UserProfile::new("2", "b@example.com", Role::Superadmin);
        assert!(!session.restate_user(other));
        assert_eq!(session.role(), Some(Role::Organizer));

        let demoted = UserProfile::new("1", "a@example.com", Role::User);
        assert!(session.restate_user(demoted));
        assert_eq!(session.role(), Some(Role::User));
    }

    #[test]
    fn profile_update_leaves_tokens_and_role() {
        let mut session = Session::authenticated(grant(), PersistMode::Ephemeral, 1);
        let update = ProfileUpdate {
            name: Some("Org".to_string()),
            ..ProfileUpdate::default()
        };
        assert!(session.apply_profile_update(&update));
        assert_eq!(session.user().and_then(UserProfile::name), Some("Org"));
        assert_eq!(session.role(), Some(Role::Organizer));
        assert_eq!(session.access_token().map(Token::expose), Some("access_1"));
    }
}
