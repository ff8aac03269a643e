//! Named storage slots for session material.

use std::fmt;

/// A named slot in the persisted session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Short-lived access token.
    Access,
    /// Longer-lived refresh token.
    Refresh,
    /// JSON-encoded user profile.
    User,
    /// The "remember me" choice made at login.
    RememberFlag,
}

impl Slot {
    /// Every slot, in the order a durable session is written.
    ///
    /// Refresh precedes access: a crash between the two leaves a record
    /// without an access token, which forces a re-login instead of trusting
    /// a stale token.
    pub const ALL: [Slot; 4] = [Slot::RememberFlag, Slot::Refresh, Slot::Access, Slot::User];

    /// Key used in the current storage layout.
    #[must_use]
    pub fn key(&self) -> &'static str {
        match self {
            Self::Access => "access_token",
            Self::Refresh => "refresh_token",
            Self::User => "user",
            Self::RememberFlag => "remember_me",
        }
    }

    /// Key used by older builds, which kept everything in plaintext storage.
    #[must_use]
    pub fn legacy_key(&self) -> &'static str {
        match self {
            Self::Access => "token",
            Self::Refresh => "refreshToken",
            Self::User => "user",
            Self::RememberFlag => "rememberMe",
        }
    }

    /// Returns true for slots that must only live in the secure store.
    #[must_use]
    pub fn is_sensitive(&self) -> bool {
        !matches!(self, Self::RememberFlag)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_is_written_before_access() {
        let refresh = Slot::ALL.iter().position(|s| *s == Slot::Refresh);
        let access = Slot::ALL.iter().position(|s| *s == Slot::Access);
        assert!(refresh < access);
    }

    #[test]
    fn only_remember_flag_is_plaintext() {
        let plaintext: Vec<Slot> = Slot::ALL.into_iter().filter(|s| !s.is_sensitive()).collect();
        assert_eq!(plaintext, vec![Slot::RememberFlag]);
    }
}
