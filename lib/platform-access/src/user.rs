//! User profile type and profile updates.
//!
//! The profile is the identity half of a session. It is issued by the API at
//! login and may later be edited by the user, but only through
//! [`ProfileUpdate`], which cannot express a change of role or identifier.

use rafflekit_core::UserId;
use serde::{Deserialize, Serialize};

use crate::role::Role;

/// The signed-in user's profile as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// API-issued user ID.
    id: UserId,
    /// Account email address.
    email: String,
    /// Marketplace role. Missing or malformed values are least-privileged.
    #[serde(default)]
    role: Role,
    /// Display name, if the user has set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    /// Contact phone, used for manual-payment follow-up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
}

impl UserProfile {
    /// Creates a profile with no optional fields set.
    #[must_use]
    pub fn new(id: impl Into<UserId>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            role,
            name: None,
            phone: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Sets the phone number.
    #[must_use]
    pub fn with_phone(mut self, phone: Option<String>) -> Self {
        self.phone = phone;
        self
    }

    /// Returns the user ID.
    #[must_use]
    pub fn id(&self) -> &UserId {
        &self.id
    }

    /// Returns the email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the display name, if set.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns the phone number, if set.
    #[must_use]
    pub fn phone(&self) -> Option<&str> {
        self.phone.as_deref()
    }

    /// Applies a profile update. Role and ID are untouched.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(email) = &update.email {
            self.email.clone_from(email);
        }
        if let Some(name) = &update.name {
            self.name = Some(name.clone());
        }
        if let Some(phone) = &update.phone {
            self.phone = Some(phone.clone());
        }
    }

    /// Merges the editable fields of a profile echoed back by the API.
    ///
    /// Used after a profile edit: the server's copy of the user fields wins,
    /// but role and ID stay as they were issued at login.
    pub fn merge_editable(&mut self, echoed: &UserProfile) {
        self.email.clone_from(&echoed.email);
        self.name.clone_from(&echoed.name);
        self.phone.clone_from(&echoed.phone);
    }
}

/// Editable profile fields.
///
/// `None` means "leave unchanged". There is no role field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl ProfileUpdate {
    /// Returns true if the update changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.phone.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buyer() -> UserProfile {
        UserProfile::new("7", "buyer@example.com", Role::User)
    }

    #[test]
    fn deserializes_api_shape() {
        let json = r#"{"id": 7, "email": "a@example.com", "role": "ADMIN", "name": "Ana"}"#;
        let user: UserProfile = serde_json::from_str(json).expect("deserialize");
        assert_eq!(user.id().as_str(), "7");
        assert_eq!(user.role(), Role::Admin);
        assert_eq!(user.name(), Some("Ana"));
        assert!(user.phone().is_none());
    }

    #[test]
    fn missing_role_is_unrecognized() {
        let json = r#"{"id": "x", "email": "a@example.com"}"#;
        let user: UserProfile = serde_json::from_str(json).expect("deserialize");
        assert_eq!(user.role(), Role::Unrecognized);
    }

    #[test]
    fn apply_changes_only_given_fields() {
        let mut user = buyer().with_name(Some("Old".to_string()));
        user.apply(&ProfileUpdate {
            phone: Some("555-0100".to_string()),
            ..ProfileUpdate::default()
        });
        assert_eq!(user.name(), Some("Old"));
        assert_eq!(user.phone(), Some("555-0100"));
        assert_eq!(user.email(), "buyer@example.com");
        assert_eq!(user.role(), Role::User);
    }

    #[test]
    fn merge_editable_keeps_role_and_id() {
        let mut user = buyer();
        let echoed = UserProfile::new("999", "new@example.com", Role::Superadmin)
            .with_name(Some("New".to_string()))
            .with_phone(Some("555-0199".to_string()));
        user.merge_editable(&echoed);
        assert_eq!(user.email(), "new@example.com");
        assert_eq!(user.name(), Some("New"));
        assert_eq!(user.phone(), Some("555-0199"));
        assert_eq!(user.role(), Role::User);
        assert_eq!(user.id().as_str(), "7");
    }

    #[test]
    fn empty_update() {
        assert!(ProfileUpdate::default().is_empty());
        let update = ProfileUpdate {
            name: Some("x".to_string()),
            ..ProfileUpdate::default()
        };
        assert!(!update.is_empty());
    }

    #[test]
    fn update_serializes_without_unset_fields() {
        let update = ProfileUpdate {
            name: Some("Ana".to_string()),
            ..ProfileUpdate::default()
        };
        let json = serde_json::to_value(&update).expect("serialize");
        assert_eq!(json, serde_json::json!({"name": "Ana"}));
    }
}
