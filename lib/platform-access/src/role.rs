//! Role and role-set types for screen and action gating.
//!
//! Roles arrive from the API as free-form strings. They are parsed exactly
//! once, at the trust boundary, into the closed [`Role`] enumeration. Any
//! value the client does not recognize becomes [`Role::Unrecognized`], which
//! is the least-privileged role and is never contained in a [`RoleSet`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Marketplace role carried by an authenticated user.
///
/// The marketplace uses four levels of access:
/// - `User`: buys tickets and uploads payment receipts
/// - `Organizer`: runs their own raffles
/// - `Admin`: back-office review of raffles and payments
/// - `Superadmin`: platform configuration and admin management
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Role {
    /// Standard buyer account.
    User,
    /// Raffle organizer.
    Organizer,
    /// Back-office administrator.
    Admin,
    /// Platform superadministrator.
    Superadmin,
    /// A role value the client does not know. Matches nothing.
    #[default]
    Unrecognized,
}

impl Role {
    /// Every role the client knows how to gate on.
    pub const KNOWN: [Role; 4] = [Role::User, Role::Organizer, Role::Admin, Role::Superadmin];

    /// Parses a role claim, case-insensitively.
    ///
    /// Separators are ignored so `super_admin` and `Super-Admin` both parse to
    /// [`Role::Superadmin`]. Anything else, including the empty string, parses
    /// to [`Role::Unrecognized`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match normalized.as_str() {
            "user" => Self::User,
            "organizer" => Self::Organizer,
            "admin" => Self::Admin,
            "superadmin" => Self::Superadmin,
            _ => Self::Unrecognized,
        }
    }

    /// Returns the canonical wire name of this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Organizer => "organizer",
            Self::Admin => "admin",
            Self::Superadmin => "superadmin",
            Self::Unrecognized => "unrecognized",
        }
    }

    /// Returns true if this is one of the roles the client knows.
    #[must_use]
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by the strict [`FromStr`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole {
    /// The value that failed to parse.
    pub value: String,
}

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown role: {:?}", self.value)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    /// Strict parse for configuration and CLI input: unknown names fail.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Self::parse(s) {
            Self::Unrecognized => Err(UnknownRole {
                value: s.to_string(),
            }),
            role => Ok(role),
        }
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Non-string claims (numbers, objects) are malformed, so least privilege.
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(value.as_str().map_or(Self::Unrecognized, Self::parse))
    }
}

/// A set of roles that are permitted to pass a gate.
///
/// A `RoleSet` never contains [`Role::Unrecognized`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RoleSet {
    roles: Vec<Role>,
}

impl RoleSet {
    /// Creates an empty role set (nobody passes).
    #[must_use]
    pub fn none() -> Self {
        Self { roles: Vec::new() }
    }

    /// Creates a role set from the given roles, dropping unrecognized entries.
    #[must_use]
    pub fn of(roles: &[Role]) -> Self {
        let mut set = Self::none();
        for role in roles {
            set.insert(*role);
        }
        set
    }

    /// Creates a role set from role names, e.g. from screen configuration.
    ///
    /// Unknown names are dropped rather than widening the set.
    #[must_use]
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let mut set = Self::none();
        for name in names {
            set.insert(Role::parse(name.as_ref()));
        }
        set
    }

    /// Any signed-in user with a recognized role.
    #[must_use]
    pub fn any_authenticated() -> Self {
        Self::of(&Role::KNOWN)
    }

    /// Admin back-office screens.
    #[must_use]
    pub fn back_office() -> Self {
        Self::of(&[Role::Admin, Role::Superadmin])
    }

    /// Organizer panel: organizers plus the back office.
    #[must_use]
    pub fn organizer_panel() -> Self {
        Self::of(&[Role::Organizer, Role::Admin, Role::Superadmin])
    }

    /// Superadmin-only screens.
    #[must_use]
    pub fn superadmin_only() -> Self {
        Self::of(&[Role::Superadmin])
    }

    fn insert(&mut self, role: Role) {
        if role.is_recognized() && !self.roles.contains(&role) {
            self.roles.push(role);
        }
    }

    /// Returns true if `role` passes this set.
    #[must_use]
    pub fn contains(&self, role: Role) -> bool {
        role.is_recognized() && self.roles.contains(&role)
    }

    /// Returns the roles as a slice.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Returns true if nobody can pass this set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.roles.iter().map(Role::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
