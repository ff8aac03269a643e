//! Role gate: the authorization checkpoint in front of protected screens.
//!
//! [`RoleGate::authorize`] is the pure decision. [`RoleGate::guard`] wraps it
//! for a navigation attempt and, on denial, produces an explicit [`Denial`]
//! that the surface renders with a way back to the login screen.

use tracing::debug;

use crate::error::AuthorizationError;
use crate::role::{Role, RoleSet};
use crate::session::Session;

/// Default login route.
const DEFAULT_LOGIN_PATH: &str = "/login";

/// Result of a role check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The current role may proceed.
    Allow,
    /// There is no session.
    DenyUnauthenticated,
    /// There is a session, but its role is not permitted.
    DenyForbidden,
}

impl GateDecision {
    /// Returns true for [`GateDecision::Allow`].
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Why a navigation was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    Unauthenticated,
    Forbidden,
}

/// The "not authorized" state a surface renders instead of protected content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denial {
    /// Why access was denied.
    pub reason: DenialReason,
    /// Human-readable message for the denial screen.
    pub message: String,
    /// Login route carrying the original destination.
    pub login_path: String,
    /// The destination the user asked for.
    pub return_to: String,
}

/// Outcome of guarding a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// Mount the protected content.
    Proceed,
    /// Render the denial instead.
    Denied(Denial),
}

impl GateOutcome {
    /// Converts the outcome into a `Result`, for callers that propagate denials.
    ///
    /// # Errors
    ///
    /// Returns the matching [`AuthorizationError`] on denial.
    pub fn into_result(self, required: &RoleSet, actual: Option<Role>) -> Result<(), AuthorizationError> {
        match self {
            Self::Proceed => Ok(()),
            Self::Denied(denial) => Err(match denial.reason {
                DenialReason::Unauthenticated => AuthorizationError::NotAuthenticated {
                    return_to: denial.return_to,
                },
                DenialReason::Forbidden => AuthorizationError::Forbidden {
                    required: required.clone(),
                    actual: actual.unwrap_or_default(),
                },
            }),
        }
    }
}

/// Gates screens and actions by role.
#[derive(Debug, Clone)]
pub struct RoleGate {
    login_path: String,
}

impl Default for RoleGate {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_PATH)
    }
}

impl RoleGate {
    /// Creates a gate that redirects denied users to `login_path`.
    #[must_use]
    pub fn new(login_path: impl Into<String>) -> Self {
        Self {
            login_path: login_path.into(),
        }
    }

    /// Decides whether `current` may pass `required`.
    ///
    /// `None` means there is no session.
    #[must_use]
    pub fn authorize(required: &RoleSet, current: Option<Role>) -> GateDecision {
        match current {
            None => GateDecision::DenyUnauthenticated,
            Some(role) if required.contains(role) => GateDecision::Allow,
            Some(_) => GateDecision::DenyForbidden,
        }
    }

    /// Like [`RoleGate::authorize`], parsing a raw role claim first.
    #[must_use]
    pub fn authorize_claim(required: &RoleSet, current: Option<&str>) -> GateDecision {
        Self::authorize(required, current.map(Role::parse))
    }

    /// Guards a navigation to `destination` for the given session.
    #[must_use]
    pub fn guard(&self, destination: &str, required: &RoleSet, session: &Session) -> GateOutcome {
        let decision = Self::authorize(required, session.role());
        debug!(destination, required = %required, ?decision, "role gate evaluated");

        match decision {
            GateDecision::Allow => GateOutcome::Proceed,
            GateDecision::DenyUnauthenticated => GateOutcome::Denied(Denial {
                reason: DenialReason::Unauthenticated,
                message: "Please sign in to continue.".to_string(),
                login_path: self.login_path_for(destination),
                return_to: destination.to_string(),
            }),
            GateDecision::DenyForbidden => GateOutcome::Denied(Denial {
                reason: DenialReason::Forbidden,
                message: "You are not authorized to view this page.".to_string(),
                login_path: self.login_path_for(destination),
                return_to: destination.to_string(),
            }),
        }
    }

    /// Returns the login route that brings the user back to `destination`.
    #[must_use]
    pub fn login_path_for(&self, destination: &str) -> String {
        format!(
            "{}?next={}",
            self.login_path,
            urlencoding::encode(destination)
        )
    }
}
