//! Session model and role-based access control for rafflekit clients.
//!
//! This crate provides:
//! - Marketplace roles (`Role`, `RoleSet`) parsed once at the trust boundary
//! - The user profile and its editable fields (`UserProfile`, `ProfileUpdate`)
//! - The in-memory session (`Session`, `SessionGrant`, `Token`, `PersistMode`)
//! - The role gate in front of protected screens (`RoleGate`)
//!
//! # Example
//!
//! ```
//! use rafflekit_platform_access::{
//!     GateDecision, PersistMode, Role, RoleGate, RoleSet, Session, SessionGrant, Token,
//!     UserProfile,
//! };
//!
//! let user = UserProfile::new("42", "ana@example.com", Role::parse("Admin"));
//! let session = Session::authenticated(
//!     SessionGrant::new(Token::new("access"), Some(Token::new("refresh")), user),
//!     PersistMode::from_remember(true),
//!     1,
//! );
//!
//! assert_eq!(
//!     RoleGate::authorize(&RoleSet::back_office(), session.role()),
//!     GateDecision::Allow
//! );
//! ```

pub mod error;
pub mod gate;
pub mod role;
pub mod session;
pub mod user;

// Re-export main types at crate root
pub use error::{AuthenticationError, AuthorizationError};
pub use gate::{Denial, DenialReason, GateDecision, GateOutcome, RoleGate};
pub use role::{Role, RoleSet, UnknownRole};
pub use session::{PersistMode, Session, SessionGrant, Token};
pub use user::{ProfileUpdate, UserProfile};
