//! Error types for the platform-access crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `AuthenticationError`: failures establishing or keeping a session
//! - `AuthorizationError`: role-gate denials

use std::fmt;

use crate::role::{Role, RoleSet};

/// Errors from authentication operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// The API refused the submitted credentials or code.
    InvalidCredentials { status: u16, message: Option<String> },
    /// The API could not be reached.
    Network { reason: String },
    /// The API answered with a body the client could not use.
    MalformedResponse { reason: String },
    /// Session material could not be persisted or cleared.
    Storage { reason: String },
    /// The API returned an unexpected status.
    UnexpectedStatus { status: u16 },
    /// There is no signed-in user for an operation that needs one.
    NotSignedIn,
    /// The request could not be assembled.
    InvalidRequest { reason: String },
}

impl fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials { status, message } => match message {
                Some(message) => write!(f, "credentials rejected ({status}): {message}"),
                None => write!(f, "credentials rejected ({status})"),
            },
            Self::Network { reason } => write!(f, "network error: {reason}"),
            Self::MalformedResponse { reason } => {
                write!(f, "malformed response: {reason}")
            }
            Self::Storage { reason } => write!(f, "session storage error: {reason}"),
            Self::UnexpectedStatus { status } => {
                write!(f, "unexpected response status: {status}")
            }
            Self::NotSignedIn => write!(f, "no user is signed in"),
            Self::InvalidRequest { reason } => write!(f, "invalid request: {reason}"),
        }
    }
}

impl std::error::Error for AuthenticationError {}

/// Errors from role-gate checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    /// No session exists; the caller should send the user to log in.
    NotAuthenticated { return_to: String },
    /// A session exists but its role is not permitted.
    Forbidden { required: RoleSet, actual: Role },
}

impl fmt::Display for AuthorizationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAuthenticated { return_to } => {
                write!(f, "not authenticated (requested {return_to})")
            }
            Self::Forbidden { required, actual } => {
                write!(f, "role {actual} is not one of {required}")
            }
        }
    }
}

impl std::error::Error for AuthorizationError {}
