//! Error type for CLI commands.

use std::fmt;

/// Errors from running a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config { reason: String },
    /// The HTTP client could not be built.
    Transport { reason: String },
    /// An account operation failed.
    Authentication { reason: String },
    /// An API request failed before a response arrived.
    Request { reason: String },
    /// A command-line value is unusable.
    InvalidArgument { reason: String },
    /// The command needs a signed-in user.
    NotSignedIn,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "configuration error: {reason}"),
            Self::Transport { reason } => write!(f, "cannot create HTTP client: {reason}"),
            Self::Authentication { reason } => write!(f, "{reason}"),
            Self::Request { reason } => write!(f, "request failed: {reason}"),
            Self::InvalidArgument { reason } => write!(f, "invalid argument: {reason}"),
            Self::NotSignedIn => write!(f, "not signed in; run `rafflekit login --remember` first"),
        }
    }
}

impl std::error::Error for CliError {}
