//! Error types for the gateway crate.
//!
//! - `TransportError`: the request never produced an HTTP response
//! - `RefreshError`: a token refresh failed, classified by who is at fault
//! - `GatewayError`: the only error an authenticated request surfaces
//!
//! Every HTTP status, including 401 and 403, reaches callers as an
//! [`ApiResponse`](crate::response::ApiResponse). [`ErrorKind`] is the
//! taxonomy callers branch on when they need to tell failures apart.

use std::fmt;

/// Failure classes a caller can see from an API interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request failed before an HTTP response arrived.
    NetworkError,
    /// The refresh token was rejected and the session has been ended.
    AuthRejected,
    /// The API answered 401.
    Unauthorized,
    /// The API answered 403.
    Forbidden,
    /// The API answered with a body that is not valid JSON.
    MalformedResponse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NetworkError => "network error",
            Self::AuthRejected => "authentication rejected",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::MalformedResponse => "malformed response",
        };
        f.write_str(name)
    }
}

/// Errors from the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// No response within the request timeout.
    Timeout { url: String },
    /// The connection could not be established.
    Connect { reason: String },
    /// The request could not be built or sent.
    Request { reason: String },
    /// The response body could not be read.
    Body { reason: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { url } => write!(f, "request to {url} timed out"),
            Self::Connect { reason } => write!(f, "connection failed: {reason}"),
            Self::Request { reason } => write!(f, "request failed: {reason}"),
            Self::Body { reason } => write!(f, "failed to read response body: {reason}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Errors from a token refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The refresh endpoint could not be reached.
    Network { reason: String },
    /// The server refused the refresh token (4xx).
    Rejected { status: u16 },
    /// The server failed to answer (5xx).
    ServerError { status: u16 },
    /// The server answered 2xx without usable tokens.
    Malformed { reason: String },
}

impl RefreshError {
    /// Returns true if the refresh token itself was refused.
    ///
    /// Only a rejection ends the session. Every other failure leaves it intact.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// Returns the caller-visible failure class.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Rejected { .. } => ErrorKind::AuthRejected,
            Self::Malformed { .. } => ErrorKind::MalformedResponse,
            Self::Network { .. } | Self::ServerError { .. } => ErrorKind::NetworkError,
        }
    }
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network { reason } => write!(f, "refresh request failed: {reason}"),
            Self::Rejected { status } => write!(f, "refresh token rejected ({status})"),
            Self::ServerError { status } => write!(f, "refresh endpoint error ({status})"),
            Self::Malformed { reason } => write!(f, "malformed refresh response: {reason}"),
        }
    }
}

impl std::error::Error for RefreshError {}

/// Errors from an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The request failed before an HTTP response arrived.
    Network(TransportError),
    /// The request could not be assembled (body encoding, header value).
    InvalidRequest { reason: String },
}

impl GatewayError {
    /// Returns the caller-visible failure class.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::NetworkError
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(e) => write!(f, "network error: {e}"),
            Self::InvalidRequest { reason } => write!(f, "invalid request: {reason}"),
        }
    }
}

impl std::error::Error for GatewayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Network(e) => Some(e),
            Self::InvalidRequest { .. } => None,
        }
    }
}

impl From<TransportError> for GatewayError {
    fn from(e: TransportError) -> Self {
        Self::Network(e)
    }
}
