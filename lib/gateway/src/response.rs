//! Decoded API responses.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::error::ErrorKind;
use crate::transport::RawResponse;

/// Envelope keys some endpoints wrap their payload in.
const ENVELOPE_KEYS: [&str; 2] = ["data", "modules"];

/// An HTTP response with its body decoded as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    status: u16,
    body: Option<Value>,
    /// The body was non-empty but not valid JSON.
    malformed: bool,
}

impl ApiResponse {
    /// Decodes a raw response. An empty body decodes to `None`.
    #[must_use]
    pub fn from_raw(raw: RawResponse) -> Self {
        if raw.body.iter().all(u8::is_ascii_whitespace) {
            return Self {
                status: raw.status,
                body: None,
                malformed: false,
            };
        }

        match serde_json::from_slice(&raw.body) {
            Ok(body) => Self {
                status: raw.status,
                body: Some(body),
                malformed: false,
            },
            Err(e) => {
                debug!(status = raw.status, error = %e, "response body is not JSON");
                Self {
                    status: raw.status,
                    body: None,
                    malformed: true,
                }
            }
        }
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Consumes the response, returning the body.
    #[must_use]
    pub fn into_body(self) -> Option<Value> {
        self.body
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserializes the body into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no body or it does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone().unwrap_or(Value::Null))
    }

    /// Returns the server's `message` field, if any.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        let body = self.body.as_ref()?;
        body.get("message")
            .or_else(|| body.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Classifies the response. `None` means nothing went wrong.
    #[must_use]
    pub fn classify(&self) -> Option<ErrorKind> {
        match self.status {
            401 => Some(ErrorKind::Unauthorized),
            403 => Some(ErrorKind::Forbidden),
            _ if self.malformed => Some(ErrorKind::MalformedResponse),
            _ => None,
        }
    }
}

/// Returns the payload inside a `data` or `modules` envelope, or `value`
/// itself when it is not wrapped.
#[must_use]
pub fn unwrap_envelope(value: &Value) -> &Value {
    ENVELOPE_KEYS
        .iter()
        .find_map(|key| value.get(*key).filter(|inner| inner.is_object()))
        .unwrap_or(value)
}
