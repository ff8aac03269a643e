//! Configuration for the gateway layer.
//!
//! These structs are composed into the client's top-level configuration and
//! loaded via the `config` crate. Every field except the API base URL has a
//! default.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL every request path is joined onto (e.g. "https://api.example.com/v1").
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_request_timeout_seconds() -> u64 {
    15
}

impl ApiConfig {
    /// Creates a configuration with the default timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }

    /// Returns the request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Upper bound on startup rehydration, in milliseconds.
    /// Expiry starts the process anonymous.
    #[serde(default = "default_bootstrap_timeout_ms")]
    pub bootstrap_timeout_ms: u64,

    /// Login route denied navigations are sent to.
    #[serde(default = "default_login_path")]
    pub login_path: String,
}

fn default_bootstrap_timeout_ms() -> u64 {
    3000
}

fn default_login_path() -> String {
    "/login".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bootstrap_timeout_ms: default_bootstrap_timeout_ms(),
            login_path: default_login_path(),
        }
    }
}

impl SessionConfig {
    /// Returns the bootstrap timeout.
    #[must_use]
    pub fn bootstrap_timeout(&self) -> Duration {
        Duration::from_millis(self.bootstrap_timeout_ms)
    }
}

/// What module visibility falls back to when the flag service cannot answer.
///
/// `FailOpen` shows everything: an unreachable flag service silently grants
/// default visibility. `FailClosed` hides everything instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityPolicy {
    #[default]
    FailOpen,
    FailClosed,
}

impl VisibilityPolicy {
    /// Visibility used for every key when the map could not be fetched.
    #[must_use]
    pub fn fallback_visible(&self) -> bool {
        matches!(self, Self::FailOpen)
    }
}

/// Module visibility configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModulesConfig {
    #[serde(default)]
    pub policy: VisibilityPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_config_has_correct_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.bootstrap_timeout(), Duration::from_secs(3));
        assert_eq!(config.login_path, "/login");
    }

    #[test]
    fn api_config_default_timeout() {
        let config: ApiConfig =
            serde_json::from_str(r#"{"base_url": "https://api.example.com"}"#).expect("deserialize");
        assert_eq!(config.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn visibility_policy_defaults_to_fail_open() {
        let config = ModulesConfig::default();
        assert_eq!(config.policy, VisibilityPolicy::FailOpen);
        assert!(config.policy.fallback_visible());

        let closed: VisibilityPolicy = serde_json::from_str("\"fail_closed\"").expect("deserialize");
        assert!(!closed.fallback_visible());
    }
}
