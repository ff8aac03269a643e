//! Token refresh.
//!
//! [`RefreshClient`] exchanges a refresh token for a new access token. It is
//! called only by the gateway's coalescer and goes straight to the transport,
//! so a refresh can never itself trigger a refresh.

use async_trait::async_trait;
use rafflekit_platform_access::{Token, UserProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::RefreshError;
use crate::response::{ApiResponse, unwrap_envelope};
use crate::transport::{ApiRequest, Transport};

/// Refresh endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Tokens issued by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedTokens {
    pub access_token: Token,
    /// `None` keeps the current refresh token.
    pub refresh_token: Option<Token>,
    /// The server's current view of the user, if it sent one.
    pub user: Option<UserProfile>,
}

impl RefreshedTokens {
    /// Creates a result carrying only an access token.
    #[must_use]
    pub fn access_only(access_token: impl Into<Token>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            user: None,
        }
    }
}

/// Exchanges refresh tokens for access tokens.
#[async_trait]
pub trait RefreshClient: Send + Sync {
    /// Performs one refresh.
    ///
    /// # Errors
    ///
    /// Returns [`RefreshError::Rejected`] if the server refuses the token and
    /// another variant for every failure that says nothing about its validity.
    async fn refresh(&self, refresh_token: &Token) -> Result<RefreshedTokens, RefreshError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    #[serde(default)]
    user: Option<UserProfile>,
}

/// [`RefreshClient`] that POSTs to [`REFRESH_PATH`].
#[derive(Clone)]
pub struct HttpRefreshClient {
    transport: Arc<dyn Transport>,
}

impl HttpRefreshClient {
    /// Creates a client over an unauthenticated transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl RefreshClient for HttpRefreshClient {
    async fn refresh(&self, refresh_token: &Token) -> Result<RefreshedTokens, RefreshError> {
        let request = ApiRequest::post(REFRESH_PATH)
            .with_json(&RefreshBody {
                refresh_token: refresh_token.expose(),
            })
            .map_err(|e| RefreshError::Malformed {
                reason: e.to_string(),
            })?;

        let raw = self
            .transport
            .send(&request)
            .await
            .map_err(|e| RefreshError::Network {
                reason: e.to_string(),
            })?;

        let response = ApiResponse::from_raw(raw);
        match response.status() {
            200..=299 => parse_payload(&response),
            status @ 400..=499 => {
                debug!(status, "refresh token rejected");
                Err(RefreshError::Rejected { status })
            }
            status => {
                warn!(status, "refresh endpoint failed");
                Err(RefreshError::ServerError { status })
            }
        }
    }
}

fn parse_payload(response: &ApiResponse) -> Result<RefreshedTokens, RefreshError> {
    let Some(body) = response.body() else {
        return Err(RefreshError::Malformed {
            reason: "empty body".to_string(),
        });
    };

    let payload = RefreshPayload::deserialize(unwrap_envelope(body)).map_err(|e| {
        RefreshError::Malformed {
            reason: e.to_string(),
        }
    })?;

    let access_token = payload
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RefreshError::Malformed {
            reason: "missing accessToken".to_string(),
        })?;

    Ok(RefreshedTokens {
        access_token: Token::new(access_token),
        refresh_token: payload
            .refresh_token
            .filter(|t| !t.is_empty())
            .map(Token::new),
        user: payload.user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedTransport;
    use crate::transport::RawResponse;
    use rafflekit_platform_access::Role;
    use serde_json::json;

    fn client(transport: &Arc<ScriptedTransport>) -> HttpRefreshClient {
        HttpRefreshClient::new(transport.clone())
    }

    #[tokio::test]
    async fn posts_refresh_token_as_camel_case() {
        let transport = ScriptedTransport::new(|_| {
            Ok(RawResponse::json(200, &json!({"accessToken": "a2"})))
        });

        let tokens = client(&transport)
            .refresh(&Token::new("r1"))
            .await
            .unwrap();
        assert_eq!(tokens.access_token.expose(), "a2");
        assert!(tokens.refresh_token.is_none());

        let sent = transport.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].path(), REFRESH_PATH);
        let body: serde_json::Value =
            serde_json::from_slice(sent[0].body().expect("body")).expect("json");
        assert_eq!(body, json!({"refreshToken": "r1"}));
    }

    #[tokio::test]
    async fn rotated_refresh_token_and_user_are_returned() {
        let transport = ScriptedTransport::new(|_| {
            Ok(RawResponse::json(
                200,
                &json!({"data": {
                    "accessToken": "a2",
                    "refreshToken": "r2",
                    "user": {"id": 5, "email": "o@example.com", "role": "organizer"}
                }}),
            ))
        });

        let tokens = client(&transport)
            .refresh(&Token::new("r1"))
            .await
            .unwrap();
        assert_eq!(tokens.refresh_token.map(|t| t.expose().to_string()), Some("r2".to_string()));
        assert_eq!(tokens.user.map(|u| u.role()), Some(Role::Organizer));
    }

    #[tokio::test]
    async fn client_errors_are_rejections() {
        for status in [400, 401, 403] {
            let transport = ScriptedTransport::new(move |_| Ok(RawResponse::new(status, "{}")));
            let err = client(&transport)
                .refresh(&Token::new("r1"))
                .await
                .unwrap_err();
            assert_eq!(err, RefreshError::Rejected { status });
        }
    }

    #[tokio::test]
    async fn server_errors_are_not_rejections() {
        let transport = ScriptedTransport::new(|_| Ok(RawResponse::new(503, "")));
        let err = client(&transport)
            .refresh(&Token::new("r1"))
            .await
            .unwrap_err();
        assert!(!err.is_rejection());
    }

    #[tokio::test]
    async fn success_without_token_is_malformed() {
        let transport = ScriptedTransport::new(|_| Ok(RawResponse::json(200, &json!({"ok": true}))));
        let err = client(&transport)
            .refresh(&Token::new("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Malformed { .. }));
        assert!(!err.is_rejection());
    }

    #[tokio::test]
    async fn network_failure_is_not_a_rejection() {
        let transport = ScriptedTransport::failing();
        let err = client(&transport)
            .refresh(&Token::new("r1"))
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::Network { .. }));
    }
}
