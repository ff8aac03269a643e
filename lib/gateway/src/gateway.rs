//! The authenticated gateway.
//!
//! Every authenticated call goes through [`AuthenticatedGateway::request`]:
//!
//! 1. Attach `Authorization: Bearer <token>` when the session has a token.
//! 2. On a 401, renew the token and replay the original request exactly once.
//! 3. Surface every other status to the caller unchanged.
//!
//! Concurrent 401s share a single refresh. The refresh runs on its own task,
//! so a caller that stops waiting does not abandon it for the others.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use rafflekit_platform_access::Token;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::GatewayError;
use crate::manager::SessionManager;
use crate::refresh::RefreshClient;
use crate::response::ApiResponse;
use crate::transport::{ApiRequest, Transport};

/// Whether a request is on its first send or its one replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    FirstAttempt,
    Retried,
}

#[derive(Debug, Clone)]
enum RefreshOutcome {
    /// The session now holds this access token.
    Rotated(Token),
    /// The refresh token was refused and the session ended.
    Rejected,
    /// No new token; the session, if any, is unchanged.
    Unavailable,
}

type SharedRefresh = Shared<BoxFuture<'static, RefreshOutcome>>;

struct InFlight {
    epoch: u64,
    refresh: SharedRefresh,
}

struct GatewayInner {
    transport: Arc<dyn Transport>,
    sessions: Arc<SessionManager>,
    refresher: Arc<dyn RefreshClient>,
    in_flight: Mutex<Option<InFlight>>,
}

/// Sends requests with the session's credentials and renews them on 401.
#[derive(Clone)]
pub struct AuthenticatedGateway {
    inner: Arc<GatewayInner>,
}

impl std::fmt::Debug for AuthenticatedGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedGateway")
            .field("sessions", &self.inner.sessions)
            .finish_non_exhaustive()
    }
}

impl AuthenticatedGateway {
    /// Creates a gateway.
    ///
    /// `refresher` should talk to the transport directly, never through a
    /// gateway.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        sessions: Arc<SessionManager>,
        refresher: Arc<dyn RefreshClient>,
    ) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                transport,
                sessions,
                refresher,
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Returns the session manager this gateway reads credentials from.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.inner.sessions
    }

    /// Sends a GET.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedGateway::request`].
    pub async fn get(&self, path: &str) -> Result<ApiResponse, GatewayError> {
        self.request(ApiRequest::get(path)).await
    }

    /// Sends a POST with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedGateway::request`].
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<ApiResponse, GatewayError> {
        self.request(ApiRequest::post(path).with_json(body)?).await
    }

    /// Sends a PUT with a JSON body.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedGateway::request`].
    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<ApiResponse, GatewayError> {
        self.request(ApiRequest::put(path).with_json(body)?).await
    }

    /// Sends a DELETE.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatedGateway::request`].
    pub async fn delete(&self, path: &str) -> Result<ApiResponse, GatewayError> {
        self.request(ApiRequest::delete(path)).await
    }

    /// Sends `request` with the session's credentials.
    ///
    /// A 401 triggers one token renewal and one replay of the same request.
    /// If renewal is impossible or the replay is also refused, the 401 is
    /// returned as an ordinary response.
    ///
    /// # Errors
    ///
    /// Returns an error only if no HTTP response was received, or the request
    /// could not be assembled.
    #[instrument(skip(self, request), fields(method = %request.method(), path = request.path()))]
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, GatewayError> {
        self.inner.sessions.bootstrap().await;

        let session = self.inner.sessions.snapshot().await;
        let sent_epoch = session.epoch();
        let mut token = session.access_token().cloned();
        let mut attempt = Attempt::FirstAttempt;

        loop {
            let prepared = with_credentials(&request, token.as_ref())?;
            let raw = self.inner.transport.send(&prepared).await?;
            if raw.status != 401 {
                return Ok(ApiResponse::from_raw(raw));
            }

            match attempt {
                Attempt::Retried => {
                    debug!("replayed request still unauthorized");
                    return Ok(ApiResponse::from_raw(raw));
                }
                Attempt::FirstAttempt => {
                    match self.inner.renew(token.as_ref(), sent_epoch).await {
                        Some(renewed) => {
                            attempt = Attempt::Retried;
                            token = Some(renewed);
                        }
                        None => return Ok(ApiResponse::from_raw(raw)),
                    }
                }
            }
        }
    }
}

impl GatewayInner {
    /// Returns a token to replay with, refreshing if nobody has yet.
    async fn renew(self: &Arc<Self>, sent_with: Option<&Token>, sent_epoch: u64) -> Option<Token> {
        let refresh = {
            let mut in_flight = self.in_flight.lock().await;
            let session = self.sessions.snapshot().await;

            if session.epoch() != sent_epoch {
                debug!("session replaced since request was sent, not replaying");
                return None;
            }
            if session.access_token() != sent_with {
                debug!("token already rotated, replaying");
                return session.access_token().cloned();
            }
            let Some(refresh_token) = session.refresh_token().cloned() else {
                debug!("no refresh token, surfacing 401");
                return None;
            };

            let joinable = in_flight
                .as_ref()
                .filter(|current| current.epoch == sent_epoch && current.refresh.peek().is_none())
                .map(|current| current.refresh.clone());
            match joinable {
                Some(refresh) => {
                    debug!("joining in-flight refresh");
                    refresh
                }
                None => {
                    let refresh = self.start_refresh(refresh_token, sent_epoch);
                    *in_flight = Some(InFlight {
                        epoch: sent_epoch,
                        refresh: refresh.clone(),
                    });
                    refresh
                }
            }
        };

        match refresh.await {
            RefreshOutcome::Rotated(token) => Some(token),
            RefreshOutcome::Rejected | RefreshOutcome::Unavailable => None,
        }
    }

    fn start_refresh(self: &Arc<Self>, refresh_token: Token, epoch: u64) -> SharedRefresh {
        let inner = Arc::clone(self);
        let task = tokio::spawn(async move { inner.perform_refresh(&refresh_token, epoch).await });

        async move {
            task.await.unwrap_or_else(|e| {
                warn!(error = %e, "refresh task did not complete");
                RefreshOutcome::Unavailable
            })
        }
        .boxed()
        .shared()
    }

    async fn perform_refresh(&self, refresh_token: &Token, epoch: u64) -> RefreshOutcome {
        debug!(epoch, "refreshing access token");
        match self.refresher.refresh(refresh_token).await {
            Ok(tokens) => match self.sessions.rotate(epoch, tokens).await {
                Some(access) => RefreshOutcome::Rotated(access),
                None => RefreshOutcome::Unavailable,
            },
            Err(e) if e.is_rejection() => {
                warn!(error = %e, "refresh rejected, ending session");
                self.sessions.end_if_current(epoch).await;
                RefreshOutcome::Rejected
            }
            Err(e) => {
                warn!(error = %e, "refresh failed, keeping session");
                RefreshOutcome::Unavailable
            }
        }
    }
}

/// Clones `request` with the credential header set to `token`, or removed
/// when there is none.
fn with_credentials(request: &ApiRequest, token: Option<&Token>) -> Result<ApiRequest, GatewayError> {
    let mut prepared = request.clone();
    let needs_content_type =
        prepared.body().is_some() && !prepared.headers().contains_key(CONTENT_TYPE);

    let headers = prepared.headers_mut();
    match token {
        Some(token) => {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose())).map_err(
                |e| GatewayError::InvalidRequest {
                    reason: format!("access token is not a valid header value: {e}"),
                },
            )?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        None => {
            headers.remove(AUTHORIZATION);
        }
    }
    if needs_content_type {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    }
    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::{RefreshError, TransportError};
    use crate::refresh::RefreshedTokens;
    use crate::test_support::{CountingRefresher, ScriptedTransport, accepts_only, bearer, grant};
    use crate::transport::RawResponse;
    use rafflekit_platform_access::{PersistMode, Role};
    use rafflekit_token_store::TokenStore;
    use std::time::Duration;

    async fn signed_in(
        transport: &Arc<ScriptedTransport>,
        refresher: &Arc<CountingRefresher>,
        refresh_token: Option<&str>,
    ) -> (AuthenticatedGateway, Arc<SessionManager>) {
        let sessions = Arc::new(SessionManager::new(
            TokenStore::in_memory(),
            &SessionConfig::default(),
        ));
        sessions
            .establish(grant("a1", refresh_token, Role::User), PersistMode::Durable)
            .await;
        let gateway = AuthenticatedGateway::new(transport.clone(), sessions.clone(), refresher.clone());
        (gateway, sessions)
    }

    async fn token_of(sessions: &SessionManager) -> Option<String> {
        sessions.access_token().await.map(|t| t.expose().to_string())
    }

    #[tokio::test]
    async fn attaches_bearer_only_with_a_session() {
        let transport = ScriptedTransport::new(|_| Ok(RawResponse::new(200, "{}")));
        let refresher = CountingRefresher::issuing("a2", Duration::ZERO);
        let (gateway, sessions) = signed_in(&transport, &refresher, Some("r1")).await;

        gateway.get("/raffles").await.unwrap();
        sessions.end().await.unwrap();
        gateway.get("/raffles").await.unwrap();

        let sent = transport.requests();
        assert_eq!(bearer(&sent[0]).as_deref(), Some("a1"));
        assert_eq!(bearer(&sent[1]), None);
        assert!(sent[1].headers().get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn caller_authorization_is_replaced_by_session_token() {
        let transport = ScriptedTransport::new(|_| Ok(RawResponse::new(200, "{}")));
        let refresher = CountingRefresher::issuing("a2", Duration::ZERO);
        let (gateway, _sessions) = signed_in(&transport, &refresher, Some("r1")).await;

        let request = ApiRequest::get("/raffles")
            .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));
        gateway.request(request).await.unwrap();

        let sent = transport.requests();
        assert_eq!(sent[0].headers().get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(bearer(&sent[0]).as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn body_without_content_type_is_sent_as_json() {
        let transport = ScriptedTransport::new(|_| Ok(RawResponse::new(200, "{}")));
        let refresher = CountingRefresher::issuing("a2", Duration::ZERO);
        let (gateway, _sessions) = signed_in(&transport, &refresher, Some("r1")).await;

        gateway
            .request(ApiRequest::post("/raffles").with_body(r#"{"title":"Bike"}"#))
            .await
            .unwrap();
        gateway
            .request(
                ApiRequest::post("/uploads")
                    .with_header(CONTENT_TYPE, HeaderValue::from_static("multipart/form-data"))
                    .with_body("--boundary--"),
            )
            .await
            .unwrap();
        gateway.get("/raffles").await.unwrap();

        let sent = transport.requests();
        assert_eq!(
            sent[0].headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("application/json"))
        );
        assert_eq!(
            sent[1].headers().get(CONTENT_TYPE),
            Some(&HeaderValue::from_static("multipart/form-data"))
        );
        assert!(sent[2].headers().get(CONTENT_TYPE).is_none());
    }

    #[tokio::test]
    async fn unauthorized_refreshes_and_replays_once() {
        let transport = accepts_only("a2");
        let refresher = CountingRefresher::issuing("a2", Duration::ZERO);
        let (gateway, sessions) = signed_in(&transport, &refresher, Some("r1")).await;

        let response = gateway
            .post_json("/tickets", &serde_json::json!({"raffleId": 3, "quantity": 2}))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(refresher.calls(), 1);

        let sent = transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(bearer(&sent[1]).as_deref(), Some("a2"));
        assert_eq!(sent[0].body(), sent[1].body());
        assert_eq!(sent[0].method(), sent[1].method());
        assert_eq!(token_of(&sessions).await.as_deref(), Some("a2"));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_unauthorized_share_one_refresh() {
        let transport = accepts_only("a2");
        let refresher = CountingRefresher::issuing("a2", Duration::from_millis(100));
        let (gateway, _sessions) = signed_in(&transport, &refresher, Some("r1")).await;

        let (first, second, third) = tokio::join!(
            gateway.get("/me/tickets"),
            gateway.get("/me/tickets"),
            gateway.get("/raffles/7"),
        );

        assert_eq!(first.unwrap().status(), 200);
        assert_eq!(second.unwrap().status(), 200);
        assert_eq!(third.unwrap().status(), 200);
        assert_eq!(refresher.calls(), 1);
        assert_eq!(transport.requests().len(), 6);
    }

    #[tokio::test]
    async fn replayed_unauthorized_is_returned_without_looping() {
        let transport = ScriptedTransport::new(|_| Ok(RawResponse::new(401, "{}")));
        let refresher = CountingRefresher::issuing("a2", Duration::ZERO);
        let (gateway, sessions) = signed_in(&transport, &refresher, Some("r1")).await;

        let response = gateway.get("/admin/payments").await.unwrap();
        assert_eq!(response.status(), 401);
        assert_eq!(refresher.calls(), 1);
        assert_eq!(transport.requests().len(), 2);
        assert!(sessions.snapshot().await.is_authenticated());
    }

    #[tokio::test]
    async fn later_unauthorized_starts_a_new_refresh() {
        let transport = accepts_only("a3");
        let refresher = CountingRefresher::new(Duration::ZERO, |call| {
            Ok(RefreshedTokens::access_only(format!("a{}", call + 1)))
        });
        let (gateway, _sessions) = signed_in(&transport, &refresher, Some("r1")).await;

        assert_eq!(gateway.get("/raffles").await.unwrap().status(), 401);
        assert_eq!(gateway.get("/raffles").await.unwrap().status(), 200);
        assert_eq!(refresher.calls(), 2);
    }

    #[tokio::test]
    async fn rejected_refresh_ends_session() {
        let transport = ScriptedTransport::new(|_| Ok(RawResponse::new(401, "{}")));
        let refresher = CountingRefresher::failing_with(RefreshError::Rejected { status: 401 });
        let (gateway, sessions) = signed_in(&transport, &refresher, Some("r1")).await;

        let response = gateway.get("/me").await.unwrap();
        assert_eq!(response.status(), 401);
        assert!(!sessions.snapshot().await.is_authenticated());
        assert!(sessions.store().load_record().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_refresh_failure_keeps_session() {
        for error in [
            RefreshError::Network {
                reason: "offline".to_string(),
            },
            RefreshError::ServerError { status: 503 },
            RefreshError::Malformed {
                reason: "missing accessToken".to_string(),
            },
        ] {
            let transport = ScriptedTransport::new(|_| Ok(RawResponse::new(401, "{}")));
            let refresher = CountingRefresher::failing_with(error);
            let (gateway, sessions) = signed_in(&transport, &refresher, Some("r1")).await;

            assert_eq!(gateway.get("/me").await.unwrap().status(), 401);
            assert_eq!(token_of(&sessions).await.as_deref(), Some("a1"));
            assert!(sessions.store().remember_flag().await.unwrap());
        }
    }

    #[tokio::test]
    async fn no_refresh_token_surfaces_unauthorized() {
        let transport = ScriptedTransport::new(|_| Ok(RawResponse::new(401, "{}")));
        let refresher = CountingRefresher::issuing("a2", Duration::ZERO);
        let (gateway, _sessions) = signed_in(&transport, &refresher, None).await;

        assert_eq!(gateway.get("/me").await.unwrap().status(), 401);
        assert_eq!(refresher.calls(), 0);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn other_statuses_pass_through() {
        for status in [200, 204, 403, 404, 500] {
            let transport = ScriptedTransport::new(move |_| Ok(RawResponse::new(status, "")));
            let refresher = CountingRefresher::issuing("a2", Duration::ZERO);
            let (gateway, _sessions) = signed_in(&transport, &refresher, Some("r1")).await;

            assert_eq!(gateway.get("/x").await.unwrap().status(), status);
            assert_eq!(refresher.calls(), 0);
        }
    }

    #[tokio::test]
    async fn transport_failure_is_a_network_error() {
        let transport = ScriptedTransport::failing();
        let refresher = CountingRefresher::issuing("a2", Duration::ZERO);
        let (gateway, _sessions) = signed_in(&transport, &refresher, Some("r1")).await;

        let err = gateway.get("/x").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Network(TransportError::Connect { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_caller_does_not_cancel_refresh() {
        let transport = accepts_only("a2");
        let refresher = CountingRefresher::issuing("a2", Duration::from_millis(100));
        let (gateway, sessions) = signed_in(&transport, &refresher, Some("r1")).await;

        let caller = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.get("/me").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(refresher.calls(), 1);
        caller.abort();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(token_of(&sessions).await.as_deref(), Some("a2"));
    }

    #[tokio::test(start_paused = true)]
    async fn logout_during_refresh_discards_new_tokens() {
        let transport = ScriptedTransport::new(|_| Ok(RawResponse::new(401, "{}")));
        let refresher = CountingRefresher::issuing("a2", Duration::from_millis(100));
        let (gateway, sessions) = signed_in(&transport, &refresher, Some("r1")).await;

        let caller = {
            let gateway = gateway.clone();
            tokio::spawn(async move { gateway.get("/me").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        sessions.end().await.unwrap();

        let response = caller.await.unwrap().unwrap();
        assert_eq!(response.status(), 401);
        assert!(!sessions.snapshot().await.is_authenticated());
        assert!(sessions.store().load_record().await.unwrap().is_empty());
    }
}
