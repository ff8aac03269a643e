//! Fakes shared by the crate's tests.

use async_trait::async_trait;
use rafflekit_platform_access::{Role, SessionGrant, Token, UserProfile};
use reqwest::header::AUTHORIZATION;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{RefreshError, TransportError};
use crate::refresh::{RefreshClient, RefreshedTokens};
use crate::transport::{ApiRequest, RawResponse, Transport};

type Handler = Box<dyn Fn(&ApiRequest) -> Result<RawResponse, TransportError> + Send + Sync>;

/// Transport answering from a closure and recording every request.
pub struct ScriptedTransport {
    handler: Handler,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// A transport whose every request fails with a connect error.
    pub fn failing() -> Arc<Self> {
        Self::new(|_| {
            Err(TransportError::Connect {
                reason: "connection refused".to_string(),
            })
        })
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path() == path)
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(request)
    }
}

/// The bearer token a request carries, if any.
pub fn bearer(request: &ApiRequest) -> Option<String> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Answers 200 to requests carrying `valid`, 401 to everything else.
pub fn accepts_only(valid: &'static str) -> Arc<ScriptedTransport> {
    ScriptedTransport::new(move |request| {
        if bearer(request).as_deref() == Some(valid) {
            Ok(RawResponse::json(200, &serde_json::json!({"ok": true})))
        } else {
            Ok(RawResponse::new(401, r#"{"message":"token expired"}"#))
        }
    })
}

type RefreshScript = Box<dyn Fn(usize) -> Result<RefreshedTokens, RefreshError> + Send + Sync>;

/// Refresh client counting its calls, with an optional delay before answering.
pub struct CountingRefresher {
    calls: AtomicUsize,
    delay: Duration,
    script: RefreshScript,
}

impl CountingRefresher {
    pub fn new<F>(delay: Duration, script: F) -> Arc<Self>
    where
        F: Fn(usize) -> Result<RefreshedTokens, RefreshError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            delay,
            script: Box::new(script),
        })
    }

    /// Always issues `access`, keeping the refresh token.
    pub fn issuing(access: &'static str, delay: Duration) -> Arc<Self> {
        Self::new(delay, move |_| Ok(RefreshedTokens::access_only(access)))
    }

    pub fn failing_with(error: RefreshError) -> Arc<Self> {
        Self::new(Duration::ZERO, move |_| Err(error.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RefreshClient for CountingRefresher {
    async fn refresh(&self, _refresh_token: &Token) -> Result<RefreshedTokens, RefreshError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.script)(call)
    }
}

pub fn profile(id: &str, role: Role) -> UserProfile {
    UserProfile::new(id, format!("user{id}@example.com"), role)
}

pub fn grant(access: &str, refresh: Option<&str>, role: Role) -> SessionGrant {
    SessionGrant::new(
        Token::new(access),
        refresh.map(Token::new),
        profile("1", role),
    )
}
