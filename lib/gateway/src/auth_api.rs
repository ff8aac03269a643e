//! Account endpoints: login, registration, two-factor, logout, profile.
//!
//! Credential exchanges (login, registration, verification) go straight to
//! the transport: a 401 there means wrong credentials, not an expired token.
//! Everything that acts on an existing session goes through the gateway.

use rafflekit_platform_access::{
    AuthenticationError, PersistMode, ProfileUpdate, Session, SessionGrant, Token, UserProfile,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::error::GatewayError;
use crate::gateway::AuthenticatedGateway;
use crate::manager::SessionManager;
use crate::response::{ApiResponse, unwrap_envelope};
use crate::transport::{ApiRequest, Transport};

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const VERIFY_PATH: &str = "/auth/verify";
pub const TWO_FACTOR_PATH: &str = "/auth/2fa/verify";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const PROFILE_PATH: &str = "/users/me";
pub const PUSH_TOKEN_PATH: &str = "/notifications/register";

/// A pending second factor issued by a password login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoFactorChallenge {
    pub email: String,
    /// Short-lived token binding the code to the password step.
    pub temp_token: Option<Token>,
}

/// Result of a password login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(Session),
    TwoFactorRequired(TwoFactorChallenge),
}

/// Result of a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Authenticated(Session),
    /// The account exists but must be confirmed with an emailed code.
    VerificationPending { email: String },
}

/// New-account details.
#[derive(Debug)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: SecretString,
    pub phone: Option<String>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterBody<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CodeBody<'a> {
    email: &'a str,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temp_token: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

#[derive(Serialize)]
struct PushBody<'a> {
    token: &'a str,
    platform: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserProfile>,
    #[serde(default, rename = "require2fa", alias = "requires2fa")]
    require_2fa: bool,
    temp_token: Option<String>,
}

impl AuthPayload {
    fn into_grant(self) -> Option<SessionGrant> {
        let access = self.access_token.filter(|t| !t.is_empty())?;
        let user = self.user?;
        Some(SessionGrant::new(
            Token::new(access),
            self.refresh_token.filter(|t| !t.is_empty()).map(Token::new),
            user,
        ))
    }
}

/// Client for the account endpoints.
#[derive(Clone)]
pub struct AuthApi {
    transport: Arc<dyn Transport>,
    gateway: AuthenticatedGateway,
}

impl AuthApi {
    /// Creates the client. `transport` must be the gateway's own transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, gateway: AuthenticatedGateway) -> Self {
        Self { transport, gateway }
    }

    fn sessions(&self) -> &Arc<SessionManager> {
        self.gateway.sessions()
    }

    /// Logs in with email and password.
    ///
    /// # Errors
    ///
    /// Returns an error if the credentials are refused, the API cannot be
    /// reached, or the response carries no usable session.
    #[instrument(skip(self, password))]
    pub async fn login(
        &self,
        email: &str,
        password: &SecretString,
        remember: bool,
    ) -> rafflekit_core::Result<LoginOutcome, AuthenticationError> {
        let body = LoginBody {
            email,
            password: password.expose_secret(),
        };
        let payload = self.exchange(LOGIN_PATH, &body).await?;

        if payload.require_2fa {
            info!("two-factor verification required");
            return Ok(LoginOutcome::TwoFactorRequired(TwoFactorChallenge {
                email: email.to_string(),
                temp_token: payload.temp_token.filter(|t| !t.is_empty()).map(Token::new),
            }));
        }

        Ok(LoginOutcome::Authenticated(
            self.establish(payload, remember).await?,
        ))
    }

    /// Registers a new account.
    ///
    /// # Errors
    ///
    /// Returns an error if the API refuses the registration or cannot be
    /// reached.
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(
        &self,
        registration: &Registration,
        remember: bool,
    ) -> rafflekit_core::Result<RegistrationOutcome, AuthenticationError> {
        let body = RegisterBody {
            name: &registration.name,
            email: &registration.email,
            password: registration.password.expose_secret(),
            phone: registration.phone.as_deref(),
        };
        let response = self.post_unauthenticated(REGISTER_PATH, &body).await?;
        check_status(&response)?;

        let grant = match response.body() {
            Some(_) => parse_payload(&response)?.into_grant(),
            None => None,
        };
        match grant {
            Some(grant) => Ok(RegistrationOutcome::Authenticated(
                self.sessions()
                    .establish(grant, PersistMode::from_remember(remember))
                    .await,
            )),
            None => {
                info!("registration accepted, verification pending");
                Ok(RegistrationOutcome::VerificationPending {
                    email: registration.email.clone(),
                })
            }
        }
    }

    /// Confirms a registration with the emailed code.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is refused or no session is issued.
    #[instrument(skip(self, code))]
    pub async fn verify_registration(
        &self,
        email: &str,
        code: &str,
        remember: bool,
    ) -> rafflekit_core::Result<Session, AuthenticationError> {
        let body = CodeBody {
            email,
            code,
            temp_token: None,
        };
        let payload = self.exchange(VERIFY_PATH, &body).await?;
        self.establish(payload, remember).await
    }

    /// Completes a login that required a second factor.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is refused or no session is issued.
    #[instrument(skip(self, challenge, code))]
    pub async fn verify_two_factor(
        &self,
        challenge: &TwoFactorChallenge,
        code: &str,
        remember: bool,
    ) -> rafflekit_core::Result<Session, AuthenticationError> {
        let body = CodeBody {
            email: &challenge.email,
            code,
            temp_token: challenge.temp_token.as_ref().map(Token::expose),
        };
        let payload = self.exchange(TWO_FACTOR_PATH, &body).await?;
        self.establish(payload, remember).await
    }

    /// Logs out.
    ///
    /// The server is told first, best-effort. The local session is ended
    /// however that goes.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage could not be fully cleared.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> rafflekit_core::Result<(), AuthenticationError> {
        let session = self.sessions().snapshot().await;
        if session.is_authenticated() {
            let body = LogoutBody {
                refresh_token: session.refresh_token().map(Token::expose),
            };
            match self.gateway.post_json(LOGOUT_PATH, &body).await {
                Ok(response) if response.is_success() => debug!("server session revoked"),
                Ok(response) => {
                    debug!(status = response.status(), "server refused logout, ending locally");
                }
                Err(e) => warn!(error = %e, "server logout failed, ending locally"),
            }
        }
        self.sessions().end().await
    }

    /// Saves profile edits and applies them to the session.
    ///
    /// Fields echoed back by the API win over the submitted ones. The role is
    /// never changed.
    ///
    /// # Errors
    ///
    /// Returns an error if nobody is signed in or the API refuses the edit.
    #[instrument(skip(self, update))]
    pub async fn update_profile(
        &self,
        update: &ProfileUpdate,
    ) -> rafflekit_core::Result<UserProfile, AuthenticationError> {
        if !self.sessions().snapshot().await.is_authenticated() {
            return Err(AuthenticationError::NotSignedIn.into());
        }

        let response = self
            .gateway
            .put_json(PROFILE_PATH, update)
            .await
            .map_err(from_gateway)?;
        check_session_status(&response)?;

        let echoed = response.body().and_then(|body| {
            let body = unwrap_envelope(body);
            UserProfile::deserialize(body.get("user").unwrap_or(body)).ok()
        });
        let applied = match &echoed {
            Some(profile) => self.sessions().merge_profile(profile).await,
            None => self.sessions().apply_profile_update(update).await,
        };
        if !applied {
            return Err(AuthenticationError::NotSignedIn.into());
        }

        self.sessions()
            .snapshot()
            .await
            .user()
            .cloned()
            .ok_or_else(|| AuthenticationError::NotSignedIn.into())
    }

    /// Registers a device push token for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if nobody is signed in or the API refuses the token.
    #[instrument(skip(self, token))]
    pub async fn register_push_token(
        &self,
        token: &str,
        platform: &str,
    ) -> rafflekit_core::Result<(), AuthenticationError> {
        let response = self
            .gateway
            .post_json(PUSH_TOKEN_PATH, &PushBody { token, platform })
            .await
            .map_err(from_gateway)?;
        check_session_status(&response)?;
        debug!("push token registered");
        Ok(())
    }

    async fn post_unauthenticated<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> rafflekit_core::Result<ApiResponse, AuthenticationError> {
        let request = ApiRequest::post(path)
            .with_json(body)
            .map_err(|e| AuthenticationError::InvalidRequest {
                reason: e.to_string(),
            })?;
        let raw = self
            .transport
            .send(&request)
            .await
            .map_err(|e| AuthenticationError::Network {
                reason: e.to_string(),
            })?;
        Ok(ApiResponse::from_raw(raw))
    }

    async fn exchange<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> rafflekit_core::Result<AuthPayload, AuthenticationError> {
        let response = self.post_unauthenticated(path, body).await?;
        check_status(&response)?;
        Ok(parse_payload(&response)?)
    }

    async fn establish(
        &self,
        payload: AuthPayload,
        remember: bool,
    ) -> rafflekit_core::Result<Session, AuthenticationError> {
        let grant = payload
            .into_grant()
            .ok_or_else(|| AuthenticationError::MalformedResponse {
                reason: "response carries no access token or user".to_string(),
            })?;
        Ok(self
            .sessions()
            .establish(grant, PersistMode::from_remember(remember))
            .await)
    }
}

fn from_gateway(e: GatewayError) -> AuthenticationError {
    match e {
        GatewayError::Network(e) => AuthenticationError::Network {
            reason: e.to_string(),
        },
        GatewayError::InvalidRequest { reason } => AuthenticationError::InvalidRequest { reason },
    }
}

fn check_status(response: &ApiResponse) -> Result<(), AuthenticationError> {
    match response.status() {
        200..=299 => Ok(()),
        status @ 400..=499 => Err(AuthenticationError::InvalidCredentials {
            status,
            message: response.message(),
        }),
        status => Err(AuthenticationError::UnexpectedStatus { status }),
    }
}

fn check_session_status(response: &ApiResponse) -> Result<(), AuthenticationError> {
    match response.status() {
        200..=299 => Ok(()),
        401 => Err(AuthenticationError::NotSignedIn),
        status => Err(AuthenticationError::UnexpectedStatus { status }),
    }
}

fn parse_payload(response: &ApiResponse) -> Result<AuthPayload, AuthenticationError> {
    let body = response
        .body()
        .ok_or_else(|| AuthenticationError::MalformedResponse {
            reason: "empty or non-JSON body".to_string(),
        })?;
    AuthPayload::deserialize(unwrap_envelope(body)).map_err(|e| {
        AuthenticationError::MalformedResponse {
            reason: e.to_string(),
        }
    })
}
