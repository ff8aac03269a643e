//! Session manager and authenticated API gateway.
//!
//! This crate owns the process's session and every authenticated call:
//!
//! - [`SessionManager`]: the single owner of the session, with startup
//!   rehydration through [`SessionBootstrapper`]
//! - [`AuthenticatedGateway`]: attaches credentials and renews them on 401,
//!   sharing one refresh across concurrent callers
//! - [`ModuleVisibility`]: per-role feature flags fetched once per session
//! - [`AuthApi`]: login, registration, two-factor, logout and profile calls
//!
//! HTTP goes through the [`Transport`] trait; [`ReqwestTransport`] is the
//! production implementation.

pub mod auth_api;
pub mod bootstrap;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod manager;
pub mod modules;
pub mod refresh;
pub mod response;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use auth_api::{AuthApi, LoginOutcome, Registration, RegistrationOutcome, TwoFactorChallenge};
pub use bootstrap::{BootState, SessionBootstrapper};
pub use client::SessionClient;
pub use config::{ApiConfig, ModulesConfig, SessionConfig, VisibilityPolicy};
pub use error::{ErrorKind, GatewayError, RefreshError, TransportError};
pub use gateway::{Attempt, AuthenticatedGateway};
pub use manager::SessionManager;
pub use modules::{FeatureFlags, FlagSource, ModuleMap, ModuleVisibility};
pub use refresh::{HttpRefreshClient, RefreshClient, RefreshedTokens};
pub use response::ApiResponse;
pub use transport::{ApiRequest, RawResponse, ReqwestTransport, Transport};
