//! Wiring for a complete client.

use rafflekit_platform_access::RoleGate;
use rafflekit_token_store::TokenStore;
use std::sync::Arc;

use crate::auth_api::AuthApi;
use crate::config::{ApiConfig, ModulesConfig, SessionConfig};
use crate::error::TransportError;
use crate::gateway::AuthenticatedGateway;
use crate::manager::SessionManager;
use crate::modules::ModuleVisibility;
use crate::refresh::HttpRefreshClient;
use crate::transport::{ReqwestTransport, Transport};

/// The session layer assembled over one transport and one token store.
pub struct SessionClient {
    sessions: Arc<SessionManager>,
    gateway: AuthenticatedGateway,
    auth: AuthApi,
    modules: ModuleVisibility,
    gate: RoleGate,
}

impl SessionClient {
    /// Assembles a client over `transport`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        store: TokenStore,
        session: &SessionConfig,
        modules: &ModulesConfig,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(store, session));
        let refresher = Arc::new(HttpRefreshClient::new(Arc::clone(&transport)));
        let gateway = AuthenticatedGateway::new(Arc::clone(&transport), Arc::clone(&sessions), refresher);

        Self {
            auth: AuthApi::new(transport, gateway.clone()),
            modules: ModuleVisibility::new(gateway.clone(), modules.policy),
            gate: RoleGate::new(session.login_path.clone()),
            sessions,
            gateway,
        }
    }

    /// Assembles a client talking HTTP to the configured API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn connect(
        api: &ApiConfig,
        store: TokenStore,
        session: &SessionConfig,
        modules: &ModulesConfig,
    ) -> Result<Self, TransportError> {
        let transport = Arc::new(ReqwestTransport::new(api)?);
        Ok(Self::new(transport, store, session, modules))
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    #[must_use]
    pub fn gateway(&self) -> &AuthenticatedGateway {
        &self.gateway
    }

    #[must_use]
    pub fn auth(&self) -> &AuthApi {
        &self.auth
    }

    #[must_use]
    pub fn modules(&self) -> &ModuleVisibility {
        &self.modules
    }

    #[must_use]
    pub fn gate(&self) -> &RoleGate {
        &self.gate
    }
}
