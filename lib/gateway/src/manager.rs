//! The session manager: single owner of the process's session.
//!
//! Every read of the current token or user goes through [`SessionManager`],
//! and every mutation is one of four lifecycle operations:
//!
//! - [`SessionManager::establish`] installs credentials issued at login.
//! - [`SessionManager::rotate`] swaps in tokens issued by a refresh.
//! - [`SessionManager::end`] destroys the session (logout).
//! - [`SessionManager::end_if_current`] destroys it after a rejected refresh.
//!
//! Establish and end are serialized on a lifecycle lock, so a logout always
//! completes before a following login starts. Each of them bumps the session
//! epoch; work started under an older epoch (an in-flight refresh, a cached
//! flag map) can tell that the session it belonged to is gone.

use rafflekit_platform_access::{
    AuthenticationError, GateOutcome, PersistMode, ProfileUpdate, Role, RoleGate, RoleSet,
    Session, SessionGrant, Token, UserProfile,
};
use rafflekit_token_store::{PersistStrategy, Slot, StorageError, TokenStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::bootstrap::{BootState, SessionBootstrapper};
use crate::config::SessionConfig;
use crate::refresh::RefreshedTokens;

struct ActiveSession {
    session: Session,
    /// Fixed when the session is installed.
    strategy: Arc<dyn PersistStrategy>,
}

/// Owns the session and its persistence.
pub struct SessionManager {
    store: TokenStore,
    bootstrapper: SessionBootstrapper,
    state: RwLock<ActiveSession>,
    lifecycle: Mutex<()>,
    last_epoch: AtomicU64,
    boot: OnceCell<BootState>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("epoch", &self.last_epoch.load(Ordering::SeqCst))
            .field("bootstrapped", &self.boot.initialized())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Creates a manager over `store`. The session starts anonymous until
    /// [`SessionManager::bootstrap`] runs.
    #[must_use]
    pub fn new(store: TokenStore, config: &SessionConfig) -> Self {
        Self {
            bootstrapper: SessionBootstrapper::new(store.clone(), config.bootstrap_timeout()),
            state: RwLock::new(ActiveSession {
                session: Session::anonymous(0),
                strategy: store.strategy(PersistMode::Ephemeral),
            }),
            store,
            lifecycle: Mutex::new(()),
            last_epoch: AtomicU64::new(0),
            boot: OnceCell::new(),
        }
    }

    /// Returns the underlying token store.
    #[must_use]
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    fn next_epoch(&self) -> u64 {
        self.last_epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Rehydrates the remembered session, once per process.
    ///
    /// Later calls return the state the first call resolved, without touching
    /// storage again.
    pub async fn bootstrap(&self) -> BootState {
        self.boot
            .get_or_init(|| async {
                match self.bootstrapper.run().await {
                    BootState::Authenticated(session) => {
                        let session = session.with_epoch(self.next_epoch());
                        let mut active = self.state.write().await;
                        *active = ActiveSession {
                            session: session.clone(),
                            strategy: self.store.strategy(PersistMode::Durable),
                        };
                        BootState::Authenticated(session)
                    }
                    BootState::Anonymous => BootState::Anonymous,
                }
            })
            .await
            .clone()
    }

    /// Returns true once bootstrap has resolved.
    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        self.boot.initialized()
    }

    /// Returns a copy of the current session.
    pub async fn snapshot(&self) -> Session {
        self.state.read().await.session.clone()
    }

    /// Returns the current access token.
    pub async fn access_token(&self) -> Option<Token> {
        self.state.read().await.session.access_token().cloned()
    }

    /// Returns the current user's role.
    pub async fn role(&self) -> Option<Role> {
        self.state.read().await.session.role()
    }

    /// Returns the current session epoch.
    pub async fn epoch(&self) -> u64 {
        self.state.read().await.session.epoch()
    }

    /// Guards a navigation against the current session, after bootstrap.
    pub async fn authorize(&self, gate: &RoleGate, destination: &str, required: &RoleSet) -> GateOutcome {
        self.bootstrap().await;
        gate.guard(destination, required, &self.snapshot().await)
    }

    /// Installs a freshly issued session.
    ///
    /// The previous session is retired before storage is touched, so a
    /// refresh still in flight for it is discarded as stale. Anything it left
    /// in storage is then cleared. A durable session that cannot be written
    /// degrades to ephemeral.
    #[instrument(skip(self, grant))]
    pub async fn establish(&self, grant: SessionGrant, mode: PersistMode) -> Session {
        self.bootstrap().await;
        let _lifecycle = self.lifecycle.lock().await;

        let retired = self.next_epoch();
        *self.state.write().await = ActiveSession {
            session: Session::anonymous(retired),
            strategy: self.store.strategy(PersistMode::Ephemeral),
        };

        if let Err(e) = self.store.clear_all().await {
            warn!(error = %e, "failed to clear previous session material");
        }

        let mut effective_mode = mode;
        let mut strategy = self.store.strategy(mode);
        if let Err(e) = write_grant(strategy.as_ref(), &grant).await {
            warn!(error = %e, "failed to persist session, keeping it in memory only");
            if let Err(e) = self.store.clear_all().await {
                warn!(error = %e, "failed to clear partially written session");
            }
            effective_mode = PersistMode::Ephemeral;
            strategy = self.store.strategy(effective_mode);
        }

        let epoch = self.next_epoch();
        let session = Session::authenticated(grant, effective_mode, epoch);
        *self.state.write().await = ActiveSession {
            session: session.clone(),
            strategy,
        };
        info!(epoch, mode = ?effective_mode, role = ?session.role(), "session established");
        session
    }

    /// Swaps in tokens from a refresh started under `epoch`.
    ///
    /// Returns the new access token, or `None` if the session was ended or
    /// replaced while the refresh was in flight.
    pub async fn rotate(&self, epoch: u64, refreshed: RefreshedTokens) -> Option<Token> {
        let mut active = self.state.write().await;
        if active.session.epoch() != epoch {
            debug!(epoch, current = active.session.epoch(), "discarding refresh for a stale session");
            return None;
        }

        let RefreshedTokens {
            access_token,
            refresh_token,
            user,
        } = refreshed;
        if !active
            .session
            .rotate(access_token.clone(), refresh_token.clone())
        {
            return None;
        }

        let restated = match user {
            Some(user) => {
                let restated = active.session.restate_user(user);
                if !restated {
                    warn!("refresh returned a profile for another account, ignoring it");
                }
                restated
            }
            None => false,
        };

        let strategy = Arc::clone(&active.strategy);
        let result = async {
            if let Some(refresh_token) = &refresh_token {
                strategy.set(Slot::Refresh, Some(refresh_token.expose())).await?;
            }
            strategy.set(Slot::Access, Some(access_token.expose())).await?;
            if restated {
                write_user(strategy.as_ref(), active.session.user()).await?;
            }
            Ok::<_, StorageError>(())
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "failed to persist rotated tokens");
        }

        debug!(epoch, rotated_refresh = refresh_token.is_some(), "session tokens rotated");
        Some(access_token)
    }

    /// Ends the session and wipes storage. Safe to call when anonymous.
    ///
    /// # Errors
    ///
    /// Returns an error if storage could not be fully cleared. The in-memory
    /// session is anonymous regardless.
    #[instrument(skip(self))]
    pub async fn end(&self) -> rafflekit_core::Result<(), AuthenticationError> {
        self.bootstrap().await;
        let _lifecycle = self.lifecycle.lock().await;
        self.end_locked().await
    }

    /// Ends the session only if it is still the one from `epoch`.
    ///
    /// Returns true if a session was ended.
    pub async fn end_if_current(&self, epoch: u64) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        if self.epoch().await != epoch {
            debug!(epoch, "session already replaced, not ending it");
            return false;
        }
        if let Err(e) = self.end_locked().await {
            warn!(error = %e, "session ended but storage was not fully cleared");
        }
        true
    }

    async fn end_locked(&self) -> rafflekit_core::Result<(), AuthenticationError> {
        let epoch = self.next_epoch();
        let was_authenticated = {
            let mut active = self.state.write().await;
            let was_authenticated = active.session.is_authenticated();
            *active = ActiveSession {
                session: Session::anonymous(epoch),
                strategy: self.store.strategy(PersistMode::Ephemeral),
            };
            was_authenticated
        };

        self.store
            .clear_all()
            .await
            .map_err(|e| AuthenticationError::Storage {
                reason: e.to_string(),
            })?;
        info!(epoch, was_authenticated, "session ended");
        Ok(())
    }

    /// Applies a local profile edit and persists the user with the
    /// session's own strategy.
    pub async fn apply_profile_update(&self, update: &ProfileUpdate) -> bool {
        let mut active = self.state.write().await;
        if !active.session.apply_profile_update(update) {
            return false;
        }
        if let Err(e) = write_user(active.strategy.as_ref(), active.session.user()).await {
            warn!(error = %e, "failed to persist profile update");
        }
        true
    }

    /// Merges a profile echoed by the API into the session.
    pub async fn merge_profile(&self, echoed: &UserProfile) -> bool {
        let mut active = self.state.write().await;
        if !active.session.merge_profile(echoed) {
            return false;
        }
        if let Err(e) = write_user(active.strategy.as_ref(), active.session.user()).await {
            warn!(error = %e, "failed to persist merged profile");
        }
        true
    }
}

async fn write_grant(strategy: &dyn PersistStrategy, grant: &SessionGrant) -> Result<(), StorageError> {
    if strategy.mode().is_durable() {
        strategy.set(Slot::RememberFlag, Some("true")).await?;
    }
    strategy
        .set(Slot::Refresh, grant.refresh_token.as_ref().map(Token::expose))
        .await?;
    strategy
        .set(Slot::Access, Some(grant.access_token.expose()))
        .await?;
    write_user(strategy, Some(&grant.user)).await
}

async fn write_user(strategy: &dyn PersistStrategy, user: Option<&UserProfile>) -> Result<(), StorageError> {
    let encoded = user.map(serde_json::to_string).transpose()?;
    strategy.set(Slot::User, encoded.as_deref()).await
}
