//! Startup rehydration.
//!
//! Runs once per process. A record is rehydrated only when the remember flag
//! is set; an un-remembered record is wiped. Nothing here ever blocks the
//! process for longer than the configured timeout: expiry, unreadable storage
//! and incomplete records all resolve to [`BootState::Anonymous`].

use rafflekit_platform_access::{PersistMode, Session, SessionGrant, Token, UserProfile};
use rafflekit_token_store::{StorageError, TokenStore};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The session state the process starts in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootState {
    Authenticated(Session),
    Anonymous,
}

impl BootState {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// Resolves the startup session from storage.
#[derive(Debug, Clone)]
pub struct SessionBootstrapper {
    store: TokenStore,
    timeout: Duration,
}

impl SessionBootstrapper {
    #[must_use]
    pub fn new(store: TokenStore, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Resolves the startup state, bounded by the timeout.
    ///
    /// A rehydrated session carries epoch 0; the session owner re-stamps it.
    pub async fn run(&self) -> BootState {
        match tokio::time::timeout(self.timeout, self.resolve()).await {
            Ok(Ok(state)) => state,
            Ok(Err(e)) => {
                warn!(error = %e, "session storage unreadable, starting anonymous");
                BootState::Anonymous
            }
            Err(_) => {
                warn!(
                    timeout = ?self.timeout,
                    "session bootstrap timed out, starting anonymous"
                );
                BootState::Anonymous
            }
        }
    }

    async fn resolve(&self) -> Result<BootState, StorageError> {
        if !self.store.remember_flag().await? {
            // Leftovers from an un-remembered session must not survive a restart.
            self.store.clear_all().await?;
            debug!("no remembered session");
            return Ok(BootState::Anonymous);
        }

        let record = self.store.load_record().await?;
        let user = record
            .user
            .as_deref()
            .and_then(|raw| match serde_json::from_str::<UserProfile>(raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "stored user profile is unreadable");
                    None
                }
            });

        let (Some(access), Some(user)) = (record.access, user) else {
            warn!("remembered session is incomplete, discarding it");
            self.store.clear_all().await?;
            return Ok(BootState::Anonymous);
        };

        let grant = SessionGrant::new(Token::new(access), record.refresh.map(Token::new), user);
        let session = Session::authenticated(grant, PersistMode::Durable, 0);
        info!(role = ?session.role(), "remembered session restored");
        Ok(BootState::Authenticated(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rafflekit_platform_access::Role;
    use rafflekit_token_store::{MemoryBackend, SecureBackend, Slot};
    use std::sync::Arc;

    async fn remembered_store() -> (TokenStore, MemoryBackend, MemoryBackend) {
        let secure = MemoryBackend::new();
        let plaintext = MemoryBackend::new();
        let store = TokenStore::new(Arc::new(secure.clone()), Arc::new(plaintext.clone()));
        let user = serde_json::to_string(&UserProfile::new("4", "a@example.com", Role::Admin))
            .expect("serialize");
        store
            .set(PersistMode::Durable, Slot::RememberFlag, Some("true"))
            .await
            .unwrap();
        store
            .set(PersistMode::Durable, Slot::Refresh, Some("r"))
            .await
            .unwrap();
        store
            .set(PersistMode::Durable, Slot::Access, Some("a"))
            .await
            .unwrap();
        store
            .set(PersistMode::Durable, Slot::User, Some(&user))
            .await
            .unwrap();
        (store, secure, plaintext)
    }

    #[tokio::test]
    async fn remembered_record_is_restored() {
        let (store, _, _) = remembered_store().await;
        let state = SessionBootstrapper::new(store, Duration::from_secs(3)).run().await;

        let BootState::Authenticated(session) = state else {
            panic!("expected authenticated");
        };
        assert_eq!(session.access_token().map(Token::expose), Some("a"));
        assert_eq!(session.refresh_token().map(Token::expose), Some("r"));
        assert_eq!(session.role(), Some(Role::Admin));
        assert_eq!(session.persist_mode(), PersistMode::Durable);
    }

    #[tokio::test]
    async fn record_without_remember_flag_is_wiped() {
        let (store, secure, plaintext) = remembered_store().await;
        plaintext.remove(Slot::RememberFlag.key()).await.unwrap();

        let state = SessionBootstrapper::new(store, Duration::from_secs(3)).run().await;
        assert_eq!(state, BootState::Anonymous);
        assert!(secure.is_empty().await);
        assert!(plaintext.is_empty().await);
    }

    #[tokio::test]
    async fn access_without_user_is_anonymous() {
        let (store, secure, _) = remembered_store().await;
        secure.remove(Slot::User.key()).await.unwrap();

        let state = SessionBootstrapper::new(store.clone(), Duration::from_secs(3))
            .run()
            .await;
        assert_eq!(state, BootState::Anonymous);
        assert!(store.load_record().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn corrupt_user_is_anonymous() {
        let (store, secure, _) = remembered_store().await;
        secure.write(Slot::User.key(), "{not json").await.unwrap();

        let state = SessionBootstrapper::new(store, Duration::from_secs(3)).run().await;
        assert_eq!(state, BootState::Anonymous);
    }

    #[tokio::test]
    async fn empty_storage_is_anonymous() {
        let state = SessionBootstrapper::new(TokenStore::in_memory(), Duration::from_secs(3))
            .run()
            .await;
        assert_eq!(state, BootState::Anonymous);
    }

    struct HangingBackend;

    #[async_trait]
    impl SecureBackend for HangingBackend {
        async fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
            std::future::pending().await
        }
        async fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            std::future::pending().await
        }
        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_storage_times_out_to_anonymous() {
        let store = TokenStore::new(Arc::new(HangingBackend), Arc::new(HangingBackend));
        let state = SessionBootstrapper::new(store, Duration::from_millis(3000))
            .run()
            .await;
        assert_eq!(state, BootState::Anonymous);
    }

    struct BrokenBackend;

    #[async_trait]
    impl SecureBackend for BrokenBackend {
        async fn read(&self, _key: &str) -> Result<Option<String>, StorageError> {
            Err(StorageError::Unavailable {
                reason: "keychain locked".to_string(),
            })
        }
        async fn write(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
            Ok(())
        }
        async fn remove(&self, _key: &str) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn unreadable_storage_is_anonymous() {
        let store = TokenStore::new(Arc::new(BrokenBackend), Arc::new(BrokenBackend));
        let state = SessionBootstrapper::new(store, Duration::from_secs(3)).run().await;
        assert_eq!(state, BootState::Anonymous);
    }
}
