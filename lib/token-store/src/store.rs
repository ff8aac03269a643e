//! The token store and its persistence strategies.
//!
//! Reads and clears go straight to [`TokenStore`]. Writes go through a
//! [`PersistStrategy`] chosen once per session from its [`PersistMode`]:
//! [`DurableStrategy`] writes to storage, [`EphemeralStrategy`] never does.

use async_trait::async_trait;
use rafflekit_platform_access::PersistMode;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::backend::{MemoryBackend, SecureBackend};
use crate::error::StorageError;
use crate::slot::Slot;

/// Values older builds wrote when they stored an absent value as a string.
const NULLISH: [&str; 2] = ["null", "undefined"];

/// Raw contents of every slot.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PersistedRecord {
    pub access: Option<String>,
    pub refresh: Option<String>,
    pub user: Option<String>,
    pub remember: bool,
}

impl PersistedRecord {
    /// Returns true if no slot holds anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none() && self.user.is_none() && !self.remember
    }
}

impl fmt::Debug for PersistedRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedRecord")
            .field("access", &self.access.as_ref().map(|_| "[REDACTED]"))
            .field("refresh", &self.refresh.as_ref().map(|_| "[REDACTED]"))
            .field("user", &self.user.is_some())
            .field("remember", &self.remember)
            .finish()
    }
}

/// Session-material storage over a secure and a plaintext backend.
///
/// Sensitive slots live in the secure backend. The plaintext backend holds
/// the remember flag and any legacy plaintext copies left by older builds.
#[derive(Clone)]
pub struct TokenStore {
    secure: Arc<dyn SecureBackend>,
    plaintext: Arc<dyn SecureBackend>,
}

impl fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Creates a store over the given backends.
    #[must_use]
    pub fn new(secure: Arc<dyn SecureBackend>, plaintext: Arc<dyn SecureBackend>) -> Self {
        Self { secure, plaintext }
    }

    /// Creates a store over two fresh in-memory backends.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
        )
    }

    /// Returns the write strategy for a session persisted with `mode`.
    #[must_use]
    pub fn strategy(&self, mode: PersistMode) -> Arc<dyn PersistStrategy> {
        match mode {
            PersistMode::Durable => Arc::new(DurableStrategy::new(self.clone())),
            PersistMode::Ephemeral => Arc::new(EphemeralStrategy),
        }
    }

    fn home(&self, slot: Slot) -> &dyn SecureBackend {
        if slot.is_sensitive() {
            self.secure.as_ref()
        } else {
            self.plaintext.as_ref()
        }
    }

    /// Reads a slot.
    ///
    /// Falls back to the legacy plaintext key when the current key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend cannot be read.
    pub async fn get(&self, slot: Slot) -> Result<Option<String>, StorageError> {
        if let Some(value) = non_nullish(self.home(slot).read(slot.key()).await?) {
            return Ok(Some(value));
        }

        let legacy = non_nullish(self.plaintext.read(slot.legacy_key()).await?);
        if legacy.is_some() {
            debug!(%slot, "read slot from legacy plaintext storage");
        }
        Ok(legacy)
    }

    /// Returns the stored remember flag. Absent means false.
    pub async fn remember_flag(&self) -> Result<bool, StorageError> {
        Ok(self
            .get(Slot::RememberFlag)
            .await?
            .is_some_and(|v| v.eq_ignore_ascii_case("true")))
    }

    /// Reads every slot.
    pub async fn load_record(&self) -> Result<PersistedRecord, StorageError> {
        Ok(PersistedRecord {
            access: self.get(Slot::Access).await?,
            refresh: self.get(Slot::Refresh).await?,
            user: self.get(Slot::User).await?,
            remember: self.remember_flag().await?,
        })
    }

    /// Writes a slot using the strategy for `mode`.
    pub async fn set(
        &self,
        mode: PersistMode,
        slot: Slot,
        value: Option<&str>,
    ) -> Result<(), StorageError> {
        self.strategy(mode).set(slot, value).await
    }

    /// Removes every slot from every backend, whatever the session's mode.
    ///
    /// Every removal is attempted even if an earlier one fails; the first
    /// failure is returned.
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        let mut first_error = None;

        for slot in Slot::ALL {
            let removals = [
                self.secure.remove(slot.key()).await,
                self.plaintext.remove(slot.key()).await,
                self.plaintext.remove(slot.legacy_key()).await,
            ];
            for result in removals {
                if let Err(e) = result {
                    warn!(%slot, error = %e, "failed to clear slot");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("token store cleared");
                Ok(())
            }
        }
    }

    async fn write_durable(&self, slot: Slot, value: Option<&str>) -> Result<(), StorageError> {
        match value {
            Some(value) => self.home(slot).write(slot.key(), value).await?,
            None => self.home(slot).remove(slot.key()).await?,
        }
        // The current key is authoritative from now on.
        self.plaintext.remove(slot.legacy_key()).await
    }
}

fn non_nullish(value: Option<String>) -> Option<String> {
    value.filter(|v| !NULLISH.contains(&v.as_str()))
}

/// How a session writes its slots.
#[async_trait]
pub trait PersistStrategy: Send + Sync + fmt::Debug {
    /// The mode this strategy implements.
    fn mode(&self) -> PersistMode;

    /// Writes a slot. `None` removes it; it is never written as a string.
    ///
    /// # Errors
    ///
    /// Returns an error if durable storage cannot be written.
    async fn set(&self, slot: Slot, value: Option<&str>) -> Result<(), StorageError>;
}

/// Writes slots to durable storage.
#[derive(Debug, Clone)]
pub struct DurableStrategy {
    store: TokenStore,
}

impl DurableStrategy {
    /// Creates a strategy writing into `store`.
    #[must_use]
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PersistStrategy for DurableStrategy {
    fn mode(&self) -> PersistMode {
        PersistMode::Durable
    }

    async fn set(&self, slot: Slot, value: Option<&str>) -> Result<(), StorageError> {
        trace!(%slot, present = value.is_some(), "durable slot write");
        self.store.write_durable(slot, value).await
    }
}

/// Keeps session material in memory only; never touches storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct EphemeralStrategy;

#[async_trait]
impl PersistStrategy for EphemeralStrategy {
    fn mode(&self) -> PersistMode {
        PersistMode::Ephemeral
    }

    async fn set(&self, slot: Slot, _value: Option<&str>) -> Result<(), StorageError> {
        trace!(%slot, "ephemeral session, slot not persisted");
        Ok(())
    }
}
