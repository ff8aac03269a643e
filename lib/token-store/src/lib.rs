//! Persistence of session material for rafflekit clients.
//!
//! This crate provides:
//!
//! - **Slots**: the named entries of a persisted session (`Slot`)
//! - **Backends**: the secure-store seam plus memory and file implementations
//! - **Token store**: reads, legacy migration and unconditional clearing
//! - **Strategies**: durable or ephemeral writes, chosen once per session

pub mod backend;
pub mod error;
pub mod file;
pub mod slot;
pub mod store;

pub use backend::{MemoryBackend, SecureBackend};
pub use error::StorageError;
pub use file::FileBackend;
pub use slot::Slot;
pub use store::{DurableStrategy, EphemeralStrategy, PersistStrategy, PersistedRecord, TokenStore};
