//! Core types and utilities for the rafflekit session layer.
//!
//! This crate provides the error-handling foundation and the identifier
//! types shared by the storage, access-control and gateway crates.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::UserId;
