//! Persistence boundary for the gacha economy core.
//!
//! The core never talks to a database directly. It opens a [`Transaction`]
//! per operation through a [`Store`], stages user and inventory writes, and
//! commits once at the end. Recipe definitions live outside transactions
//! because they are shared by every user and written at most once per key.
//!
//! # Modules
//!
//! - [`store`] -- The `Store` and `Transaction` traits
//! - [`memory`] -- `MemoryStore`, the in-process implementation
//! - [`error`] -- Shared error types

pub mod error;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use memory::{MemoryStore, MemoryTransaction};
pub use store::{Store, Transaction};
