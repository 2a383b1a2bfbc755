//! Error types for the persistence boundary.
//!
//! Backends map their native failures onto [`StoreError`] so the core never
//! sees driver-specific errors.

use gacha_types::RecipeKey;

/// Errors that can occur in a [`Store`](crate::Store) or
/// [`Transaction`](crate::Transaction).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A recipe row for this key was committed by another writer first.
    #[error("recipe {key} already defined")]
    Conflict {
        /// The contested canonical key.
        key: RecipeKey,
    },

    /// The row to update does not exist.
    #[error("recipe {key} not found")]
    NotFound {
        /// The missing canonical key.
        key: RecipeKey,
    },

    /// A lock protecting in-memory state was poisoned by a panicking writer.
    #[error("store state poisoned")]
    Poisoned,

    /// The backend refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
