//! The persistence collaborator boundary.
//!
//! The core talks to storage through two traits. [`Store`] owns the shared
//! recipe table and hands out [`Transaction`]s that scope every per-user
//! read and write of one operation. A transaction that is dropped without
//! [`Transaction::commit`] leaves no trace.

use std::future::Future;

use gacha_types::{CapacityState, InventoryCounter, ItemId, Recipe, RecipeKey, UserId, UserState};

use crate::error::StoreError;

/// Shared storage for users, inventories and recipe definitions.
pub trait Store: Send + Sync + 'static {
    /// The transaction type handed out by [`Store::begin`].
    type Tx: Transaction;

    /// Open a transaction for one operation.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the backend cannot start one.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StoreError>> + Send;

    /// Read a recipe definition by canonical key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn get_recipe(
        &self,
        key: RecipeKey,
    ) -> impl Future<Output = Result<Option<Recipe>, StoreError>> + Send;

    /// Insert a recipe definition if no row exists for its key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if a row for the key already exists.
    fn insert_recipe(&self, recipe: Recipe) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replace an existing recipe definition.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no row exists for the key.
    fn update_recipe(&self, recipe: Recipe) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every stored recipe definition, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn list_recipes(&self) -> impl Future<Output = Result<Vec<Recipe>, StoreError>> + Send;
}

/// All per-user reads and writes of one operation.
///
/// Reads observe the transaction's own staged writes. Isolation between
/// transactions touching the same user is provided by the caller holding
/// that user's lock for the transaction's whole lifetime.
pub trait Transaction: Send {
    /// Load the user with this external identity, creating it with
    /// `initial` capacity and zero currency when absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn get_or_create_user(
        &mut self,
        external_id: &str,
        initial: CapacityState,
    ) -> impl Future<Output = Result<UserState, StoreError>> + Send;

    /// Stage an updated user row.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn save_user(&mut self, user: &UserState) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Read an inventory counter; untouched items read as all zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn counter(
        &mut self,
        user: UserId,
        item: ItemId,
    ) -> impl Future<Output = Result<InventoryCounter, StoreError>> + Send;

    /// Stage an updated inventory counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    fn save_counter(
        &mut self,
        user: UserId,
        item: ItemId,
        counter: InventoryCounter,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Number of distinct items the user has ever held, i.e. counters with
    /// `storage + used > 0`, including staged writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    fn collected(&mut self, user: UserId) -> impl Future<Output = Result<u32, StoreError>> + Send;

    /// Apply every staged write atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the writes could not be applied; in that case
    /// none of them are visible.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}
