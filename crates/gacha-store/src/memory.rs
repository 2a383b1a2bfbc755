//! In-process [`Store`] with transactional staging.
//!
//! Transactions stage their writes locally and apply them under one lock on
//! commit. Dropping an uncommitted transaction discards the staged writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use gacha_types::{CapacityState, InventoryCounter, ItemId, Recipe, RecipeKey, UserId, UserState};
use rust_decimal::Decimal;

use crate::error::StoreError;
use crate::store::{Store, Transaction};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, UserState>,
    counters: HashMap<(UserId, ItemId), InventoryCounter>,
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    recipes: Mutex<BTreeMap<RecipeKey, Recipe>>,
    refuse_commits: AtomicBool,
    commits: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex.lock().map_err(|_poisoned| StoreError::Poisoned)
}

/// A cheaply cloneable in-memory store. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed state of a user, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the tables lock is poisoned.
    pub fn user(&self, external_id: &str) -> Result<Option<UserState>, StoreError> {
        Ok(lock(&self.shared.tables)?.users.get(external_id).cloned())
    }

    /// Committed inventory counter of a user for an item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the tables lock is poisoned.
    pub fn counter_of(&self, user: UserId, item: ItemId) -> Result<InventoryCounter, StoreError> {
        Ok(lock(&self.shared.tables)?
            .counters
            .get(&(user, item))
            .copied()
            .unwrap_or_default())
    }

    /// Number of stored recipe definitions.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Poisoned`] if the recipe lock is poisoned.
    pub fn recipe_count(&self) -> Result<usize, StoreError> {
        Ok(lock(&self.shared.recipes)?.len())
    }

    /// Make every subsequent commit fail with [`StoreError::Unavailable`].
    pub fn refuse_commits(&self, refuse: bool) {
        self.shared.refuse_commits.store(refuse, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> u64 {
        self.shared.commits.load(Ordering::SeqCst)
    }
}

impl Store for MemoryStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<MemoryTransaction, StoreError> {
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            users: HashMap::new(),
            counters: HashMap::new(),
        })
    }

    async fn get_recipe(&self, key: RecipeKey) -> Result<Option<Recipe>, StoreError> {
        Ok(lock(&self.shared.recipes)?.get(&key).copied())
    }

    async fn insert_recipe(&self, recipe: Recipe) -> Result<(), StoreError> {
        let mut recipes = lock(&self.shared.recipes)?;
        if recipes.contains_key(&recipe.key) {
            return Err(StoreError::Conflict { key: recipe.key });
        }
        recipes.insert(recipe.key, recipe);
        Ok(())
    }

    async fn update_recipe(&self, recipe: Recipe) -> Result<(), StoreError> {
        let mut recipes = lock(&self.shared.recipes)?;
        match recipes.get_mut(&recipe.key) {
            Some(row) => {
                *row = recipe;
                Ok(())
            }
            None => Err(StoreError::NotFound { key: recipe.key }),
        }
    }

    async fn list_recipes(&self) -> Result<Vec<Recipe>, StoreError> {
        Ok(lock(&self.shared.recipes)?.values().copied().collect())
    }
}

/// A [`Transaction`] over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    users: HashMap<String, UserState>,
    counters: HashMap<(UserId, ItemId), InventoryCounter>,
}

impl Transaction for MemoryTransaction {
    async fn get_or_create_user(
        &mut self,
        external_id: &str,
        initial: CapacityState,
    ) -> Result<UserState, StoreError> {
        if let Some(user) = self.users.get(external_id) {
            return Ok(user.clone());
        }
        let existing = lock(&self.shared.tables)?.users.get(external_id).cloned();
        let user = existing.unwrap_or_else(|| {
            tracing::debug!(external_id, "Creating user");
            UserState {
                id: UserId::new(),
                external_id: external_id.to_owned(),
                capacity: initial,
                money: Decimal::ZERO,
                milestones_reached: 0,
            }
        });
        self.users.insert(external_id.to_owned(), user.clone());
        Ok(user)
    }

    async fn save_user(&mut self, user: &UserState) -> Result<(), StoreError> {
        self.users.insert(user.external_id.clone(), user.clone());
        Ok(())
    }

    async fn counter(&mut self, user: UserId, item: ItemId) -> Result<InventoryCounter, StoreError> {
        if let Some(counter) = self.counters.get(&(user, item)) {
            return Ok(*counter);
        }
        Ok(lock(&self.shared.tables)?
            .counters
            .get(&(user, item))
            .copied()
            .unwrap_or_default())
    }

    async fn save_counter(
        &mut self,
        user: UserId,
        item: ItemId,
        counter: InventoryCounter,
    ) -> Result<(), StoreError> {
        self.counters.insert((user, item), counter);
        Ok(())
    }

    async fn collected(&mut self, user: UserId) -> Result<u32, StoreError> {
        let mut held: BTreeMap<ItemId, InventoryCounter> = lock(&self.shared.tables)?
            .counters
            .iter()
            .filter(|((owner, _), _)| *owner == user)
            .map(|(&(_, item), &counter)| (item, counter))
            .collect();
        held.extend(
            self.counters
                .iter()
                .filter(|((owner, _), _)| *owner == user)
                .map(|(&(_, item), &counter)| (item, counter)),
        );
        let count = held.values().filter(|c| c.ever_held()).count();
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        if self.shared.refuse_commits.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("commit refused".to_owned()));
        }
        let users = std::mem::take(&mut self.users);
        let counters = std::mem::take(&mut self.counters);
        let staged = users.len().saturating_add(counters.len());
        {
            let mut tables = lock(&self.shared.tables)?;
            tables.users.extend(users);
            tables.counters.extend(counters);
        }
        self.shared.commits.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(rows = staged, "Committed transaction");
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.users.is_empty() || !self.counters.is_empty() {
            tracing::debug!(
                users = self.users.len(),
                counters = self.counters.len(),
                "Rolled back transaction"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn initial() -> CapacityState {
        CapacityState::full(3, 3600.0, 0.0)
    }

    fn recipe(a: u32, b: u32, c: u32, result: u32) -> Recipe {
        Recipe {
            key: RecipeKey::new(ItemId(a), ItemId(b), ItemId(c)),
            result: ItemId(result),
            possibility: 0.5,
            modified: false,
        }
    }

    #[tokio::test]
    async fn commit_makes_writes_visible() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let mut user = tx.get_or_create_user("alice", initial()).await.unwrap();
        user.capacity.slot_remaining = 1;
        tx.save_user(&user).await.unwrap();
        tx.save_counter(user.id, ItemId(7), InventoryCounter { storage: 2, used: 0 })
            .await
            .unwrap();
        assert!(store.user("alice").unwrap().is_none());

        tx.commit().await.unwrap();
        let stored = store.user("alice").unwrap().unwrap();
        assert_eq!(stored.capacity.slot_remaining, 1);
        assert_eq!(store.counter_of(user.id, ItemId(7)).unwrap().storage, 2);
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            let user = tx.get_or_create_user("bob", initial()).await.unwrap();
            tx.save_counter(user.id, ItemId(1), InventoryCounter { storage: 5, used: 0 })
                .await
                .unwrap();
        }
        assert!(store.user("bob").unwrap().is_none());
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn transaction_reads_its_own_writes() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let first = tx.get_or_create_user("carol", initial()).await.unwrap();
        let again = tx.get_or_create_user("carol", initial()).await.unwrap();
        assert_eq!(first.id, again.id);

        tx.save_counter(first.id, ItemId(3), InventoryCounter { storage: 1, used: 4 })
            .await
            .unwrap();
        let counter = tx.counter(first.id, ItemId(3)).await.unwrap();
        assert_eq!(counter.used, 4);
        assert_eq!(tx.counter(first.id, ItemId(9)).await.unwrap(), InventoryCounter::default());
    }

    #[tokio::test]
    async fn collected_counts_committed_and_staged_items() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let user = tx.get_or_create_user("erin", initial()).await.unwrap();
        tx.save_counter(user.id, ItemId(1), InventoryCounter { storage: 1, used: 0 })
            .await
            .unwrap();
        tx.save_counter(user.id, ItemId(2), InventoryCounter { storage: 0, used: 3 })
            .await
            .unwrap();
        tx.save_counter(user.id, ItemId(3), InventoryCounter::default())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.collected(user.id).await.unwrap(), 2);
        tx.save_counter(user.id, ItemId(3), InventoryCounter { storage: 2, used: 0 })
            .await
            .unwrap();
        assert_eq!(tx.collected(user.id).await.unwrap(), 3);

        let stranger = UserId::new();
        assert_eq!(tx.collected(stranger).await.unwrap(), 0);
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.collected(user.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn refused_commit_discards_everything() {
        let store = MemoryStore::new();
        store.refuse_commits(true);
        let mut tx = store.begin().await.unwrap();
        tx.get_or_create_user("dave", initial()).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Unavailable(_))));
        assert!(store.user("dave").unwrap().is_none());
    }

    #[tokio::test]
    async fn second_insert_of_same_key_conflicts() {
        let store = MemoryStore::new();
        store.insert_recipe(recipe(1, 2, 3, 10)).await.unwrap();
        let err = store.insert_recipe(recipe(3, 2, 1, 11)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let stored = store.get_recipe(RecipeKey::new(ItemId(2), ItemId(3), ItemId(1))).await.unwrap();
        assert_eq!(stored.map(|r| r.result), Some(ItemId(10)));
    }

    #[tokio::test]
    async fn update_requires_existing_row() {
        let store = MemoryStore::new();
        let err = store.update_recipe(recipe(1, 1, 1, 2)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        store.insert_recipe(recipe(1, 1, 1, 2)).await.unwrap();
        let mut changed = recipe(1, 1, 1, 5);
        changed.modified = true;
        store.update_recipe(changed).await.unwrap();
        let listed = store.list_recipes().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed.first().unwrap().modified);
    }

    #[tokio::test]
    async fn list_is_ordered_by_key() {
        let store = MemoryStore::new();
        store.insert_recipe(recipe(5, 6, 7, 1)).await.unwrap();
        store.insert_recipe(recipe(1, 2, 3, 1)).await.unwrap();
        let keys: Vec<RecipeKey> = store
            .list_recipes()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(
            keys,
            vec![
                RecipeKey::new(ItemId(1), ItemId(2), ItemId(3)),
                RecipeKey::new(ItemId(5), ItemId(6), ItemId(7)),
            ]
        );
        assert_eq!(store.recipe_count().unwrap(), 2);
    }
}
