//! The gacha service: one entry point per player operation.
//!
//! Every mutating operation follows the same span:
//!
//! ```text
//! lock user -> begin tx -> load user -> regenerate -> compute
//!           -> stage counters -> emit *Resolved (handlers may grant bonuses)
//!           -> apply grants -> stage writes -> throw *Announced -> commit
//! ```
//!
//! Any error before the commit drops the transaction, so the store sees
//! either the whole operation or none of it. Thrown events are outside that
//! boundary.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use gacha_events::EventDispatcher;
use gacha_store::{Store, StoreError, Transaction};
use gacha_types::{
    CapacityState, DrawOutcome, InventoryCounter, ItemDelta, ItemId, Recipe, SynthesisOutcome,
    UserId, UserState, accumulate,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rust_decimal::Decimal;
use tracing::info;

use crate::clock::Clock;
use crate::config::{CapacityConfig, GachaConfig};
use crate::draw::{Catalog, DrawCount, DrawEngine};
use crate::error::ServiceError;
use crate::events::{
    BonusGrants, CapacityRegenerated, DrawAnnounced, DrawResolved, Grants, SynthesisAnnounced,
    SynthesisResolved,
};
use crate::guard::{GuardError, KeyGuard, LockRegistry};
use crate::recipe::{RecipeSynthesizer, SynthesisError};
use crate::regen::{RegenReport, regenerate, seconds_to_next};

/// Composes locking, regeneration, draws, synthesis and events over a store.
#[derive(Debug)]
pub struct GachaService<S, C> {
    store: Arc<S>,
    clock: C,
    locks: LockRegistry,
    dispatcher: EventDispatcher,
    draws: DrawEngine,
    recipes: RecipeSynthesizer<S>,
    capacity: CapacityConfig,
    lock_timeout: Option<Duration>,
    rng: Mutex<SmallRng>,
}

impl<S: Store, C: Clock> GachaService<S, C> {
    /// Build a service from configuration and its collaborators.
    pub fn new(config: &GachaConfig, catalog: Arc<Catalog>, store: Arc<S>, clock: C) -> Self {
        Self {
            draws: DrawEngine::new(Arc::clone(&catalog), config.draw.first_time_bonus),
            recipes: RecipeSynthesizer::new(Arc::clone(&store), catalog, config.synthesis.clone()),
            store,
            clock,
            locks: LockRegistry::new(),
            dispatcher: EventDispatcher::new("gacha"),
            capacity: config.capacity.clone(),
            lock_timeout: config.guard.lock_timeout_ms.map(Duration::from_millis),
            rng: Mutex::new(SmallRng::from_os_rng()),
        }
    }

    /// Replace the outcome generator with a seeded one.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(SmallRng::seed_from_u64(seed));
        self
    }

    /// The dispatcher events are published on. Attach handlers here.
    pub const fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    /// Recipe administration.
    pub const fn recipes(&self) -> &RecipeSynthesizer<S> {
        &self.recipes
    }

    /// The per-user lock registry.
    pub const fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// The catalog draws and recipes resolve against.
    pub fn catalog(&self) -> &Catalog {
        self.draws.catalog()
    }

    /// Spend slots on draws.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Draw`] for an exact count above the available
    /// slots or an undrawable catalog, and propagates lock, store and
    /// handler failures. Nothing is persisted on error.
    pub async fn draw(&self, external_id: &str, count: DrawCount) -> Result<DrawOutcome, ServiceError> {
        let _guard = self.lock(external_id).await?;
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut user = self.open(&mut tx, external_id, now).await?;

        let picks = self.with_rng(|rng| self.draws.plan(count, &user.capacity, rng))?;
        if picks.is_empty() {
            tx.save_user(&user).await?;
            tx.commit().await?;
            return Ok(DrawOutcome::empty(
                user.id,
                user.capacity.slot_remaining,
                seconds_to_next(&user.capacity, now),
            ));
        }

        let mut inventory = BTreeMap::new();
        Self::load_counters(&mut tx, user.id, DrawEngine::distinct_items(&picks), &mut inventory).await?;
        let settlement = self.draws.settle(&picks, &mut user.capacity, &mut inventory)?;
        Self::stage_counters(&mut tx, user.id, &inventory).await?;

        let resolved = Arc::new(DrawResolved {
            user: user.id,
            external_id: external_id.to_owned(),
            picks: picks.iter().map(|p| p.item).collect(),
            new_items: settlement.new_items(),
            collected: tx.collected(user.id).await?,
            milestones_reached: user.milestones_reached,
            grants: BonusGrants::default(),
        });
        self.dispatcher.emit(Arc::clone(&resolved)).await?;

        let mut deltas = settlement.deltas;
        let mut currency = settlement.currency;
        Self::apply_grants(
            &mut tx,
            &mut user,
            resolved.grants.take(),
            &mut inventory,
            &mut deltas,
            &mut currency,
        )
        .await?;
        user.money = user
            .money
            .checked_add(currency)
            .ok_or(ServiceError::ArithmeticOverflow)?;
        Self::persist(&mut tx, &user, &inventory).await?;

        let outcome = DrawOutcome {
            user: user.id,
            picks: resolved.picks.clone(),
            deltas,
            currency_delta: currency,
            slots_consumed: settlement.consumed,
            slots_remaining: user.capacity.slot_remaining,
            seconds_to_next: seconds_to_next(&user.capacity, now),
        };
        self.dispatcher.throw(Arc::new(DrawAnnounced {
            external_id: external_id.to_owned(),
            outcome: outcome.clone(),
        }))?;
        tx.commit().await?;

        info!(
            external_id,
            draws = outcome.picks.len(),
            currency = %outcome.currency_delta,
            slots_remaining = outcome.slots_remaining,
            "Draw committed"
        );
        Ok(outcome)
    }

    /// Combine three held items.
    ///
    /// Consumes one copy per listed ingredient (so listing an item twice
    /// needs two copies), rolls the recipe and adds the produced item.
    /// Synthesis spends no slots.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::MissingIngredient`] when the user holds too
    /// few copies, [`ServiceError::Synthesis`] for unknown items, and
    /// propagates lock, store and handler failures. Nothing is persisted on
    /// error.
    pub async fn synthesize(
        &self,
        external_id: &str,
        ingredients: [ItemId; 3],
    ) -> Result<SynthesisOutcome, ServiceError> {
        let _guard = self.lock(external_id).await?;
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let mut user = self.open(&mut tx, external_id, now).await?;

        let mut needed: BTreeMap<ItemId, u32> = BTreeMap::new();
        for item in ingredients {
            if self.catalog().item(item).is_none() {
                return Err(SynthesisError::UnknownItem(item).into());
            }
            let count = needed.entry(item).or_default();
            *count = count.saturating_add(1);
        }

        let mut inventory = BTreeMap::new();
        Self::load_counters(&mut tx, user.id, needed.keys().copied().collect(), &mut inventory).await?;
        for (&item, &need) in &needed {
            let held = inventory.get(&item).map_or(0, |c| c.storage);
            if held < need {
                return Err(ServiceError::MissingIngredient {
                    item,
                    needed: need,
                    held,
                });
            }
        }

        let [a, b, c] = ingredients;
        let recipe = self.recipes.define(a, b, c).await?;
        let (result, succeeded) = self.with_rng(|rng| self.recipes.roll(&recipe, rng))?;

        Self::load_counters(&mut tx, user.id, BTreeSet::from([result]), &mut inventory).await?;
        let result_was_new = inventory.get(&result).is_none_or(|c| c.storage == 0);

        let mut deltas = Vec::new();
        for (&item, &need) in &needed {
            let counter = inventory.entry(item).or_default();
            counter.storage = counter
                .storage
                .checked_sub(need)
                .ok_or(ServiceError::ArithmeticOverflow)?;
            counter.used = counter
                .used
                .checked_add(need)
                .ok_or(ServiceError::ArithmeticOverflow)?;
            accumulate(&mut deltas, item, i64::from(need).saturating_neg(), false);
        }
        let produced = inventory.entry(result).or_default();
        produced.storage = produced
            .storage
            .checked_add(1)
            .ok_or(ServiceError::ArithmeticOverflow)?;
        accumulate(&mut deltas, result, 1, result_was_new);
        Self::stage_counters(&mut tx, user.id, &inventory).await?;

        let resolved = Arc::new(SynthesisResolved {
            user: user.id,
            external_id: external_id.to_owned(),
            key: recipe.key,
            result,
            succeeded,
            new_items: if result_was_new { vec![result] } else { Vec::new() },
            collected: tx.collected(user.id).await?,
            milestones_reached: user.milestones_reached,
            grants: BonusGrants::default(),
        });
        self.dispatcher.emit(Arc::clone(&resolved)).await?;

        let mut currency = Decimal::ZERO;
        Self::apply_grants(
            &mut tx,
            &mut user,
            resolved.grants.take(),
            &mut inventory,
            &mut deltas,
            &mut currency,
        )
        .await?;
        user.money = user
            .money
            .checked_add(currency)
            .ok_or(ServiceError::ArithmeticOverflow)?;
        Self::persist(&mut tx, &user, &inventory).await?;

        let outcome = SynthesisOutcome {
            user: user.id,
            ingredients,
            result,
            succeeded,
            possibility: recipe.possibility,
            deltas,
            currency_delta: currency,
            slots_consumed: 0,
            slots_remaining: user.capacity.slot_remaining,
            seconds_to_next: seconds_to_next(&user.capacity, now),
        };
        self.dispatcher.throw(Arc::new(SynthesisAnnounced {
            external_id: external_id.to_owned(),
            outcome: outcome.clone(),
        }))?;
        tx.commit().await?;

        info!(
            external_id,
            key = %recipe.key,
            %result,
            succeeded,
            "Synthesis committed"
        );
        Ok(outcome)
    }

    /// Regenerate and report a user's capacity.
    ///
    /// # Errors
    ///
    /// Propagates lock and store failures.
    pub async fn capacity(&self, external_id: &str) -> Result<RegenReport, ServiceError> {
        let _guard = self.lock(external_id).await?;
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let before = self.initial_capacity(now);
        let mut user = tx.get_or_create_user(external_id, before).await?;
        let report = self.refresh(&mut user, now)?;
        tx.save_user(&user).await?;
        tx.commit().await?;
        Ok(report)
    }

    /// The recipe for three ingredients, defined on first use. Rolls nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Synthesis`] for unknown items or store
    /// failures.
    pub async fn recipe(&self, a: ItemId, b: ItemId, c: ItemId) -> Result<Recipe, ServiceError> {
        Ok(self.recipes.define(a, b, c).await?)
    }

    async fn lock(&self, key: &str) -> Result<KeyGuard, GuardError> {
        match self.lock_timeout {
            Some(timeout) => self.locks.acquire_timeout(key, timeout).await,
            None => self.locks.acquire(key).await,
        }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut SmallRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    const fn initial_capacity(&self, now: f64) -> CapacityState {
        CapacityState::full(self.capacity.slot_max, self.capacity.regen_interval_secs, now)
    }

    /// Load (or create) the user and bring its capacity up to date.
    async fn open(&self, tx: &mut S::Tx, external_id: &str, now: f64) -> Result<UserState, ServiceError> {
        let mut user = tx
            .get_or_create_user(external_id, self.initial_capacity(now))
            .await?;
        self.refresh(&mut user, now)?;
        Ok(user)
    }

    fn refresh(&self, user: &mut UserState, now: f64) -> Result<RegenReport, ServiceError> {
        let report = regenerate(&mut user.capacity, now);
        if report.gained > 0 {
            self.dispatcher.throw(Arc::new(CapacityRegenerated {
                user: user.id,
                external_id: user.external_id.clone(),
                gained: report.gained,
                slot_remaining: report.slot_remaining,
            }))?;
        }
        Ok(report)
    }

    async fn load_counters(
        tx: &mut S::Tx,
        user: UserId,
        items: BTreeSet<ItemId>,
        inventory: &mut BTreeMap<ItemId, InventoryCounter>,
    ) -> Result<(), StoreError> {
        for item in items {
            if !inventory.contains_key(&item) {
                let counter = tx.counter(user, item).await?;
                inventory.insert(item, counter);
            }
        }
        Ok(())
    }

    async fn apply_grants(
        tx: &mut S::Tx,
        user: &mut UserState,
        grants: Grants,
        inventory: &mut BTreeMap<ItemId, InventoryCounter>,
        deltas: &mut Vec<ItemDelta>,
        currency: &mut Decimal,
    ) -> Result<(), ServiceError> {
        if let Some(reached) = grants.milestones_reached {
            user.milestones_reached = user.milestones_reached.max(reached);
        }
        for (item, count) in grants.items {
            Self::load_counters(tx, user.id, BTreeSet::from([item]), inventory).await?;
            let counter = inventory.entry(item).or_default();
            let was_new = counter.storage == 0;
            counter.storage = counter
                .storage
                .checked_add(count)
                .ok_or(ServiceError::ArithmeticOverflow)?;
            accumulate(deltas, item, i64::from(count), was_new);
        }
        *currency = currency
            .checked_add(grants.currency)
            .ok_or(ServiceError::ArithmeticOverflow)?;
        Ok(())
    }

    async fn stage_counters(
        tx: &mut S::Tx,
        user: UserId,
        inventory: &BTreeMap<ItemId, InventoryCounter>,
    ) -> Result<(), StoreError> {
        for (&item, &counter) in inventory {
            tx.save_counter(user, item, counter).await?;
        }
        Ok(())
    }

    async fn persist(
        tx: &mut S::Tx,
        user: &UserState,
        inventory: &BTreeMap<ItemId, InventoryCounter>,
    ) -> Result<(), StoreError> {
        Self::stage_counters(tx, user.id, inventory).await?;
        tx.save_user(user).await
    }
}
