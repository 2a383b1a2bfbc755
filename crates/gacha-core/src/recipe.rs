//! Recipe synthesis: deterministic definitions, probabilistic outcomes.
//!
//! The first attempt at a combination derives its definition (result item
//! and success chance) from a generator seeded by the canonical key, then
//! stores it. Every later attempt reuses the stored row, so the same three
//! items always name the same recipe regardless of order or who asks first.
//! Only the success roll is fresh per attempt.
//!
//! # Seeding
//!
//! [`recipe_seed`] is FNV-1a (64-bit) over the little-endian bytes of the
//! three sorted item ids followed by the configured salt. The seed drives a
//! `ChaCha8Rng`, whose output stream is stable across platforms and
//! releases.

use std::sync::Arc;

use gacha_store::{Store, StoreError};
use gacha_types::{ItemId, LevelId, Recipe, RecipeKey};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::SynthesisConfig;
use crate::draw::{Catalog, pick_uniform, pick_weighted};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Errors that can occur while defining or rolling a recipe.
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// An ingredient or result is not in the catalog.
    #[error("unknown item {0}")]
    UnknownItem(ItemId),

    /// A tier that must supply an item has none.
    #[error("no items available in tier {level:?}")]
    EmptyTier {
        /// The empty level, if one could be identified.
        level: Option<LevelId>,
    },

    /// An override supplied a chance outside `[0, 1]`.
    #[error("possibility {0} is outside [0, 1]")]
    InvalidPossibility(f64),

    /// The recipe table could not be read or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A definition plus the outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthesisRoll {
    /// Canonical key of the ingredients.
    pub key: RecipeKey,
    /// The stored definition used.
    pub recipe: Recipe,
    /// Item produced by this attempt.
    pub result: ItemId,
    /// Whether the attempt hit the recipe's chance.
    pub succeeded: bool,
}

/// Seed for a recipe's definition generator.
pub fn recipe_seed(key: RecipeKey, salt: u64) -> u64 {
    key.items()
        .into_iter()
        .flat_map(|id| id.get().to_le_bytes())
        .chain(salt.to_le_bytes())
        .fold(FNV_OFFSET, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
        })
}

fn steps(distance: usize) -> i32 {
    i32::try_from(distance).unwrap_or(i32::MAX)
}

/// Defines recipes on first use and rolls attempts against them.
#[derive(Debug)]
pub struct RecipeSynthesizer<S> {
    store: Arc<S>,
    catalog: Arc<Catalog>,
    rules: SynthesisConfig,
}

impl<S: Store> RecipeSynthesizer<S> {
    /// Create a synthesizer over a recipe store and catalog.
    pub const fn new(store: Arc<S>, catalog: Arc<Catalog>, rules: SynthesisConfig) -> Self {
        Self {
            store,
            catalog,
            rules,
        }
    }

    /// The tuning in effect.
    pub const fn rules(&self) -> &SynthesisConfig {
        &self.rules
    }

    /// Compute the definition a key would get, without touching the store.
    ///
    /// Pure: the same key, catalog and rules always give the same recipe.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError::UnknownItem`] if an ingredient is not in the
    /// catalog, or [`SynthesisError::EmptyTier`] if no tier can supply a
    /// result.
    pub fn derive(&self, key: RecipeKey) -> Result<Recipe, SynthesisError> {
        let mut strongest = 0_usize;
        let mut doomed = false;
        let mut share_sum = 0.0;
        for id in key.items() {
            let item = self.catalog.item(id).ok_or(SynthesisError::UnknownItem(id))?;
            let tier = self
                .catalog
                .tier_of(item.level)
                .ok_or(SynthesisError::UnknownItem(id))?;
            doomed |= tier == 0;
            strongest = strongest.max(tier);
            share_sum += self.catalog.weight_share(item.level);
        }

        if doomed {
            return Ok(Recipe {
                key,
                result: self.junk_item()?,
                possibility: 0.0,
                modified: false,
            });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(recipe_seed(key, self.rules.seed_salt));

        let candidates: Vec<(usize, f64)> = self
            .catalog
            .ranked_levels()
            .enumerate()
            .skip(1)
            .filter(|(_, level)| !self.catalog.items_in_level(level.id).is_empty())
            .map(|(tier, _)| (tier, self.tier_weight(tier, strongest)))
            .collect();
        let tier = pick_weighted(&mut rng, &candidates)
            .or_else(|| {
                candidates
                    .iter()
                    .map(|(tier, _)| *tier)
                    .min_by_key(|tier| tier.abs_diff(strongest))
            })
            .ok_or(SynthesisError::EmptyTier { level: None })?;

        let level = self
            .catalog
            .ranked_levels()
            .nth(tier)
            .map(|l| l.id)
            .ok_or(SynthesisError::EmptyTier { level: None })?;
        let pool = self.catalog.items_in_level(level);
        let result = pick_uniform(&mut rng, &pool)
            .copied()
            .ok_or(SynthesisError::EmptyTier { level: Some(level) })?;

        let up = steps(tier.saturating_sub(strongest));
        let down = steps(strongest.saturating_sub(tier));
        let rarity = 1.0 - share_sum / 3.0;
        let raw = self.rules.base_possibility * self.rules.climb_penalty.powi(up)
            + self.rules.descend_bonus * f64::from(down)
            + self.rules.rarity_bonus * rarity;
        let noise = if self.rules.jitter.is_finite() && self.rules.jitter > 0.0 {
            1.0 + rng.random_range(-self.rules.jitter..=self.rules.jitter)
        } else {
            1.0
        };
        let possibility = (raw * noise)
            .max(self.rules.min_possibility)
            .min(self.rules.max_possibility)
            .max(0.0)
            .min(1.0);

        Ok(Recipe {
            key,
            result,
            possibility,
            modified: false,
        })
    }

    /// The stored recipe for three ingredients, defining it on first use.
    ///
    /// # Errors
    ///
    /// See [`RecipeSynthesizer::lookup`].
    pub async fn define(&self, a: ItemId, b: ItemId, c: ItemId) -> Result<Recipe, SynthesisError> {
        self.lookup(RecipeKey::new(a, b, c)).await
    }

    /// The stored recipe for a key, defining it on first use.
    ///
    /// When another writer stores the key between our read and our insert,
    /// the committed row wins and is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError::Store`] if the store fails, or a derivation
    /// error for a key that has no row yet.
    pub async fn lookup(&self, key: RecipeKey) -> Result<Recipe, SynthesisError> {
        if let Some(recipe) = self.store.get_recipe(key).await? {
            return Ok(recipe);
        }

        let recipe = self.derive(key)?;
        match self.store.insert_recipe(recipe).await {
            Ok(()) => {
                debug!(
                    %key,
                    result = %recipe.result,
                    possibility = recipe.possibility,
                    "Recipe defined"
                );
                Ok(recipe)
            }
            Err(StoreError::Conflict { .. }) => {
                warn!(%key, "Recipe definition race, using the committed definition");
                self.store
                    .get_recipe(key)
                    .await?
                    .ok_or(SynthesisError::Store(StoreError::NotFound { key }))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Pin a recipe's result and chance. Regeneration never touches it again.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError::UnknownItem`] for a result outside the
    /// catalog, [`SynthesisError::InvalidPossibility`] for a chance outside
    /// `[0, 1]`, or [`SynthesisError::Store`] if the write fails.
    pub async fn override_recipe(
        &self,
        key: RecipeKey,
        result: ItemId,
        possibility: f64,
    ) -> Result<Recipe, SynthesisError> {
        if self.catalog.item(result).is_none() {
            return Err(SynthesisError::UnknownItem(result));
        }
        if !(0.0..=1.0).contains(&possibility) {
            return Err(SynthesisError::InvalidPossibility(possibility));
        }

        let recipe = Recipe {
            key,
            result,
            possibility,
            modified: true,
        };
        match self.store.update_recipe(recipe).await {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => match self.store.insert_recipe(recipe).await {
                Ok(()) => {}
                Err(StoreError::Conflict { .. }) => self.store.update_recipe(recipe).await?,
                Err(other) => return Err(other.into()),
            },
            Err(other) => return Err(other.into()),
        }

        info!(%key, %result, possibility, "Recipe overridden");
        Ok(recipe)
    }

    /// Re-derive every generated recipe and store any that changed.
    ///
    /// Overridden rows are left alone. Rows whose ingredients left the
    /// catalog are skipped. Returns the number of rows rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError::Store`] if the store fails, or
    /// [`SynthesisError::EmptyTier`] if the catalog cannot supply results.
    pub async fn reset_generated(&self) -> Result<usize, SynthesisError> {
        let mut rewritten = 0_usize;
        for recipe in self.store.list_recipes().await? {
            if recipe.modified {
                continue;
            }
            let fresh = match self.derive(recipe.key) {
                Ok(fresh) => fresh,
                Err(SynthesisError::UnknownItem(item)) => {
                    warn!(key = %recipe.key, %item, "Skipping recipe with unknown ingredient");
                    continue;
                }
                Err(other) => return Err(other),
            };
            if fresh != recipe {
                self.store.update_recipe(fresh).await?;
                rewritten = rewritten.saturating_add(1);
            }
        }
        info!(rewritten, "Generated recipes reset");
        Ok(rewritten)
    }

    /// Roll one attempt against a definition.
    ///
    /// Success yields the recipe's result. A failure yields the fixed
    /// byproduct with `byproduct_chance`, otherwise a random junk-tier item.
    /// Returns the item and whether the attempt succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`SynthesisError::EmptyTier`] if a failure needs a junk item
    /// and the junk tier is empty.
    pub fn roll<R: Rng + ?Sized>(&self, recipe: &Recipe, rng: &mut R) -> Result<(ItemId, bool), SynthesisError> {
        let r: f64 = rng.random();
        if r < recipe.possibility {
            return Ok((recipe.result, true));
        }
        if rng.random::<f64>() < self.rules.byproduct_chance {
            return Ok((self.byproduct()?, false));
        }
        let junk_level = self.catalog.junk_level().map(|l| l.id);
        let junk = junk_level.map(|l| self.catalog.items_in_level(l)).unwrap_or_default();
        let item = pick_uniform(rng, &junk)
            .copied()
            .ok_or(SynthesisError::EmptyTier { level: junk_level })?;
        Ok((item, false))
    }

    /// Define (or load) the recipe for three ingredients and roll once.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`RecipeSynthesizer::define`] and
    /// [`RecipeSynthesizer::roll`].
    pub async fn synthesize<R: Rng + Send + ?Sized>(
        &self,
        a: ItemId,
        b: ItemId,
        c: ItemId,
        rng: &mut R,
    ) -> Result<SynthesisRoll, SynthesisError> {
        let recipe = self.define(a, b, c).await?;
        let (result, succeeded) = self.roll(&recipe, rng)?;
        debug!(key = %recipe.key, %result, succeeded, "Synthesis rolled");
        Ok(SynthesisRoll {
            key: recipe.key,
            recipe,
            result,
            succeeded,
        })
    }

    fn junk_item(&self) -> Result<ItemId, SynthesisError> {
        if let Some(item) = self.rules.junk_item {
            return Ok(item);
        }
        let level = self.catalog.junk_level().map(|l| l.id);
        level
            .and_then(|l| self.catalog.items_in_level(l).first().copied())
            .ok_or(SynthesisError::EmptyTier { level })
    }

    fn byproduct(&self) -> Result<ItemId, SynthesisError> {
        if let Some(item) = self.rules.byproduct_item {
            return Ok(item);
        }
        self.catalog
            .ranked_levels()
            .nth(1)
            .and_then(|l| self.catalog.items_in_level(l.id).first().copied())
            .map_or_else(|| self.junk_item(), Ok)
    }

    fn tier_weight(&self, tier: usize, strongest: usize) -> f64 {
        let weight = self.rules.tier_decay.powi(steps(tier.abs_diff(strongest)));
        if tier > strongest {
            weight * self.rules.climb_bias
        } else {
            weight
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]
mod tests {
    use gacha_store::MemoryStore;
    use gacha_types::{Item, Level, Source, SourceId};
    use rand::rngs::SmallRng;
    use rust_decimal::Decimal;

    use super::*;
    use crate::draw::CatalogBuilder;

    fn catalog() -> Catalog {
        let levels = [(1, "junk", 50.0, 0), (2, "common", 30.0, 1), (3, "rare", 15.0, 2), (4, "legend", 5.0, 3)];
        let items = [(1, 1), (2, 1), (10, 2), (11, 2), (12, 2), (20, 3), (21, 3), (30, 4)];
        let mut builder = CatalogBuilder::new().source(Source {
            id: SourceId(1),
            name: "base".to_owned(),
            weight: 1.0,
        });
        for (id, name, weight, rank) in levels {
            builder = builder.level(Level {
                id: LevelId(id),
                name: name.to_owned(),
                weight,
                awarding: Decimal::ZERO,
                rank,
            });
        }
        for (id, level) in items {
            builder = builder.item(Item {
                id: ItemId(id),
                level: LevelId(level),
                source: SourceId(1),
                name: format!("item-{id}"),
            });
        }
        builder.build().unwrap()
    }

    fn synthesizer(store: &MemoryStore, rules: SynthesisConfig) -> RecipeSynthesizer<MemoryStore> {
        RecipeSynthesizer::new(Arc::new(store.clone()), Arc::new(catalog()), rules)
    }

    #[test]
    fn seed_depends_on_sorted_ids_and_salt() {
        let key = RecipeKey::new(ItemId(12), ItemId(10), ItemId(11));
        assert_eq!(
            recipe_seed(key, 0),
            recipe_seed(RecipeKey::new(ItemId(11), ItemId(12), ItemId(10)), 0)
        );
        assert_ne!(recipe_seed(key, 0), recipe_seed(key, 1));
        assert_ne!(
            recipe_seed(key, 0),
            recipe_seed(RecipeKey::new(ItemId(10), ItemId(11), ItemId(20)), 0)
        );
    }

    #[test]
    fn empty_input_hashes_to_offset_basis_chain() {
        // FNV-1a of twenty zero bytes, computed step by step.
        let expected = (0..20).fold(FNV_OFFSET, |hash, _| hash.wrapping_mul(FNV_PRIME));
        let key = RecipeKey::new(ItemId(0), ItemId(0), ItemId(0));
        assert_eq!(recipe_seed(key, 0), expected);
    }

    #[tokio::test]
    async fn definition_ignores_ingredient_order() {
        let store = MemoryStore::new();
        let synth = synthesizer(&store, SynthesisConfig::default());
        let first = synth.define(ItemId(20), ItemId(10), ItemId(11)).await.unwrap();
        for (a, b, c) in [(10, 11, 20), (11, 20, 10), (20, 11, 10)] {
            let again = synth.define(ItemId(a), ItemId(b), ItemId(c)).await.unwrap();
            assert_eq!(again, first);
        }
        assert_eq!(store.recipe_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn definition_is_stable_across_stores() {
        let key = RecipeKey::new(ItemId(10), ItemId(12), ItemId(21));
        let one = synthesizer(&MemoryStore::new(), SynthesisConfig::default());
        let two = synthesizer(&MemoryStore::new(), SynthesisConfig::default());
        assert_eq!(one.lookup(key).await.unwrap(), two.lookup(key).await.unwrap());
        assert_eq!(one.derive(key).unwrap(), one.derive(key).unwrap());
    }

    #[test]
    fn generated_chances_respect_bounds() {
        let rules = SynthesisConfig::default();
        let synth = synthesizer(&MemoryStore::new(), rules.clone());
        let pool = [10, 11, 12, 20, 21, 30];
        for a in pool {
            for b in pool {
                for c in pool {
                    let recipe = synth.derive(RecipeKey::new(ItemId(a), ItemId(b), ItemId(c))).unwrap();
                    assert!(recipe.possibility >= rules.min_possibility);
                    assert!(recipe.possibility <= rules.max_possibility);
                    assert!(!recipe.modified);
                    assert_ne!(recipe.result, ItemId(1));
                    assert_ne!(recipe.result, ItemId(2));
                }
            }
        }
    }

    #[test]
    fn junk_ingredient_dooms_recipe() {
        let rules = SynthesisConfig {
            junk_item: Some(ItemId(2)),
            ..SynthesisConfig::default()
        };
        let synth = synthesizer(&MemoryStore::new(), rules);
        let recipe = synth
            .derive(RecipeKey::new(ItemId(30), ItemId(30), ItemId(1)))
            .unwrap();
        assert!(recipe.is_doomed());
        assert_eq!(recipe.result, ItemId(2));

        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..200 {
            let (_, succeeded) = synth.roll(&recipe, &mut rng).unwrap();
            assert!(!succeeded);
        }
    }

    #[test]
    fn unknown_ingredient_is_rejected() {
        let synth = synthesizer(&MemoryStore::new(), SynthesisConfig::default());
        let err = synth
            .derive(RecipeKey::new(ItemId(10), ItemId(11), ItemId(999)))
            .unwrap_err();
        assert!(matches!(err, SynthesisError::UnknownItem(ItemId(999))));
    }

    #[test]
    fn success_rate_matches_possibility() {
        let synth = synthesizer(&MemoryStore::new(), SynthesisConfig::default());
        let recipe = Recipe {
            key: RecipeKey::new(ItemId(10), ItemId(11), ItemId(12)),
            result: ItemId(20),
            possibility: 0.3,
            modified: false,
        };
        let mut rng = SmallRng::seed_from_u64(11);
        let trials = 20_000_u32;
        let mut hits = 0_u32;
        for _ in 0..trials {
            let (item, succeeded) = synth.roll(&recipe, &mut rng).unwrap();
            if succeeded {
                assert_eq!(item, ItemId(20));
                hits += 1;
            } else {
                assert!([ItemId(10), ItemId(1), ItemId(2)].contains(&item));
            }
        }
        let rate = f64::from(hits) / f64::from(trials);
        assert!((rate - 0.3).abs() < 0.02, "rate {rate}");
    }

    #[test]
    fn failures_mostly_yield_the_default_byproduct() {
        let rules = SynthesisConfig::default();
        assert!((rules.byproduct_chance - 0.9).abs() < f64::EPSILON);
        let synth = synthesizer(&MemoryStore::new(), rules);
        let recipe = Recipe {
            key: RecipeKey::new(ItemId(10), ItemId(11), ItemId(12)),
            result: ItemId(20),
            possibility: 0.0,
            modified: false,
        };
        let mut rng = SmallRng::seed_from_u64(17);
        let trials = 10_000_u32;
        let mut byproducts = 0_u32;
        for _ in 0..trials {
            let (item, succeeded) = synth.roll(&recipe, &mut rng).unwrap();
            assert!(!succeeded);
            if item == ItemId(10) {
                byproducts += 1;
            } else {
                assert!(item == ItemId(1) || item == ItemId(2), "garbage {item}");
            }
        }
        let share = f64::from(byproducts) / f64::from(trials);
        assert!((share - 0.9).abs() < 0.02, "byproduct share {share}");
    }

    #[test]
    fn failures_yield_byproduct_when_configured() {
        let rules = SynthesisConfig {
            byproduct_item: Some(ItemId(12)),
            byproduct_chance: 1.0,
            ..SynthesisConfig::default()
        };
        let synth = synthesizer(&MemoryStore::new(), rules);
        let recipe = Recipe {
            key: RecipeKey::new(ItemId(10), ItemId(11), ItemId(1)),
            result: ItemId(1),
            possibility: 0.0,
            modified: false,
        };
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..100 {
            assert_eq!(synth.roll(&recipe, &mut rng).unwrap(), (ItemId(12), false));
        }
    }

    #[tokio::test]
    async fn override_survives_reset() {
        let store = MemoryStore::new();
        let synth = synthesizer(&store, SynthesisConfig::default());
        let pinned = RecipeKey::new(ItemId(10), ItemId(11), ItemId(12));
        let generated = RecipeKey::new(ItemId(20), ItemId(21), ItemId(30));
        synth.lookup(pinned).await.unwrap();
        let before = synth.lookup(generated).await.unwrap();

        let overridden = synth.override_recipe(pinned, ItemId(30), 0.9).await.unwrap();
        assert!(overridden.modified);

        // A different salt reshuffles generated rows on reset.
        let salted = synthesizer(
            &store,
            SynthesisConfig {
                seed_salt: 1234,
                ..SynthesisConfig::default()
            },
        );
        let expected = salted.derive(generated).unwrap();
        let rewritten = salted.reset_generated().await.unwrap();
        assert_eq!(rewritten, usize::from(expected != before));

        assert_eq!(salted.lookup(pinned).await.unwrap(), overridden);
        assert_eq!(salted.lookup(generated).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn override_validates_input() {
        let synth = synthesizer(&MemoryStore::new(), SynthesisConfig::default());
        let key = RecipeKey::new(ItemId(10), ItemId(11), ItemId(12));
        assert!(matches!(
            synth.override_recipe(key, ItemId(404), 0.5).await,
            Err(SynthesisError::UnknownItem(_))
        ));
        assert!(matches!(
            synth.override_recipe(key, ItemId(20), 1.5).await,
            Err(SynthesisError::InvalidPossibility(_))
        ));
    }

    /// Hides existing rows from the first read, as a concurrent writer would.
    #[derive(Debug, Clone)]
    struct StaleStore {
        inner: MemoryStore,
        stale_reads: Arc<std::sync::atomic::AtomicU32>,
    }

    impl Store for StaleStore {
        type Tx = gacha_store::MemoryTransaction;

        async fn begin(&self) -> Result<Self::Tx, StoreError> {
            self.inner.begin().await
        }

        async fn get_recipe(&self, key: RecipeKey) -> Result<Option<Recipe>, StoreError> {
            let remaining = self.stale_reads.load(std::sync::atomic::Ordering::SeqCst);
            if remaining > 0 {
                self.stale_reads
                    .store(remaining - 1, std::sync::atomic::Ordering::SeqCst);
                return Ok(None);
            }
            self.inner.get_recipe(key).await
        }

        async fn insert_recipe(&self, recipe: Recipe) -> Result<(), StoreError> {
            self.inner.insert_recipe(recipe).await
        }

        async fn update_recipe(&self, recipe: Recipe) -> Result<(), StoreError> {
            self.inner.update_recipe(recipe).await
        }

        async fn list_recipes(&self) -> Result<Vec<Recipe>, StoreError> {
            self.inner.list_recipes().await
        }
    }

    #[tokio::test]
    async fn definition_race_returns_committed_row() {
        let inner = MemoryStore::new();
        let key = RecipeKey::new(ItemId(10), ItemId(20), ItemId(30));
        let winner = Recipe {
            key,
            result: ItemId(11),
            possibility: 0.42,
            modified: false,
        };
        inner.insert_recipe(winner).await.unwrap();

        let store = StaleStore {
            inner: inner.clone(),
            stale_reads: Arc::new(std::sync::atomic::AtomicU32::new(1)),
        };
        let synth = RecipeSynthesizer::new(Arc::new(store), Arc::new(catalog()), SynthesisConfig::default());
        assert_eq!(synth.lookup(key).await.unwrap(), winner);
        assert_eq!(inner.recipe_count().unwrap(), 1);
    }

    /// Lets another writer insert the row between a missed update and the
    /// follow-up insert.
    #[derive(Debug, Clone)]
    struct RacingStore {
        inner: MemoryStore,
        rival: Recipe,
        updates: Arc<std::sync::atomic::AtomicU32>,
        inserts: Arc<std::sync::atomic::AtomicU32>,
    }

    impl Store for RacingStore {
        type Tx = gacha_store::MemoryTransaction;

        async fn begin(&self) -> Result<Self::Tx, StoreError> {
            self.inner.begin().await
        }

        async fn get_recipe(&self, key: RecipeKey) -> Result<Option<Recipe>, StoreError> {
            self.inner.get_recipe(key).await
        }

        async fn insert_recipe(&self, recipe: Recipe) -> Result<(), StoreError> {
            self.inserts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.insert_recipe(recipe).await
        }

        async fn update_recipe(&self, recipe: Recipe) -> Result<(), StoreError> {
            let seen = self.updates.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if seen == 0 {
                self.inner.insert_recipe(self.rival).await?;
                return Err(StoreError::NotFound { key: recipe.key });
            }
            self.inner.update_recipe(recipe).await
        }

        async fn list_recipes(&self) -> Result<Vec<Recipe>, StoreError> {
            self.inner.list_recipes().await
        }
    }

    #[tokio::test]
    async fn override_recovers_from_concurrent_insert() {
        let inner = MemoryStore::new();
        let key = RecipeKey::new(ItemId(10), ItemId(11), ItemId(20));
        let store = RacingStore {
            inner: inner.clone(),
            rival: Recipe {
                key,
                result: ItemId(12),
                possibility: 0.33,
                modified: false,
            },
            updates: Arc::default(),
            inserts: Arc::default(),
        };
        let synth = RecipeSynthesizer::new(
            Arc::new(store.clone()),
            Arc::new(catalog()),
            SynthesisConfig::default(),
        );

        let overridden = synth.override_recipe(key, ItemId(30), 0.75).await.unwrap();
        assert!(overridden.modified);
        assert_eq!(overridden.result, ItemId(30));

        let stored = inner.get_recipe(key).await.unwrap().unwrap();
        assert_eq!(stored, overridden);
        assert_eq!(inner.recipe_count().unwrap(), 1);
        assert_eq!(store.updates.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(store.inserts.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn synthesize_defines_then_rolls() {
        let store = MemoryStore::new();
        let synth = synthesizer(&store, SynthesisConfig::default());
        let mut rng = SmallRng::seed_from_u64(8);
        let roll = synth
            .synthesize(ItemId(21), ItemId(20), ItemId(30), &mut rng)
            .await
            .unwrap();
        assert_eq!(roll.key, RecipeKey::new(ItemId(20), ItemId(21), ItemId(30)));
        if roll.succeeded {
            assert_eq!(roll.result, roll.recipe.result);
        }
        assert_eq!(store.recipe_count().unwrap(), 1);
    }
}
