//! Weighted draw resolution.
//!
//! A draw picks a level proportionally to level weight, then a source
//! proportionally to source weight among the sources that contribute to that
//! level, then an item uniformly within that source and level. Picking is
//! pure; [`DrawEngine::settle`] applies a batch of picks to capacity and
//! inventory in order so later picks see earlier ones.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use gacha_types::{
    CapacityState, InventoryCounter, Item, ItemDelta, ItemId, Level, LevelId, Source, SourceId,
    accumulate,
};
use rand::Rng;
use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while resolving draws.
#[derive(Debug, thiserror::Error)]
pub enum DrawError {
    /// No level has positive weight and at least one item.
    #[error("nothing available to draw")]
    NoCandidates,

    /// An exact draw count exceeds the available slots.
    #[error("requested {requested} draws but only {available} slots are available")]
    InsufficientSlots {
        /// Draws asked for.
        requested: u32,
        /// Slots the user holds.
        available: u32,
    },

    /// A counter or currency total would overflow.
    #[error("arithmetic overflow while settling draws")]
    Overflow,
}

/// Inconsistencies found while building a [`Catalog`].
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Two levels share an id.
    #[error("duplicate level {0}")]
    DuplicateLevel(LevelId),

    /// Two sources share an id.
    #[error("duplicate source {0}")]
    DuplicateSource(SourceId),

    /// Two items share an id.
    #[error("duplicate item {0}")]
    DuplicateItem(ItemId),

    /// A weight is negative, infinite or NaN.
    #[error("invalid weight {weight} on {owner}")]
    InvalidWeight {
        /// Name of the level or source carrying the weight.
        owner: String,
        /// The offending weight.
        weight: f64,
    },

    /// An item refers to a level that does not exist.
    #[error("item {item} refers to unknown level {level}")]
    UnknownLevel {
        /// The item.
        item: ItemId,
        /// The missing level.
        level: LevelId,
    },

    /// An item refers to a source that does not exist.
    #[error("item {item} refers to unknown source {source_id}")]
    UnknownSource {
        /// The item.
        item: ItemId,
        /// The missing source.
        source_id: SourceId,
    },
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A validated, indexed set of levels, sources and items.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    levels: BTreeMap<LevelId, Level>,
    sources: BTreeMap<SourceId, Source>,
    items: BTreeMap<ItemId, Item>,
    /// level -> source -> items, all ascending by id.
    pools: BTreeMap<LevelId, BTreeMap<SourceId, Vec<ItemId>>>,
    /// Levels ascending by (rank, id). The first one is the junk tier.
    ranked: Vec<LevelId>,
    /// Levels that can be drawn, with their weights.
    drawable: Vec<(LevelId, f64)>,
    total_weight: f64,
}

impl Catalog {
    /// Look up a level.
    pub fn level(&self, id: LevelId) -> Option<&Level> {
        self.levels.get(&id)
    }

    /// Look up a source.
    pub fn source(&self, id: SourceId) -> Option<&Source> {
        self.sources.get(&id)
    }

    /// Look up an item.
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id)
    }

    /// All items, ascending by id.
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    /// Levels ordered from most common (junk) to rarest.
    pub fn ranked_levels(&self) -> impl Iterator<Item = &Level> {
        self.ranked.iter().filter_map(|id| self.levels.get(id))
    }

    /// Position of a level in the rank order (0 is the junk tier).
    pub fn tier_of(&self, level: LevelId) -> Option<usize> {
        self.ranked.iter().position(|id| *id == level)
    }

    /// The level with the lowest rank.
    pub fn junk_level(&self) -> Option<&Level> {
        self.ranked.first().and_then(|id| self.levels.get(id))
    }

    /// Every item of a level across all sources, ascending by id.
    pub fn items_in_level(&self, level: LevelId) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self
            .pools
            .get(&level)
            .into_iter()
            .flat_map(BTreeMap::values)
            .flatten()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    /// A level's share of the total level weight, in `[0, 1]`.
    pub fn weight_share(&self, level: LevelId) -> f64 {
        if self.total_weight <= 0.0 {
            return 0.0;
        }
        self.levels
            .get(&level)
            .map_or(0.0, |l| l.weight / self.total_weight)
    }

    fn pool(&self, level: LevelId) -> Option<&BTreeMap<SourceId, Vec<ItemId>>> {
        self.pools.get(&level)
    }
}

/// Collects catalog entries and validates them into a [`Catalog`].
#[derive(Debug, Clone, Default)]
pub struct CatalogBuilder {
    levels: Vec<Level>,
    sources: Vec<Source>,
    items: Vec<Item>,
}

impl CatalogBuilder {
    /// Start an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a level.
    #[must_use]
    pub fn level(mut self, level: Level) -> Self {
        self.levels.push(level);
        self
    }

    /// Add a source.
    #[must_use]
    pub fn source(mut self, source: Source) -> Self {
        self.sources.push(source);
        self
    }

    /// Add an item.
    #[must_use]
    pub fn item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    /// Validate references and weights, then index.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] for duplicate ids, invalid weights, or
    /// items pointing at missing levels or sources.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        let mut catalog = Catalog::default();

        for level in self.levels {
            check_weight(&level.name, level.weight)?;
            if catalog.levels.contains_key(&level.id) {
                return Err(CatalogError::DuplicateLevel(level.id));
            }
            catalog.levels.insert(level.id, level);
        }
        for source in self.sources {
            check_weight(&source.name, source.weight)?;
            if catalog.sources.contains_key(&source.id) {
                return Err(CatalogError::DuplicateSource(source.id));
            }
            catalog.sources.insert(source.id, source);
        }
        for item in self.items {
            if !catalog.levels.contains_key(&item.level) {
                return Err(CatalogError::UnknownLevel {
                    item: item.id,
                    level: item.level,
                });
            }
            if !catalog.sources.contains_key(&item.source) {
                return Err(CatalogError::UnknownSource {
                    item: item.id,
                    source_id: item.source,
                });
            }
            if catalog.items.contains_key(&item.id) {
                return Err(CatalogError::DuplicateItem(item.id));
            }
            catalog.items.insert(item.id, item);
        }

        // Items iterate in id order, so every pool ends up sorted.
        for item in catalog.items.values() {
            catalog
                .pools
                .entry(item.level)
                .or_default()
                .entry(item.source)
                .or_default()
                .push(item.id);
        }

        let mut ranked: Vec<&Level> = catalog.levels.values().collect();
        ranked.sort_by_key(|l| (l.rank, l.id));
        catalog.ranked = ranked.iter().map(|l| l.id).collect();

        catalog.drawable = catalog
            .levels
            .values()
            .filter(|l| l.weight > 0.0 && catalog.pools.contains_key(&l.id))
            .map(|l| (l.id, l.weight))
            .collect();
        catalog.total_weight = catalog.levels.values().map(|l| l.weight).sum();

        tracing::debug!(
            levels = catalog.levels.len(),
            sources = catalog.sources.len(),
            items = catalog.items.len(),
            drawable = catalog.drawable.len(),
            "Catalog built"
        );
        Ok(catalog)
    }
}

fn check_weight(owner: &str, weight: f64) -> Result<(), CatalogError> {
    if weight.is_finite() && weight >= 0.0 {
        Ok(())
    } else {
        Err(CatalogError::InvalidWeight {
            owner: owner.to_owned(),
            weight,
        })
    }
}

// ---------------------------------------------------------------------------
// Random selection helpers
// ---------------------------------------------------------------------------

/// Pick a value with probability proportional to its weight.
///
/// Returns `None` when no entry has positive weight.
pub(crate) fn pick_weighted<T: Copy, R: Rng + ?Sized>(rng: &mut R, entries: &[(T, f64)]) -> Option<T> {
    let total: f64 = entries.iter().map(|(_, w)| w.max(0.0)).sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }
    let mut roll = rng.random_range(0.0..total);
    for &(value, weight) in entries {
        let weight = weight.max(0.0);
        if roll < weight {
            return Some(value);
        }
        roll -= weight;
    }
    // Rounding can leave a sliver past the last bucket.
    entries
        .iter()
        .rev()
        .find(|(_, w)| *w > 0.0)
        .map(|(value, _)| *value)
}

/// Pick an element uniformly.
pub(crate) fn pick_uniform<'a, T, R: Rng + ?Sized>(rng: &mut R, values: &'a [T]) -> Option<&'a T> {
    if values.is_empty() {
        return None;
    }
    values.get(rng.random_range(0..values.len()))
}

// ---------------------------------------------------------------------------
// Draw count
// ---------------------------------------------------------------------------

/// How many draws a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawCount {
    /// Draw until capacity is exhausted.
    Drain,
    /// Draw up to this many, capped by capacity.
    AtMost(u32),
    /// Draw exactly this many or fail.
    Exactly(u32),
}

impl DrawCount {
    /// Interpret a raw command argument: negative values mean drain.
    pub fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            Self::Drain
        } else {
            Self::AtMost(u32::try_from(raw).unwrap_or(u32::MAX))
        }
    }

    /// Number of draws to perform given `available` slots.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::InsufficientSlots`] for an exact count above
    /// `available`.
    pub const fn resolve(self, available: u32) -> Result<u32, DrawError> {
        match self {
            Self::Drain => Ok(available),
            Self::AtMost(n) => Ok(if n < available { n } else { available }),
            Self::Exactly(n) => {
                if n > available {
                    Err(DrawError::InsufficientSlots {
                        requested: n,
                        available,
                    })
                } else {
                    Ok(n)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// One resolved draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pick {
    /// The item drawn.
    pub item: ItemId,
    /// The level chosen in the first stage.
    pub level: LevelId,
    /// The source chosen in the second stage.
    pub source: SourceId,
}

/// Aggregated effect of a batch of picks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settlement {
    /// Per-item storage changes in first-drawn order.
    pub deltas: Vec<ItemDelta>,
    /// Currency earned (level awards plus first-time bonuses).
    pub currency: Decimal,
    /// Slots spent.
    pub consumed: u32,
}

impl Settlement {
    /// Items the user held none of before the batch.
    pub fn new_items(&self) -> Vec<ItemId> {
        self.deltas
            .iter()
            .filter(|d| d.was_new)
            .map(|d| d.item)
            .collect()
    }
}

/// Resolves draws against a [`Catalog`].
#[derive(Debug, Clone)]
pub struct DrawEngine {
    catalog: Arc<Catalog>,
    first_time_bonus: Decimal,
}

impl DrawEngine {
    /// Create an engine over `catalog`.
    pub const fn new(catalog: Arc<Catalog>, first_time_bonus: Decimal) -> Self {
        Self {
            catalog,
            first_time_bonus,
        }
    }

    /// The catalog draws resolve against.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Resolve a single draw.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::NoCandidates`] if no level is drawable.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Pick, DrawError> {
        let level = pick_weighted(rng, &self.catalog.drawable).ok_or(DrawError::NoCandidates)?;
        let pool = self.catalog.pool(level).ok_or(DrawError::NoCandidates)?;

        let sources: Vec<(SourceId, f64)> = pool
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(id, _)| (*id, self.catalog.source(*id).map_or(0.0, |s| s.weight)))
            .collect();
        let source = pick_weighted(rng, &sources)
            .or_else(|| pick_uniform(rng, &sources).map(|(id, _)| *id))
            .ok_or(DrawError::NoCandidates)?;

        let item = pool
            .get(&source)
            .and_then(|items| pick_uniform(rng, items))
            .copied()
            .ok_or(DrawError::NoCandidates)?;

        tracing::debug!(%item, %level, %source, "Draw resolved");
        Ok(Pick {
            item,
            level,
            source,
        })
    }

    /// Resolve the picks for a request without touching any state.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::InsufficientSlots`] for an exact count above
    /// the available slots, or [`DrawError::NoCandidates`] if at least one
    /// draw is due and nothing is drawable.
    pub fn plan<R: Rng + ?Sized>(
        &self,
        count: DrawCount,
        capacity: &CapacityState,
        rng: &mut R,
    ) -> Result<Vec<Pick>, DrawError> {
        let n = count.resolve(capacity.slot_remaining)?;
        (0..n).map(|_| self.pick(rng)).collect()
    }

    /// Currency earned by one pick.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::Overflow`] if the sum overflows.
    pub fn award(&self, pick: &Pick, first_time: bool) -> Result<Decimal, DrawError> {
        let base = self
            .catalog
            .level(pick.level)
            .map_or(Decimal::ZERO, |l| l.awarding);
        if first_time {
            base.checked_add(self.first_time_bonus).ok_or(DrawError::Overflow)
        } else {
            Ok(base)
        }
    }

    /// Apply picks in order: one slot each, one copy each, currency summed.
    ///
    /// `inventory` must hold the user's current counters for the picked
    /// items; missing entries count as untouched. A pick is new when the
    /// storage was zero right before it, so a repeated item earns the
    /// first-time bonus at most once per batch.
    ///
    /// # Errors
    ///
    /// Returns [`DrawError::InsufficientSlots`] if the picks outnumber the
    /// slots, or [`DrawError::Overflow`] on counter or currency overflow.
    pub fn settle(
        &self,
        picks: &[Pick],
        capacity: &mut CapacityState,
        inventory: &mut BTreeMap<ItemId, InventoryCounter>,
    ) -> Result<Settlement, DrawError> {
        let requested = u32::try_from(picks.len()).unwrap_or(u32::MAX);
        if requested > capacity.slot_remaining {
            return Err(DrawError::InsufficientSlots {
                requested,
                available: capacity.slot_remaining,
            });
        }

        let mut settlement = Settlement::default();
        for pick in picks {
            let counter = inventory.entry(pick.item).or_default();
            let was_new = counter.storage == 0;
            counter.storage = counter.storage.checked_add(1).ok_or(DrawError::Overflow)?;

            let award = self.award(pick, was_new)?;
            settlement.currency = settlement
                .currency
                .checked_add(award)
                .ok_or(DrawError::Overflow)?;
            settlement.consumed = settlement.consumed.saturating_add(1);
            capacity.slot_remaining = capacity.slot_remaining.saturating_sub(1);
            accumulate(&mut settlement.deltas, pick.item, 1, was_new);
        }
        Ok(settlement)
    }

    /// Distinct items among `picks`, ascending.
    pub fn distinct_items(picks: &[Pick]) -> BTreeSet<ItemId> {
        picks.iter().map(|p| p.item).collect()
    }
}
