//! Core entity structs for the gacha economy.
//!
//! Covers the catalog (`Level`, `Source`, `Item`), per-user state
//! (`UserState`, `CapacityState`, `InventoryCounter`) and memoized recipe
//! definitions (`RecipeKey`, `Recipe`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{ItemId, LevelId, SourceId, UserId};

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

/// Draw capacity of a single user.
///
/// Slots regenerate one per `regen_interval` seconds up to `slot_max`. An
/// interval of zero means capacity is always full. Timestamps are Unix
/// seconds as `f64` so sub-second remainders survive between calculations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CapacityState {
    /// Maximum number of slots the user can hold.
    pub slot_max: u32,
    /// Slots currently available (`0..=slot_max` after every calculation).
    pub slot_remaining: u32,
    /// Timestamp (seconds) up to which regeneration has been accounted for.
    pub last_calc: f64,
    /// Seconds per regenerated slot; `0.0` means instant-full.
    pub regen_interval: f64,
}

impl CapacityState {
    /// Create a full capacity state anchored at `now`.
    pub const fn full(slot_max: u32, regen_interval: f64, now: f64) -> Self {
        Self {
            slot_max,
            slot_remaining: slot_max,
            last_calc: now,
            regen_interval,
        }
    }

    /// Whether the user holds at least `slot_max` slots.
    pub const fn is_full(&self) -> bool {
        self.slot_remaining >= self.slot_max
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Persisted state of a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct UserState {
    /// Internal identifier.
    pub id: UserId,
    /// Identity assigned by the chat platform.
    pub external_id: String,
    /// Draw capacity.
    pub capacity: CapacityState,
    /// Currency balance.
    #[ts(as = "String")]
    pub money: Decimal,
    /// Achievement milestones already paid out, counted from the smallest.
    #[serde(default)]
    pub milestones_reached: u32,
}

/// Storage and usage counts of one item for one user.
///
/// Created lazily (all zero) the first time a user touches the item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct InventoryCounter {
    /// Copies currently held.
    pub storage: u32,
    /// Copies consumed (e.g. as synthesis ingredients).
    pub used: u32,
}

impl InventoryCounter {
    /// Whether the user has ever owned a copy.
    pub const fn ever_held(&self) -> bool {
        self.storage > 0 || self.used > 0
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A rarity tier.
///
/// `rank` is the sorting priority: higher ranks are rarer, and the level
/// with the lowest rank is the junk tier used by synthesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Level {
    /// Level identifier.
    pub id: LevelId,
    /// Display name (e.g. "SSR").
    pub name: String,
    /// Relative draw weight. Zero means the level is never drawn implicitly.
    pub weight: f64,
    /// Currency awarded for every draw that lands on this level.
    #[ts(as = "String")]
    #[serde(default)]
    pub awarding: Decimal,
    /// Sorting priority; lower is more common.
    pub rank: u32,
}

/// A pool contributing items to levels (base pool, promotional pool, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Source {
    /// Source identifier.
    pub id: SourceId,
    /// Display name.
    pub name: String,
    /// Relative weight among the sources of a chosen level.
    pub weight: f64,
}

/// A collectible item (award).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Item {
    /// Item identifier.
    pub id: ItemId,
    /// Level the item belongs to.
    pub level: LevelId,
    /// Source pool the item is drawn from.
    pub source: SourceId,
    /// Display name.
    pub name: String,
}

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

/// Canonical, order-independent key of a three-ingredient combination.
///
/// The ids are always stored in ascending order, so any permutation of the
/// same three items produces an equal key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct RecipeKey([ItemId; 3]);

impl RecipeKey {
    /// Build the canonical key for three ingredients in any order.
    pub fn new(a: ItemId, b: ItemId, c: ItemId) -> Self {
        let mut ids = [a, b, c];
        ids.sort_unstable();
        Self(ids)
    }

    /// The ingredients in ascending order.
    pub const fn items(&self) -> [ItemId; 3] {
        self.0
    }
}

impl From<[ItemId; 3]> for RecipeKey {
    fn from([a, b, c]: [ItemId; 3]) -> Self {
        Self::new(a, b, c)
    }
}

impl core::fmt::Display for RecipeKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a}+{b}+{c}")
    }
}

/// The memoized definition of a recipe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Recipe {
    /// Canonical ingredient triple.
    pub key: RecipeKey,
    /// Item minted when an attempt succeeds.
    pub result: ItemId,
    /// Success probability in `[0, 1]`.
    pub possibility: f64,
    /// Set by an administrator override; automated regeneration skips it.
    pub modified: bool,
}

impl Recipe {
    /// A recipe with at least one junk ingredient: it can never succeed.
    pub const fn is_doomed(&self) -> bool {
        self.possibility <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipe_key_is_order_independent() {
        let (a, b, c) = (ItemId(7), ItemId(3), ItemId(11));
        let k1 = RecipeKey::new(a, b, c);
        assert_eq!(k1, RecipeKey::new(b, a, c));
        assert_eq!(k1, RecipeKey::new(c, b, a));
        assert_eq!(k1, RecipeKey::new(c, a, b));
        assert_eq!(k1.items(), [ItemId(3), ItemId(7), ItemId(11)]);
    }

    #[test]
    fn recipe_key_keeps_duplicates() {
        let key = RecipeKey::from([ItemId(4), ItemId(1), ItemId(4)]);
        assert_eq!(key.items(), [ItemId(1), ItemId(4), ItemId(4)]);
        assert_eq!(key.to_string(), "1+4+4");
    }

    #[test]
    fn full_capacity_is_full() {
        let cap = CapacityState::full(3, 3600.0, 100.0);
        assert!(cap.is_full());
        assert_eq!(cap.slot_remaining, 3);
    }

    #[test]
    fn counter_defaults_to_zero() {
        let counter = InventoryCounter::default();
        assert_eq!(counter.storage, 0);
        assert_eq!(counter.used, 0);
        assert!(!counter.ever_held());
        assert!(InventoryCounter { storage: 0, used: 1 }.ever_held());
    }
}
