//! Transient outcome value objects handed to the presentation layer.
//!
//! Outcomes are produced once per operation and never persisted. They
//! describe what changed, not how to render it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::{ItemId, UserId};

/// Net change of one item in one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ItemDelta {
    /// The item that changed.
    pub item: ItemId,
    /// Signed change in storage count.
    pub count: i64,
    /// Whether the user held none of this item before the operation.
    pub was_new: bool,
}

/// Fold a change into an aggregated delta list.
///
/// Deltas for the same item are summed; `was_new` sticks once set. The list
/// keeps first-seen order so the presentation layer shows draws in sequence.
pub fn accumulate(deltas: &mut Vec<ItemDelta>, item: ItemId, count: i64, was_new: bool) {
    if let Some(existing) = deltas.iter_mut().find(|d| d.item == item) {
        existing.count = existing.count.saturating_add(count);
        existing.was_new |= was_new;
    } else {
        deltas.push(ItemDelta {
            item,
            count,
            was_new,
        });
    }
}

/// Result of a batch of draws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct DrawOutcome {
    /// The user who drew.
    pub user: UserId,
    /// Individual picks, in draw order.
    pub picks: Vec<ItemId>,
    /// Aggregated per-item changes (including bonus grants).
    pub deltas: Vec<ItemDelta>,
    /// Currency gained.
    #[ts(as = "String")]
    pub currency_delta: Decimal,
    /// Slots spent by this batch.
    pub slots_consumed: u32,
    /// Slots left after the batch.
    pub slots_remaining: u32,
    /// Seconds until the next slot regenerates (0 when full or instant).
    pub seconds_to_next: f64,
}

impl DrawOutcome {
    /// An outcome with no draws.
    pub const fn empty(user: UserId, slots_remaining: u32, seconds_to_next: f64) -> Self {
        Self {
            user,
            picks: Vec::new(),
            deltas: Vec::new(),
            currency_delta: Decimal::ZERO,
            slots_consumed: 0,
            slots_remaining,
            seconds_to_next,
        }
    }

    /// Whether nothing was drawn.
    pub fn is_empty(&self) -> bool {
        self.picks.is_empty()
    }
}

/// Result of one synthesis attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SynthesisOutcome {
    /// The user who synthesized.
    pub user: UserId,
    /// Ingredients in the order the user supplied them.
    pub ingredients: [ItemId; 3],
    /// Item produced (the recipe result on success, a byproduct otherwise).
    pub result: ItemId,
    /// Whether the attempt hit the recipe's possibility.
    pub succeeded: bool,
    /// The recipe's success probability.
    pub possibility: f64,
    /// Aggregated per-item changes (ingredients consumed, result added, bonuses).
    pub deltas: Vec<ItemDelta>,
    /// Currency gained from bonus grants.
    #[ts(as = "String")]
    pub currency_delta: Decimal,
    /// Slots spent (synthesis does not consume slots).
    pub slots_consumed: u32,
    /// Slots available after the operation.
    pub slots_remaining: u32,
    /// Seconds until the next slot regenerates.
    pub seconds_to_next: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_sums_same_item() {
        let mut deltas = Vec::new();
        accumulate(&mut deltas, ItemId(1), 1, true);
        accumulate(&mut deltas, ItemId(2), 1, false);
        accumulate(&mut deltas, ItemId(1), 1, false);
        assert_eq!(deltas.len(), 2);
        assert_eq!(
            deltas.first().copied(),
            Some(ItemDelta {
                item: ItemId(1),
                count: 2,
                was_new: true
            })
        );
    }

    #[test]
    fn accumulate_handles_negative_counts() {
        let mut deltas = Vec::new();
        accumulate(&mut deltas, ItemId(5), -1, false);
        accumulate(&mut deltas, ItemId(5), -1, false);
        assert_eq!(deltas.first().map(|d| d.count), Some(-2));
    }

    #[test]
    fn empty_outcome_has_no_picks() {
        let outcome = DrawOutcome::empty(UserId::new(), 0, 12.5);
        assert!(outcome.is_empty());
        assert_eq!(outcome.slots_consumed, 0);
    }
}
