//! Game events published by the service.
//!
//! Kind tree:
//!
//! ```text
//! gacha
//! +-- gacha.capacity
//! |   +-- gacha.capacity.regenerated   (thrown)
//! +-- gacha.draw
//! |   +-- gacha.draw.resolved          (emitted inside the transaction)
//! |   +-- gacha.draw.announced         (thrown)
//! +-- gacha.synthesis
//!     +-- gacha.synthesis.resolved     (emitted inside the transaction)
//!     +-- gacha.synthesis.announced    (thrown)
//! ```
//!
//! `*Resolved` events carry a [`BonusGrants`] sink. Handlers deposit extra
//! items or currency there and the service applies them before commit, so
//! bonuses are atomic with the operation that earned them.

use std::sync::{Mutex, PoisonError};

use gacha_events::{Event, EventKind};
use gacha_types::{DrawOutcome, ItemId, RecipeKey, SynthesisOutcome, UserId};
use rust_decimal::Decimal;

/// Root of all gacha events.
pub const GACHA: EventKind = EventKind::child("gacha", &EventKind::ANY);
/// Capacity events.
pub const CAPACITY: EventKind = EventKind::child("gacha.capacity", &GACHA);
/// Slots regenerated for a user.
pub const CAPACITY_REGENERATED: EventKind = EventKind::child("gacha.capacity.regenerated", &CAPACITY);
/// Draw events.
pub const DRAW: EventKind = EventKind::child("gacha.draw", &GACHA);
/// A draw batch was settled (in-transaction).
pub const DRAW_RESOLVED: EventKind = EventKind::child("gacha.draw.resolved", &DRAW);
/// A draw batch is about to be committed (fire-and-forget).
pub const DRAW_ANNOUNCED: EventKind = EventKind::child("gacha.draw.announced", &DRAW);
/// Synthesis events.
pub const SYNTHESIS: EventKind = EventKind::child("gacha.synthesis", &GACHA);
/// A synthesis attempt was settled (in-transaction).
pub const SYNTHESIS_RESOLVED: EventKind = EventKind::child("gacha.synthesis.resolved", &SYNTHESIS);
/// A synthesis attempt is about to be committed (fire-and-forget).
pub const SYNTHESIS_ANNOUNCED: EventKind = EventKind::child("gacha.synthesis.announced", &SYNTHESIS);

/// Extra rewards granted by handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grants {
    /// Items to add, in grant order.
    pub items: Vec<(ItemId, u32)>,
    /// Currency to add.
    pub currency: Decimal,
    /// New count of paid-out achievement milestones, if it advanced.
    pub milestones_reached: Option<u32>,
}

impl Grants {
    /// Whether nothing was granted.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.currency.is_zero() && self.milestones_reached.is_none()
    }
}

/// Shared sink for [`Grants`].
#[derive(Debug, Default)]
pub struct BonusGrants {
    inner: Mutex<Grants>,
}

impl BonusGrants {
    /// Grant `count` copies of `item`.
    pub fn grant_item(&self, item: ItemId, count: u32) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .items
            .push((item, count));
    }

    /// Grant currency.
    ///
    /// # Errors
    ///
    /// Fails if the running total would overflow.
    pub fn grant_currency(&self, amount: Decimal) -> anyhow::Result<()> {
        let mut grants = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        grants.currency = grants
            .currency
            .checked_add(amount)
            .ok_or_else(|| anyhow::anyhow!("currency grant overflow"))?;
        Ok(())
    }

    /// Record that the first `reached` milestones are now paid out.
    /// Never moves backwards.
    pub fn reach_milestones(&self, reached: u32) {
        let mut grants = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        grants.milestones_reached = Some(grants.milestones_reached.map_or(reached, |n| n.max(reached)));
    }

    /// Take everything granted so far, leaving the sink empty.
    pub fn take(&self) -> Grants {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Slots regenerated during an operation.
#[derive(Debug, Clone)]
pub struct CapacityRegenerated {
    /// Internal user id.
    pub user: UserId,
    /// Platform identity.
    pub external_id: String,
    /// Slots gained.
    pub gained: u32,
    /// Slots available afterwards.
    pub slot_remaining: u32,
}

impl Event for CapacityRegenerated {
    fn kind(&self) -> &'static EventKind {
        &CAPACITY_REGENERATED
    }
}

/// A settled draw batch, before commit.
#[derive(Debug)]
pub struct DrawResolved {
    /// Internal user id.
    pub user: UserId,
    /// Platform identity.
    pub external_id: String,
    /// Items drawn, in order.
    pub picks: Vec<ItemId>,
    /// Items the user held none of before the batch.
    pub new_items: Vec<ItemId>,
    /// Distinct items the user has ever held, including this batch.
    pub collected: u32,
    /// Achievement milestones already paid out, as persisted.
    pub milestones_reached: u32,
    /// Where handlers deposit bonuses.
    pub grants: BonusGrants,
}

impl Event for DrawResolved {
    fn kind(&self) -> &'static EventKind {
        &DRAW_RESOLVED
    }
}

/// A draw outcome about to be committed.
#[derive(Debug, Clone)]
pub struct DrawAnnounced {
    /// Platform identity.
    pub external_id: String,
    /// What the user sees.
    pub outcome: DrawOutcome,
}

impl Event for DrawAnnounced {
    fn kind(&self) -> &'static EventKind {
        &DRAW_ANNOUNCED
    }
}

/// A settled synthesis attempt, before commit.
#[derive(Debug)]
pub struct SynthesisResolved {
    /// Internal user id.
    pub user: UserId,
    /// Platform identity.
    pub external_id: String,
    /// Canonical ingredient key.
    pub key: RecipeKey,
    /// Item produced.
    pub result: ItemId,
    /// Whether the attempt succeeded.
    pub succeeded: bool,
    /// Items the user held none of before the attempt.
    pub new_items: Vec<ItemId>,
    /// Distinct items the user has ever held, including this attempt.
    pub collected: u32,
    /// Achievement milestones already paid out, as persisted.
    pub milestones_reached: u32,
    /// Where handlers deposit bonuses.
    pub grants: BonusGrants,
}

impl Event for SynthesisResolved {
    fn kind(&self) -> &'static EventKind {
        &SYNTHESIS_RESOLVED
    }
}

/// A synthesis outcome about to be committed.
#[derive(Debug, Clone)]
pub struct SynthesisAnnounced {
    /// Platform identity.
    pub external_id: String,
    /// What the user sees.
    pub outcome: SynthesisOutcome,
}

impl Event for SynthesisAnnounced {
    fn kind(&self) -> &'static EventKind {
        &SYNTHESIS_ANNOUNCED
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn kinds_nest_under_gacha() {
        assert!(DRAW_RESOLVED.is_a(&DRAW));
        assert!(DRAW_ANNOUNCED.is_a(&GACHA));
        assert!(SYNTHESIS_RESOLVED.is_a(&SYNTHESIS));
        assert!(CAPACITY_REGENERATED.is_a(&CAPACITY));
        assert!(!DRAW_RESOLVED.is_a(&SYNTHESIS));
    }

    #[test]
    fn grants_accumulate_and_drain() {
        let sink = BonusGrants::default();
        sink.grant_item(ItemId(3), 2);
        sink.grant_currency(Decimal::from(5)).unwrap();
        sink.grant_currency(Decimal::from(7)).unwrap();

        let grants = sink.take();
        assert_eq!(grants.items, vec![(ItemId(3), 2)]);
        assert_eq!(grants.currency, Decimal::from(12));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn milestone_progress_only_advances() {
        let sink = BonusGrants::default();
        sink.reach_milestones(2);
        sink.reach_milestones(1);
        let grants = sink.take();
        assert_eq!(grants.milestones_reached, Some(2));
        assert!(!grants.is_empty());
    }

    #[test]
    fn currency_overflow_is_an_error() {
        let sink = BonusGrants::default();
        sink.grant_currency(Decimal::MAX).unwrap();
        assert!(sink.grant_currency(Decimal::MAX).is_err());
    }
}
