//! Built-in side effects wired through the event dispatcher.
//!
//! Both effects listen to `*Resolved` events and deposit rewards into the
//! event's [`BonusGrants`](crate::events::BonusGrants) sink, so a bonus is
//! committed together with the operation that earned it.

use std::sync::Arc;

use gacha_events::{
    DispatchError, Event, EventDispatcher, HandlerFuture, Propagation, SubscriptionId,
};
use gacha_types::{ItemId, UserId};
use tracing::{debug, info};

use crate::config::{GachaConfig, Milestone};
use crate::events::{BonusGrants, DRAW_RESOLVED, DrawResolved, GACHA, SynthesisResolved};

/// Listener priority of [`BatchBonus`].
pub const BATCH_BONUS_PRIORITY: i32 = 10;
/// Listener priority of [`AchievementBook`]. Runs after batch bonuses.
pub const ACHIEVEMENT_PRIORITY: i32 = 0;

/// Grants an item whenever a draw batch reaches a minimum size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchBonus {
    item: ItemId,
    batch_min: u32,
    count: u32,
}

impl BatchBonus {
    /// Grant `count` copies of `item` for batches of at least `batch_min`.
    pub const fn new(item: ItemId, batch_min: u32, count: u32) -> Self {
        Self {
            item,
            batch_min,
            count,
        }
    }

    /// Attach to `dispatcher`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RegistryPoisoned`] if the registry is poisoned.
    pub fn register(
        self,
        dispatcher: &EventDispatcher,
        priority: i32,
    ) -> Result<SubscriptionId, DispatchError> {
        dispatcher.on::<DrawResolved, _, _>(&DRAW_RESOLVED, priority, move |event| async move {
            let batch = u32::try_from(event.picks.len()).unwrap_or(u32::MAX);
            if batch >= self.batch_min {
                event.grants.grant_item(self.item, self.count);
                debug!(
                    external_id = %event.external_id,
                    batch,
                    item = %self.item,
                    "Batch bonus granted"
                );
            }
            Ok::<_, anyhow::Error>(Propagation::Continue)
        })
    }
}

/// Rewards users the first time they have held a milestone's worth of
/// distinct items.
///
/// The book keeps no state of its own. Collection size and paid-out
/// milestones come from the event, which reads them from the user's
/// persisted rows, and progress is written back through the grants sink.
/// A rolled-back operation therefore rolls back its milestones too.
#[derive(Debug, Clone, Default)]
pub struct AchievementBook {
    milestones: Arc<Vec<Milestone>>,
}

impl AchievementBook {
    /// Create a book over `milestones` (any order).
    pub fn new(mut milestones: Vec<Milestone>) -> Self {
        milestones.sort_by_key(|m| m.distinct_items);
        Self {
            milestones: Arc::new(milestones),
        }
    }

    /// Grant every milestone past the first `reached` that `collected`
    /// distinct items complete. Returns the new paid-out count.
    ///
    /// # Errors
    ///
    /// Fails if a grant overflows.
    pub fn record(
        &self,
        user: UserId,
        collected: u32,
        reached: u32,
        grants: &BonusGrants,
    ) -> anyhow::Result<u32> {
        let mut paid = reached;
        let pending = self
            .milestones
            .iter()
            .skip(usize::try_from(reached).unwrap_or(usize::MAX))
            .take_while(|m| m.distinct_items <= collected);
        for milestone in pending {
            grants.grant_currency(milestone.reward)?;
            info!(
                %user,
                distinct_items = milestone.distinct_items,
                reward = %milestone.reward,
                "Achievement reached"
            );
            paid = paid.saturating_add(1);
        }
        if paid > reached {
            grants.reach_milestones(paid);
        }
        Ok(paid)
    }

    /// Attach to `dispatcher`, listening to every resolved draw and synthesis.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RegistryPoisoned`] if the registry is poisoned.
    pub fn register(
        &self,
        dispatcher: &EventDispatcher,
        priority: i32,
    ) -> Result<SubscriptionId, DispatchError> {
        let book = self.clone();
        dispatcher.subscribe(&GACHA, priority, move |event: Arc<dyn Event>| -> HandlerFuture {
            let recorded = if let Some(draw) = event.downcast_ref::<DrawResolved>() {
                book.record(draw.user, draw.collected, draw.milestones_reached, &draw.grants)
            } else if let Some(synthesis) = event.downcast_ref::<SynthesisResolved>() {
                book.record(
                    synthesis.user,
                    synthesis.collected,
                    synthesis.milestones_reached,
                    &synthesis.grants,
                )
            } else {
                Ok(0)
            };
            Box::pin(async move { recorded.map(|_paid| Propagation::Continue) })
        })
    }
}

/// Register the effects enabled in `config`.
///
/// # Errors
///
/// Returns [`DispatchError::RegistryPoisoned`] if the registry is poisoned.
pub fn install(
    dispatcher: &EventDispatcher,
    config: &GachaConfig,
) -> Result<Vec<SubscriptionId>, DispatchError> {
    let mut subscriptions = Vec::new();
    if let Some(item) = config.bonus.item {
        let bonus = BatchBonus::new(item, config.bonus.batch_min, config.bonus.count);
        subscriptions.push(bonus.register(dispatcher, BATCH_BONUS_PRIORITY)?);
    }
    if !config.achievements.milestones.is_empty() {
        let book = AchievementBook::new(config.achievements.milestones.clone());
        subscriptions.push(book.register(dispatcher, ACHIEVEMENT_PRIORITY)?);
    }
    info!(count = subscriptions.len(), "Built-in effects installed");
    Ok(subscriptions)
}
