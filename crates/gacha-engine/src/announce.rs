//! Presentation stand-in: renders announced outcomes to the log.
//!
//! A chat front end would subscribe to the same kinds and turn the outcome
//! into a message. Here each outcome is logged as a summary line, with the
//! full JSON payload at debug level.

use gacha_core::events::{DRAW_ANNOUNCED, DrawAnnounced, SYNTHESIS_ANNOUNCED, SynthesisAnnounced};
use gacha_events::{DispatchError, EventDispatcher, Propagation, SubscriptionId};
use tracing::{debug, info};

/// Subscribe the announcers for draws and syntheses.
pub fn register(dispatcher: &EventDispatcher) -> Result<[SubscriptionId; 2], DispatchError> {
    let draws = dispatcher.on::<DrawAnnounced, _, _>(&DRAW_ANNOUNCED, 0, |event| async move {
        let outcome = &event.outcome;
        info!(
            player = %event.external_id,
            draws = outcome.picks.len(),
            distinct = outcome.deltas.len(),
            currency = %outcome.currency_delta,
            slots_remaining = outcome.slots_remaining,
            next_slot_secs = outcome.seconds_to_next,
            "Draw announced"
        );
        debug!(payload = %serde_json::to_string(outcome)?, "Draw outcome");
        Ok::<_, anyhow::Error>(Propagation::Continue)
    })?;

    let syntheses =
        dispatcher.on::<SynthesisAnnounced, _, _>(&SYNTHESIS_ANNOUNCED, 0, |event| async move {
            let outcome = &event.outcome;
            info!(
                player = %event.external_id,
                result = %outcome.result,
                succeeded = outcome.succeeded,
                possibility = outcome.possibility,
                "Synthesis announced"
            );
            debug!(payload = %serde_json::to_string(outcome)?, "Synthesis outcome");
            Ok::<_, anyhow::Error>(Propagation::Continue)
        })?;

    Ok([draws, syntheses])
}
