//! Simulated players driving the service concurrently.
//!
//! Each player drains its slots, then feeds the first three items of the
//! batch into synthesis. Every round is a separate pair of operations, so
//! later rounds usually find no slots left until the regeneration interval
//! passes.

use std::sync::Arc;

use gacha_core::{Clock, DrawCount, GachaService, ServiceError};
use gacha_store::Store;
use serde::Deserialize;
use tracing::{info, warn};

// -----------------------------------------------------------------------
// Configuration
// -----------------------------------------------------------------------

/// Simulated player settings, read from the `players` section of
/// `gacha-config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerConfig {
    /// Number of concurrent players.
    #[serde(default = "default_count")]
    pub count: u32,

    /// Draw and synthesis rounds per player.
    #[serde(default = "default_rounds")]
    pub rounds: u32,

    /// External id prefix; players are named `<prefix>-<n>`.
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            rounds: default_rounds(),
            prefix: default_prefix(),
        }
    }
}

const fn default_count() -> u32 {
    4
}

const fn default_rounds() -> u32 {
    2
}

fn default_prefix() -> String {
    String::from("player")
}

// -----------------------------------------------------------------------
// Session
// -----------------------------------------------------------------------

/// What one player got done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerReport {
    /// Items drawn across all rounds.
    pub drawn: usize,
    /// Synthesis attempts that committed.
    pub syntheses: u32,
    /// Successful synthesis attempts.
    pub successes: u32,
    /// Operations refused with a user-facing message.
    pub refused: u32,
}

/// Play `rounds` rounds as `external_id`.
pub async fn play<S: Store, C: Clock>(
    service: Arc<GachaService<S, C>>,
    external_id: String,
    rounds: u32,
) -> PlayerReport {
    let mut report = PlayerReport::default();

    for round in 0..rounds {
        let picks = match service.draw(&external_id, DrawCount::Drain).await {
            Ok(outcome) => {
                report.drawn = report.drawn.saturating_add(outcome.picks.len());
                outcome.picks
            }
            Err(error) => {
                refuse(&mut report, &external_id, round, &error);
                continue;
            }
        };

        let [a, b, c, ..] = picks.as_slice() else {
            info!(player = %external_id, round, "Not enough items to synthesize");
            continue;
        };
        match service.synthesize(&external_id, [*a, *b, *c]).await {
            Ok(outcome) => {
                report.syntheses = report.syntheses.saturating_add(1);
                if outcome.succeeded {
                    report.successes = report.successes.saturating_add(1);
                }
            }
            Err(error) => refuse(&mut report, &external_id, round, &error),
        }
    }

    report
}

fn refuse(report: &mut PlayerReport, external_id: &str, round: u32, error: &ServiceError) {
    report.refused = report.refused.saturating_add(1);
    warn!(
        player = external_id,
        round,
        reply = error.user_message(),
        error = %error,
        "Operation refused"
    );
}
