//! Demo binary for the gacha core.
//!
//! Wires the service to the in-memory store and the system clock, then lets
//! a handful of simulated players draw and synthesize at the same time.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `gacha-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Build the catalog
//! 4. Create the service and install the built-in effects
//! 5. Attach the announcers
//! 6. Run the players and log a summary

mod announce;
mod error;
mod players;

use std::path::Path;
use std::sync::Arc;

use gacha_core::{GachaConfig, GachaService, SystemClock, effects};
use gacha_store::{MemoryStore, Store};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::players::PlayerConfig;

const CONFIG_PATH: &str = "gacha-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, catalog or listener setup fails, or
/// if a player task panics.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration. Logging is not up yet, so the level comes from here.
    let config = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!(
        slot_max = config.capacity.slot_max,
        regen_interval_secs = config.capacity.regen_interval_secs,
        first_time_bonus = %config.draw.first_time_bonus,
        "gacha-engine starting"
    );

    // 3. Build the catalog.
    let catalog = Arc::new(config.catalog.build()?);
    info!(
        levels = catalog.ranked_levels().count(),
        items = catalog.items().count(),
        "Catalog built"
    );

    // 4. Create the service.
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(GachaService::new(
        &config,
        catalog,
        Arc::clone(&store),
        SystemClock,
    ));
    effects::install(service.dispatcher(), &config)?;

    // 5. Attach the announcers.
    announce::register(service.dispatcher())?;
    info!(
        listeners = service.dispatcher().listener_count(),
        "Dispatcher ready"
    );

    // 6. Run the players.
    let roster = load_player_config()?;
    info!(count = roster.count, rounds = roster.rounds, "Players joining");

    let handles: Vec<_> = (1..=roster.count)
        .map(|n| {
            let service = Arc::clone(&service);
            let external_id = format!("{}-{n}", roster.prefix);
            tokio::spawn(players::play(service, external_id, roster.rounds))
        })
        .collect();
    let reports = futures::future::try_join_all(handles)
        .await
        .map_err(EngineError::from)?;

    let drawn: usize = reports.iter().map(|r| r.drawn).sum();
    let syntheses: u32 = reports.iter().map(|r| r.syntheses).sum();
    let successes: u32 = reports.iter().map(|r| r.successes).sum();
    let refused: u32 = reports.iter().map(|r| r.refused).sum();

    let recipes = store.list_recipes().await.as_ref().map_or(0, Vec::len);
    info!(
        drawn,
        syntheses,
        successes,
        refused,
        recipes,
        "gacha-engine shutdown complete"
    );

    Ok(())
}

/// Load `gacha-config.yaml` from the working directory, or defaults.
fn load_config() -> Result<GachaConfig, EngineError> {
    load_config_from(Path::new(CONFIG_PATH))
}

/// Both branches go through [`GachaConfig::parse`], which applies the
/// environment overrides exactly once.
fn load_config_from(path: &Path) -> Result<GachaConfig, EngineError> {
    if path.exists() {
        Ok(GachaConfig::from_file(path)?)
    } else {
        Ok(GachaConfig::parse("")?)
    }
}

/// Read the `players` section of `gacha-config.yaml`.
///
/// A missing file or section yields defaults.
fn load_player_config() -> Result<PlayerConfig, EngineError> {
    let config_path = Path::new(CONFIG_PATH);
    if !config_path.exists() {
        return Ok(PlayerConfig::default());
    }

    let contents = std::fs::read_to_string(config_path).map_err(|e| EngineError::Players {
        message: format!("failed to read config file: {e}"),
    })?;
    let raw: serde_yml::Value = serde_yml::from_str(&contents).map_err(|e| EngineError::Players {
        message: format!("failed to parse config YAML: {e}"),
    })?;

    raw.get("players").map_or_else(
        || Ok(PlayerConfig::default()),
        |section| {
            serde_yml::from_value(section.clone()).map_err(|e| EngineError::Players {
                message: format!("failed to parse players config: {e}"),
            })
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_matches_empty_document() {
        let loaded = load_config_from(Path::new("does-not-exist.yaml")).unwrap();
        assert_eq!(loaded, GachaConfig::parse("").unwrap());
    }

    #[test]
    fn project_file_loads_like_parse() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..").join(CONFIG_PATH);
        let contents = std::fs::read_to_string(&path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded, GachaConfig::parse(&contents).unwrap());
        assert!(!loaded.catalog.levels.is_empty());
    }
}
