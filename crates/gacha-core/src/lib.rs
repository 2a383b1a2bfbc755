//! Economy and randomness core of the gacha game.
//!
//! This crate owns how draw capacity regenerates, how draws resolve into
//! items, how three items combine through memoized recipes, and how results
//! reach side-effect observers through the event dispatcher.
//!
//! # Modules
//!
//! - [`clock`] -- [`Clock`] trait with system and manual implementations
//! - [`config`] -- Configuration loading from `gacha-config.yaml`
//! - [`guard`] -- Per-user lock registry
//! - [`regen`] -- Time-based capacity regeneration
//! - [`draw`] -- Catalog indexing and weighted draw resolution
//! - [`recipe`] -- Deterministic recipe definitions and outcome rolls
//! - [`events`] -- Game event kinds and payloads
//! - [`effects`] -- Built-in batch bonus and achievement handlers
//! - [`service`] -- [`GachaService`], the per-operation entry point
//! - [`error`] -- Service-level error type
//!
//! [`Clock`]: clock::Clock
//! [`GachaService`]: service::GachaService

pub mod clock;
pub mod config;
pub mod draw;
pub mod effects;
pub mod error;
pub mod events;
pub mod guard;
pub mod recipe;
pub mod regen;
pub mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, GachaConfig};
pub use draw::{Catalog, CatalogBuilder, CatalogError, DrawCount, DrawEngine, DrawError};
pub use error::ServiceError;
pub use guard::{GuardError, LockRegistry};
pub use recipe::{RecipeSynthesizer, SynthesisError, SynthesisRoll, recipe_seed};
pub use regen::{RegenReport, regenerate, seconds_to_next};
pub use service::GachaService;
