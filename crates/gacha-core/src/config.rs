//! Configuration loading and typed config structures for the gacha core.
//!
//! The canonical configuration lives in `gacha-config.yaml` at the project
//! root. Every field has a default, so an empty file yields a working (if
//! catalog-less) configuration.

use std::path::Path;

use gacha_types::{Item, ItemId, Level, Source};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::draw::{Catalog, CatalogBuilder, CatalogError};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level gacha configuration.
///
/// Mirrors the structure of `gacha-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GachaConfig {
    /// Draw capacity and regeneration.
    #[serde(default)]
    pub capacity: CapacityConfig,

    /// Draw rewards.
    #[serde(default)]
    pub draw: DrawConfig,

    /// Recipe definition and outcome tuning.
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Batch bonus side effect.
    #[serde(default)]
    pub bonus: BonusConfig,

    /// Collection milestones.
    #[serde(default)]
    pub achievements: AchievementConfig,

    /// Per-user lock behavior.
    #[serde(default)]
    pub guard: GuardConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Levels, sources and items.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

impl GachaConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `GACHA_LOG` overrides `logging.level` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        // An empty document means all defaults.
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.logging.apply_env_overrides();
        Ok(config)
    }
}

/// Draw capacity configuration applied to newly created users.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CapacityConfig {
    /// Maximum slots a user can hold.
    #[serde(default = "default_slot_max")]
    pub slot_max: u32,

    /// Seconds per regenerated slot; zero means always full.
    #[serde(default = "default_regen_interval_secs")]
    pub regen_interval_secs: f64,
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            slot_max: default_slot_max(),
            regen_interval_secs: default_regen_interval_secs(),
        }
    }
}

/// Draw reward configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DrawConfig {
    /// Currency added when a draw yields an item the user held none of.
    #[serde(default)]
    pub first_time_bonus: Decimal,
}

/// Recipe definition and outcome tuning.
///
/// Tier distances are measured in positions of the rank-ordered level list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SynthesisConfig {
    /// Result of doomed recipes. Defaults to the lowest-id junk-tier item.
    #[serde(default)]
    pub junk_item: Option<ItemId>,

    /// Fixed consolation item on a failed attempt. Defaults to the lowest-id
    /// item of the first tier above junk, or the junk item when the catalog
    /// has a single tier.
    #[serde(default)]
    pub byproduct_item: Option<ItemId>,

    /// Chance of the byproduct (instead of junk-tier garbage) on a failed
    /// attempt.
    #[serde(default = "default_byproduct_chance")]
    pub byproduct_chance: f64,

    /// Success chance when the result stays in the strongest input tier.
    #[serde(default = "default_base_possibility")]
    pub base_possibility: f64,

    /// Multiplier applied to the base chance per tier climbed.
    #[serde(default = "default_climb_penalty")]
    pub climb_penalty: f64,

    /// Chance added per tier descended.
    #[serde(default = "default_descend_bonus")]
    pub descend_bonus: f64,

    /// Chance added in proportion to the ingredients' rarity.
    #[serde(default = "default_rarity_bonus")]
    pub rarity_bonus: f64,

    /// Weight decay per tier of distance when sampling the result tier.
    #[serde(default = "default_tier_decay")]
    pub tier_decay: f64,

    /// Extra weight factor for tiers above the strongest input.
    #[serde(default = "default_climb_bias")]
    pub climb_bias: f64,

    /// Half-width of the multiplicative noise on the success chance.
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Lower bound for generated success chances.
    #[serde(default = "default_min_possibility")]
    pub min_possibility: f64,

    /// Upper bound for generated success chances.
    #[serde(default = "default_max_possibility")]
    pub max_possibility: f64,

    /// Salt mixed into every recipe seed. Changing it reshuffles all
    /// generated recipes on the next reset.
    #[serde(default)]
    pub seed_salt: u64,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            junk_item: None,
            byproduct_item: None,
            byproduct_chance: default_byproduct_chance(),
            base_possibility: default_base_possibility(),
            climb_penalty: default_climb_penalty(),
            descend_bonus: default_descend_bonus(),
            rarity_bonus: default_rarity_bonus(),
            tier_decay: default_tier_decay(),
            climb_bias: default_climb_bias(),
            jitter: default_jitter(),
            min_possibility: default_min_possibility(),
            max_possibility: default_max_possibility(),
            seed_salt: 0,
        }
    }
}

/// Batch bonus: an extra item for large draw batches.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BonusConfig {
    /// Item granted. Unset disables the bonus.
    #[serde(default)]
    pub item: Option<ItemId>,

    /// Smallest batch that earns the bonus.
    #[serde(default = "default_batch_min")]
    pub batch_min: u32,

    /// Copies granted per qualifying batch.
    #[serde(default = "default_bonus_count")]
    pub count: u32,
}

impl Default for BonusConfig {
    fn default() -> Self {
        Self {
            item: None,
            batch_min: default_batch_min(),
            count: default_bonus_count(),
        }
    }
}

/// One collection milestone.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Milestone {
    /// Distinct items a user must have newly collected.
    pub distinct_items: u32,
    /// Currency granted the first time the milestone is reached.
    pub reward: Decimal,
}

/// Collection milestones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AchievementConfig {
    /// Milestones in any order. Empty disables achievements.
    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

/// Per-user lock behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GuardConfig {
    /// Give up waiting for a user's lock after this many milliseconds.
    /// Unset waits indefinitely.
    #[serde(default)]
    pub lock_timeout_ms: Option<u64>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl LoggingConfig {
    /// Override the level with `GACHA_LOG` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("GACHA_LOG") {
            self.level = val;
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Levels, sources and items as written in the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CatalogConfig {
    /// Rarity tiers.
    #[serde(default)]
    pub levels: Vec<Level>,

    /// Item pools.
    #[serde(default)]
    pub sources: Vec<Source>,

    /// Collectible items.
    #[serde(default)]
    pub items: Vec<Item>,
}

impl CatalogConfig {
    /// Validate and index the catalog.
    ///
    /// # Errors
    ///
    /// Returns a [`CatalogError`] describing the first inconsistency found.
    pub fn build(&self) -> Result<Catalog, CatalogError> {
        let builder = self
            .levels
            .iter()
            .cloned()
            .fold(CatalogBuilder::new(), CatalogBuilder::level);
        let builder = self.sources.iter().cloned().fold(builder, CatalogBuilder::source);
        self.items
            .iter()
            .cloned()
            .fold(builder, CatalogBuilder::item)
            .build()
    }
}

const fn default_slot_max() -> u32 {
    5
}

const fn default_regen_interval_secs() -> f64 {
    3600.0
}

const fn default_byproduct_chance() -> f64 {
    0.9
}

const fn default_base_possibility() -> f64 {
    0.5
}

const fn default_climb_penalty() -> f64 {
    0.4
}

const fn default_descend_bonus() -> f64 {
    0.15
}

const fn default_rarity_bonus() -> f64 {
    0.2
}

const fn default_tier_decay() -> f64 {
    0.35
}

const fn default_climb_bias() -> f64 {
    0.5
}

const fn default_jitter() -> f64 {
    0.1
}

const fn default_min_possibility() -> f64 {
    0.05
}

const fn default_max_possibility() -> f64 {
    0.95
}

const fn default_batch_min() -> u32 {
    10
}

const fn default_bonus_count() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
mod tests {
    use gacha_types::{LevelId, SourceId};

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GachaConfig::default();
        assert_eq!(config.capacity.slot_max, 5);
        assert!(config.bonus.item.is_none());
        assert!(config.achievements.milestones.is_empty());
        assert!(config.catalog.build().is_ok());
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
capacity:
  slot_max: 3
  regen_interval_secs: 600

draw:
  first_time_bonus: 5

synthesis:
  junk_item: 1
  byproduct_item: 2
  byproduct_chance: 0.5
  seed_salt: 99

bonus:
  item: 4
  batch_min: 3

achievements:
  milestones:
    - distinct_items: 2
      reward: 10
    - distinct_items: 5
      reward: "25.5"

guard:
  lock_timeout_ms: 250

logging:
  level: "debug"

catalog:
  levels:
    - { id: 1, name: "N", weight: 80, rank: 0 }
    - { id: 2, name: "SSR", weight: 20, awarding: 3, rank: 2 }
  sources:
    - { id: 1, name: "base", weight: 1 }
  items:
    - { id: 1, level: 1, source: 1, name: "Pebble" }
    - { id: 2, level: 1, source: 1, name: "Twig" }
    - { id: 4, level: 2, source: 1, name: "Crown" }
"#;

        let config = GachaConfig::parse(yaml);
        assert!(config.is_ok(), "{config:?}");
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.capacity.slot_max, 3);
        assert_eq!(config.draw.first_time_bonus, Decimal::from(5));
        assert_eq!(config.synthesis.junk_item, Some(ItemId(1)));
        assert_eq!(config.synthesis.seed_salt, 99);
        assert_eq!(config.bonus.item, Some(ItemId(4)));
        assert_eq!(config.bonus.count, 1);
        assert_eq!(config.achievements.milestones.len(), 2);
        assert_eq!(config.guard.lock_timeout_ms, Some(250));
        assert_eq!(config.catalog.levels.len(), 2);

        let catalog = config.catalog.build();
        assert!(catalog.is_ok(), "{catalog:?}");
        let catalog = catalog.ok();
        let crown = catalog.as_ref().and_then(|c| c.item(ItemId(4)));
        assert_eq!(crown.map(|i| i.level), Some(LevelId(2)));
        assert_eq!(crown.map(|i| i.source), Some(SourceId(1)));
    }

    #[test]
    fn parse_minimal_yaml() {
        let config = GachaConfig::parse("capacity:\n  slot_max: 9\n");
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.capacity.slot_max, 9);
        // Everything else uses defaults
        assert_eq!(config.capacity, CapacityConfig {
            slot_max: 9,
            ..CapacityConfig::default()
        });
        assert_eq!(config.synthesis, SynthesisConfig::default());
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(GachaConfig::parse("").is_ok());
    }

    #[test]
    fn invalid_yaml_is_rejected() {
        let result = GachaConfig::parse("capacity: [1, 2");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("gacha-config.yaml");
        if path.exists() {
            let config = GachaConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
            let catalog = config.ok().map(|c| c.catalog.build());
            assert!(matches!(catalog, Some(Ok(_))));
        }
    }
}
