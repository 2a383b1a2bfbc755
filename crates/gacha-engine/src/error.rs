//! Error types for the engine binary.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: gacha_core::ConfigError,
    },

    /// The configured catalog is inconsistent.
    #[error("catalog error: {source}")]
    Catalog {
        /// The underlying catalog error.
        #[from]
        source: gacha_core::CatalogError,
    },

    /// Registering a listener failed.
    #[error("dispatch error: {source}")]
    Dispatch {
        /// The underlying dispatcher error.
        #[from]
        source: gacha_events::DispatchError,
    },

    /// The `players` section could not be read.
    #[error("players error: {message}")]
    Players {
        /// Description of the failure.
        message: String,
    },

    /// A player task panicked or was cancelled.
    #[error("player task failed: {source}")]
    Join {
        /// The underlying join error.
        #[from]
        source: tokio::task::JoinError,
    },
}
