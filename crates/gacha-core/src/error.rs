//! Service-level error type.
//!
//! [`ServiceError`] wraps every component error so callers handle one type.
//! Messages shown to players come from [`ServiceError::user_message`], which
//! never exposes internal state.

use gacha_events::DispatchError;
use gacha_store::StoreError;
use gacha_types::ItemId;

use crate::config::ConfigError;
use crate::draw::{CatalogError, DrawError};
use crate::guard::GuardError;
use crate::recipe::SynthesisError;

/// Errors returned by [`GachaService`](crate::service::GachaService).
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The user's lock could not be acquired.
    #[error(transparent)]
    Guard(#[from] GuardError),

    /// Draw resolution failed.
    #[error(transparent)]
    Draw(#[from] DrawError),

    /// Recipe definition or rolling failed.
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// An in-transaction event handler failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The catalog is inconsistent.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The user does not hold enough copies of an ingredient.
    #[error("missing ingredient {item}: need {needed}, hold {held}")]
    MissingIngredient {
        /// The ingredient.
        item: ItemId,
        /// Copies the combination requires.
        needed: u32,
        /// Copies the user holds.
        held: u32,
    },

    /// A counter or balance would overflow.
    #[error("arithmetic overflow")]
    ArithmeticOverflow,
}

impl ServiceError {
    /// Generic text suitable for showing to the player.
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::Draw(DrawError::InsufficientSlots { .. }) => "not enough time has passed",
            Self::Draw(DrawError::NoCandidates) => "nothing available",
            Self::MissingIngredient { .. } => "you do not have those items",
            Self::Synthesis(SynthesisError::UnknownItem(_)) => "no such item",
            Self::Guard(GuardError::Timeout { .. }) => "busy, try again in a moment",
            _ => "something went wrong",
        }
    }
}
