//! Shared type definitions for the gacha economy core.
//!
//! This crate is the single source of truth for the data model used across
//! the workspace. Outcome types flow to `TypeScript` via `ts-rs` so the
//! presentation layer renders exactly what the core computed.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe identifiers (`UserId`, `ItemId`, `LevelId`, `SourceId`)
//! - [`structs`] -- Catalog entities, per-user state, recipe definitions
//! - [`outcome`] -- Transient draw and synthesis outcomes

pub mod ids;
pub mod outcome;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use ids::{ItemId, LevelId, SourceId, UserId};
pub use outcome::{DrawOutcome, ItemDelta, SynthesisOutcome, accumulate};
pub use structs::{
    CapacityState, InventoryCounter, Item, Level, Recipe, RecipeKey, Source, UserState,
};

#[cfg(test)]
mod tests {
    //! Binding generation for the presentation layer.

    #[test]
    fn export_bindings() {
        // ts-rs writes the files into `bindings/` relative to the crate
        // root when `export_all` runs.
        use ts_rs::TS;

        let _ = crate::ids::UserId::export_all();
        let _ = crate::ids::ItemId::export_all();
        let _ = crate::structs::CapacityState::export_all();
        let _ = crate::structs::Recipe::export_all();
        let _ = crate::outcome::DrawOutcome::export_all();
        let _ = crate::outcome::SynthesisOutcome::export_all();
    }
}
