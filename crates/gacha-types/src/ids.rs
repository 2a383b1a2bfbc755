//! Type-safe identifier wrappers.
//!
//! Users are keyed by a UUID v7 generated when the persistence layer first
//! sees an external identity. Catalog entities (levels, sources, items) use
//! small integer keys because the recipe system sorts and hashes them.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

/// Generates a newtype wrapper around a `u32` catalog key.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub u32);

        impl $name {
            /// Return the raw key.
            pub const fn get(self) -> u32 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }
    };
}

define_id! {
    /// Internal identifier for a player, assigned on first contact.
    UserId
}

define_key! {
    /// Identifier for an item (award) in the catalog.
    ItemId
}

define_key! {
    /// Identifier for a level (rarity tier) in the catalog.
    LevelId
}

define_key! {
    /// Identifier for a source pool (base pool, promotional pool, ...).
    SourceId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ids_are_unique() {
        assert_ne!(UserId::new(), UserId::new());
    }

    #[test]
    fn item_ids_order_by_raw_value() {
        let mut ids = vec![ItemId(9), ItemId(2), ItemId(5)];
        ids.sort();
        assert_eq!(ids, vec![ItemId(2), ItemId(5), ItemId(9)]);
    }

    #[test]
    fn keys_serialize_transparently() {
        let json = serde_json::to_string(&LevelId(3)).unwrap_or_default();
        assert_eq!(json, "3");
    }
}
