//! Event kinds and the [`Event`] trait.
//!
//! Kinds form an explicit tree of static tags. A listener registered on a
//! kind receives every event whose kind is that kind or one of its
//! descendants, so matching costs one registry lookup per ancestor.

use std::any::Any;
use std::sync::Arc;

/// A node in the event kind tree.
///
/// Kinds are compared by name; names must be unique across the process.
/// Declare them as `const` items so references are promoted to `'static`:
///
/// ```
/// use gacha_events::EventKind;
///
/// const PLAYER: EventKind = EventKind::child("player", &EventKind::ANY);
/// const PLAYER_JOINED: EventKind = EventKind::child("player.joined", &PLAYER);
///
/// assert!(PLAYER_JOINED.is_a(&PLAYER));
/// assert!(!PLAYER.is_a(&PLAYER_JOINED));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct EventKind {
    name: &'static str,
    parent: Option<&'static EventKind>,
}

impl EventKind {
    /// The root of every kind tree. Listeners on `ANY` see all events.
    pub const ANY: Self = Self::root("any");

    /// Create a kind with no parent.
    pub const fn root(name: &'static str) -> Self {
        Self { name, parent: None }
    }

    /// Create a kind below `parent`.
    pub const fn child(name: &'static str, parent: &'static Self) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    /// The unique name of this kind.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The parent kind, if any.
    pub const fn parent(&self) -> Option<&'static Self> {
        self.parent
    }

    /// Iterate over this kind followed by each of its ancestors.
    pub fn lineage(&self) -> impl Iterator<Item = &Self> {
        let mut next = Some(self);
        core::iter::from_fn(move || {
            let current = next?;
            next = current.parent;
            Some(current)
        })
    }

    /// Whether this kind is `other` or descends from it.
    pub fn is_a(&self, other: &Self) -> bool {
        self.lineage().any(|k| k.name == other.name)
    }
}

impl PartialEq for EventKind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EventKind {}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name)
    }
}

/// Upcasting helpers used to downcast type-erased events.
pub trait AsAny: Any + Send + Sync {
    /// Borrow as `dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Convert a shared pointer into `Arc<dyn Any>`.
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A payload that can travel through an [`EventDispatcher`].
///
/// [`EventDispatcher`]: crate::EventDispatcher
pub trait Event: AsAny + core::fmt::Debug {
    /// The kind this event is delivered as.
    fn kind(&self) -> &'static EventKind;
}

impl dyn Event {
    /// Borrow the concrete event, if it is an `E`.
    pub fn downcast_ref<E: Event>(&self) -> Option<&E> {
        self.as_any().downcast_ref::<E>()
    }

    /// Recover the concrete shared event, if it is an `E`.
    pub fn downcast_arc<E: Event>(self: Arc<Self>) -> Option<Arc<E>> {
        self.into_any_arc().downcast::<E>().ok()
    }
}
