//! Error types for event dispatch.

/// Errors surfaced by [`EventDispatcher`](crate::EventDispatcher).
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A listener failed during [`emit`](crate::EventDispatcher::emit).
    /// Listeners after it in the same dispatch did not run.
    #[error("listener at priority {priority} failed on `{kind}`: {source}")]
    Handler {
        /// Name of the dispatched event kind.
        kind: &'static str,
        /// Priority of the failing listener.
        priority: i32,
        /// The listener's error.
        #[source]
        source: anyhow::Error,
    },

    /// A registry or link table lock was poisoned by a panicking writer.
    #[error("event registry poisoned")]
    RegistryPoisoned,
}
