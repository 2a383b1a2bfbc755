//! The [`EventDispatcher`]: registry, emit/throw delivery, and links.
//!
//! # Delivery
//!
//! - [`emit`](EventDispatcher::emit) runs matching listeners one after the
//!   other in descending priority, ties broken by registration order, and
//!   awaits each. A listener returning [`Propagation::Stop`] ends that one
//!   dispatch. A listener error aborts the dispatch and is returned.
//! - [`throw`](EventDispatcher::throw) spawns every matching listener as an
//!   independent tokio task. The caller never waits and failures are only
//!   logged.
//!
//! # Links
//!
//! Dispatchers can be linked in both directions. A dispatch reaches every
//! dispatcher transitively reachable through links exactly once; a visited
//! set keyed by dispatcher id makes cycles harmless. Links are weak, so a
//! dropped dispatcher silently leaves the graph.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::DispatchError;
use crate::kind::{Event, EventKind};

/// Process-wide registration counter; orders ties across linked dispatchers.
static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Process-wide dispatcher counter used for visited sets.
static NEXT_DISPATCHER: AtomicU64 = AtomicU64::new(1);

/// What a listener wants to happen after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Deliver to the next listener.
    Continue,
    /// Skip the remaining listeners of this dispatch only.
    Stop,
}

/// Future returned by a listener.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<Propagation>>;

type HandlerFn = Arc<dyn Fn(Arc<dyn Event>) -> HandlerFuture + Send + Sync>;

/// Handle returned by [`EventDispatcher::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Summary of one [`emit`](EventDispatcher::emit) call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Listeners that ran to completion.
    pub delivered: usize,
    /// Whether a listener stopped propagation.
    pub stopped: bool,
}

#[derive(Clone)]
struct Listener {
    seq: u64,
    priority: i32,
    handler: HandlerFn,
}

struct Inner {
    id: u64,
    name: String,
    listeners: RwLock<HashMap<&'static str, Vec<Listener>>>,
    links: RwLock<Vec<Weak<Inner>>>,
}

/// Priority-ordered publish/subscribe hub.
///
/// Cloning is cheap and yields a handle to the same registry.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<Inner>,
}

impl core::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl EventDispatcher {
    /// Create an empty dispatcher. The name only appears in logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_DISPATCHER.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                listeners: RwLock::new(HashMap::new()),
                links: RwLock::new(Vec::new()),
            }),
        }
    }

    /// The dispatcher's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Register a listener for `kind` and all of its descendants.
    ///
    /// Higher priorities run first under [`emit`](Self::emit).
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RegistryPoisoned`] if a previous writer
    /// panicked while holding the registry.
    pub fn subscribe<F>(
        &self,
        kind: &'static EventKind,
        priority: i32,
        handler: F,
    ) -> Result<SubscriptionId, DispatchError>
    where
        F: Fn(Arc<dyn Event>) -> HandlerFuture + Send + Sync + 'static,
    {
        let seq = NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let listener = Listener {
            seq,
            priority,
            handler: Arc::new(handler),
        };

        let mut registry = self
            .inner
            .listeners
            .write()
            .map_err(|_poisoned| DispatchError::RegistryPoisoned)?;
        let slot = registry.entry(kind.name()).or_default();
        // Keep each list sorted so a single-dispatcher emit needs no re-sort.
        let at = slot.partition_point(|l| order_key(l) <= (core::cmp::Reverse(priority), seq));
        slot.insert(at, listener);

        debug!(
            dispatcher = %self.inner.name,
            kind = kind.name(),
            priority,
            "listener registered"
        );
        Ok(SubscriptionId(seq))
    }

    /// Register a listener that only sees events of concrete type `E`.
    ///
    /// Events of other types delivered under `kind` pass through with
    /// [`Propagation::Continue`].
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RegistryPoisoned`] if the registry is poisoned.
    pub fn on<E, F, Fut>(
        &self,
        kind: &'static EventKind,
        priority: i32,
        handler: F,
    ) -> Result<SubscriptionId, DispatchError>
    where
        E: Event,
        F: Fn(Arc<E>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Propagation>> + Send + 'static,
    {
        self.subscribe(kind, priority, move |event: Arc<dyn Event>| {
            match event.downcast_arc::<E>() {
                Some(typed) => Box::pin(handler(typed)) as HandlerFuture,
                None => Box::pin(async { Ok::<_, anyhow::Error>(Propagation::Continue) }),
            }
        })
    }

    /// Remove a listener. Returns whether it was registered here.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RegistryPoisoned`] if the registry is poisoned.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, DispatchError> {
        let mut registry = self
            .inner
            .listeners
            .write()
            .map_err(|_poisoned| DispatchError::RegistryPoisoned)?;
        let mut removed = false;
        for slot in registry.values_mut() {
            let before = slot.len();
            slot.retain(|l| l.seq != id.0);
            removed |= slot.len() != before;
        }
        registry.retain(|_, slot| !slot.is_empty());
        Ok(removed)
    }

    /// Number of listeners registered directly on this dispatcher.
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .map_or(0, |registry| registry.values().map(Vec::len).sum())
    }

    // -----------------------------------------------------------------------
    // Links
    // -----------------------------------------------------------------------

    /// Link two dispatchers in both directions.
    ///
    /// Linking a dispatcher to itself or re-linking an existing pair is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RegistryPoisoned`] if a link table is poisoned.
    pub fn link(&self, other: &Self) -> Result<(), DispatchError> {
        if self.inner.id == other.inner.id {
            return Ok(());
        }
        add_link(&self.inner, &other.inner)?;
        add_link(&other.inner, &self.inner)?;
        debug!(from = %self.inner.name, to = %other.inner.name, "dispatchers linked");
        Ok(())
    }

    /// Remove the link between two dispatchers, in both directions.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RegistryPoisoned`] if a link table is poisoned.
    pub fn unlink(&self, other: &Self) -> Result<(), DispatchError> {
        remove_link(&self.inner, other.inner.id)?;
        remove_link(&other.inner, self.inner.id)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    /// Deliver `event` sequentially, highest priority first.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Handler`] with the first listener failure;
    /// listeners after it do not run. Returns
    /// [`DispatchError::RegistryPoisoned`] if a registry is poisoned.
    pub async fn emit<E: Event>(&self, event: Arc<E>) -> Result<EmitReport, DispatchError> {
        let event: Arc<dyn Event> = event;
        let kind = event.kind();
        let listeners = self.collect(kind)?;
        let mut report = EmitReport::default();

        for listener in listeners {
            let outcome = (listener.handler)(Arc::clone(&event)).await;
            match outcome {
                Ok(Propagation::Continue) => {
                    report.delivered = report.delivered.saturating_add(1);
                }
                Ok(Propagation::Stop) => {
                    report.delivered = report.delivered.saturating_add(1);
                    report.stopped = true;
                    debug!(kind = kind.name(), priority = listener.priority, "propagation stopped");
                    break;
                }
                Err(source) => {
                    return Err(DispatchError::Handler {
                        kind: kind.name(),
                        priority: listener.priority,
                        source,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Spawn every matching listener as an independent task.
    ///
    /// Must be called from within a tokio runtime. Returns the number of
    /// tasks spawned. [`Propagation::Stop`] has no effect here.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::RegistryPoisoned`] if a registry is poisoned.
    pub fn throw<E: Event>(&self, event: Arc<E>) -> Result<usize, DispatchError> {
        let event: Arc<dyn Event> = event;
        let kind = event.kind();
        let listeners = self.collect(kind)?;
        let spawned = listeners.len();

        for listener in listeners {
            let future = (listener.handler)(Arc::clone(&event));
            let priority = listener.priority;
            tokio::spawn(async move {
                if let Err(error) = future.await {
                    warn!(
                        kind = kind.name(),
                        priority,
                        error = %error,
                        "thrown event listener failed"
                    );
                }
            });
        }

        Ok(spawned)
    }

    /// Gather listeners for `kind` from every reachable dispatcher, merged
    /// into delivery order.
    fn collect(&self, kind: &'static EventKind) -> Result<Vec<Listener>, DispatchError> {
        let mut visited: HashSet<u64> = HashSet::new();
        let mut queue: VecDeque<Arc<Inner>> = VecDeque::from([Arc::clone(&self.inner)]);
        let mut merged: Vec<Listener> = Vec::new();

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node.id) {
                continue;
            }

            {
                let registry = node
                    .listeners
                    .read()
                    .map_err(|_poisoned| DispatchError::RegistryPoisoned)?;
                for ancestor in kind.lineage() {
                    if let Some(slot) = registry.get(ancestor.name()) {
                        merged.extend(slot.iter().cloned());
                    }
                }
            }

            let links = node
                .links
                .read()
                .map_err(|_poisoned| DispatchError::RegistryPoisoned)?;
            for link in links.iter().filter_map(Weak::upgrade) {
                if !visited.contains(&link.id) {
                    queue.push_back(link);
                }
            }
        }

        merged.sort_by_key(order_key);
        Ok(merged)
    }
}

fn order_key(listener: &Listener) -> (core::cmp::Reverse<i32>, u64) {
    (core::cmp::Reverse(listener.priority), listener.seq)
}

fn add_link(from: &Arc<Inner>, to: &Arc<Inner>) -> Result<(), DispatchError> {
    let mut links = from
        .links
        .write()
        .map_err(|_poisoned| DispatchError::RegistryPoisoned)?;
    links.retain(|w| w.strong_count() > 0);
    let already = links
        .iter()
        .filter_map(Weak::upgrade)
        .any(|existing| existing.id == to.id);
    if !already {
        links.push(Arc::downgrade(to));
    }
    Ok(())
}

fn remove_link(from: &Arc<Inner>, target: u64) -> Result<(), DispatchError> {
    let mut links = from
        .links
        .write()
        .map_err(|_poisoned| DispatchError::RegistryPoisoned)?;
    links.retain(|w| w.upgrade().is_some_and(|existing| existing.id != target));
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
