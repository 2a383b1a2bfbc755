//! Priority-ordered, kind-matched event dispatch.
//!
//! Producers publish typed events; observers subscribe to an [`EventKind`]
//! without importing the producer. Kinds form a tree, so a listener on a
//! parent kind receives every descendant event.
//!
//! # Modules
//!
//! - [`kind`] -- [`EventKind`] tags and the [`Event`] trait
//! - [`dispatcher`] -- [`EventDispatcher`] with `emit`, `throw`, and links
//! - [`error`] -- [`DispatchError`]
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//!
//! use gacha_events::{Event, EventDispatcher, EventKind, Propagation};
//!
//! const PING: EventKind = EventKind::child("ping", &EventKind::ANY);
//!
//! #[derive(Debug)]
//! struct Ping;
//!
//! impl Event for Ping {
//!     fn kind(&self) -> &'static EventKind {
//!         &PING
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().build().map(|rt| rt.block_on(async {
//! let dispatcher = EventDispatcher::new("main");
//! dispatcher
//!     .on::<Ping, _, _>(&PING, 0, |_ping| async { Ok::<_, anyhow::Error>(Propagation::Continue) })
//!     .ok();
//! let report = dispatcher.emit(Arc::new(Ping)).await.ok();
//! assert_eq!(report.map(|r| r.delivered), Some(1));
//! # })).ok();
//! ```

pub mod dispatcher;
pub mod error;
pub mod kind;

pub use dispatcher::{EmitReport, EventDispatcher, HandlerFuture, Propagation, SubscriptionId};
pub use error::DispatchError;
pub use kind::{AsAny, Event, EventKind};
