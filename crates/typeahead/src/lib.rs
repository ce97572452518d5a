//! Single-flight query coordination for "search as you type".
//!
//! A [`Coordinator`] owns one stateful [`QueryBackend`] and serializes every
//! query submitted against it. Each [`Coordinator::submit`] makes the new
//! request the freshest one, interrupts whatever the backend is executing, and
//! hands the caller a [`QueryFuture`]. A single worker task executes at most
//! one query at a time and only ever delivers the freshest request's results;
//! everything older resolves with [`Error::Superseded`].
//!
//! ```rust,ignore
//! use typeahead::{Config, Coordinator, TokioSpawner};
//!
//! let coordinator = Coordinator::open::<TokioSpawner>(backend, Config::default());
//!
//! let stale = coordinator.submit("he");
//! let fresh = coordinator.submit("hel");
//!
//! assert!(matches!(stale.await, Err(typeahead::Error::Superseded)));
//! let rows = fresh.await?;
//!
//! coordinator.close().await;
//! ```

mod backend;
mod config;
mod coordinator;
mod error;
mod inbox;
mod interrupt;
mod request;
mod runtime;
mod sequence;
mod worker;

pub use crate::backend::*;
pub use crate::config::*;
pub use crate::coordinator::*;
pub use crate::error::*;
pub use crate::interrupt::*;
pub use crate::request::{QueryFuture, QueryResult};
pub use crate::runtime::*;
pub use crate::sequence::*;
