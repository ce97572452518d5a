//! Caller-facing front door of the query coordinator.
//!
//! [`Coordinator`] assigns identifiers, interrupts stale work, publishes
//! requests to the worker, and exposes the stop and shutdown operations. All
//! shared state lives in [`Shared`], which is reference-counted between the
//! coordinator handles, the worker task, and outstanding [`QueryFuture`]s.

use crate::{
    backend::QueryBackend,
    config::Config,
    error::Error,
    inbox::Inbox,
    interrupt::{Interrupt, InterruptHandle},
    request::{QueryFuture, Request},
    runtime::Spawner,
    sequence::{NO_ACTIVE, RequestId, SequenceState},
    worker::worker_loop,
};
use portable_atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// State shared between callers and the worker.
pub(crate) struct Shared<B: QueryBackend> {
    pub(crate) config: Config,
    pub(crate) sequence: SequenceState,
    pub(crate) inbox: Inbox<B>,
    /// Wakes the worker's own watch over an executing request.
    pub(crate) signal: InterruptHandle,
    /// The backend's capability for reaching into a running call.
    pub(crate) backend_interrupt: B::Interrupt,
    /// Cancelled when shutdown begins. Parent of every execution token.
    pub(crate) shutdown: CancellationToken,
    /// Cancelled by the worker once it has stopped and closed the backend.
    pub(crate) closed: CancellationToken,
    closing: AtomicBool,
}

impl<B: QueryBackend> Shared<B> {
    pub(crate) fn new(config: Config, backend_interrupt: B::Interrupt) -> Self {
        Self {
            config,
            sequence: SequenceState::new(),
            inbox: Inbox::default(),
            signal: InterruptHandle::new(),
            backend_interrupt,
            shutdown: CancellationToken::new(),
            closed: CancellationToken::new(),
            closing: AtomicBool::new(false),
        }
    }

    /// Asks whatever is executing to abort.
    pub(crate) fn interrupt(&self) {
        self.signal.interrupt();
        self.backend_interrupt.interrupt();
    }

    /// Starts shutdown. Only the first call has any effect.
    pub(crate) fn begin_shutdown(&self) {
        if self.closing.swap(true, Ordering::AcqRel) {
            return;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Coordinator shutting down");

        // Release the interrupt capability first so an active call aborts
        // fast, then make sure nothing new can start.
        self.signal.release();
        self.backend_interrupt.release();
        self.shutdown.cancel();
        self.sequence.invalidate();

        if let Some(pending) = self.inbox.take() {
            pending.fail(Error::Shutdown);
        }
    }
}

/// Owns the shared state on behalf of every [`Coordinator`] clone and begins
/// shutdown once the last one is dropped.
struct Handle<B: QueryBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: QueryBackend> Drop for Handle<B> {
    fn drop(&mut self) {
        self.shared.begin_shutdown();
    }
}

/// Serializes "as you type" queries against one shared backend.
///
/// Only the most recently submitted request's result is ever delivered. Every
/// submission interrupts the backend, since whatever it is executing is stale
/// from that moment on, and any request still waiting is skipped without
/// touching the backend.
///
/// A coordinator is cheap to clone; clones share the same backend and
/// freshness state. Dropping the last clone begins shutdown, but only
/// [`close`](Self::close) waits for the backend to be released.
pub struct Coordinator<B: QueryBackend> {
    handle: Arc<Handle<B>>,
}

impl<B: QueryBackend> Clone for Coordinator<B> {
    fn clone(&self) -> Self {
        Self {
            handle: Arc::clone(&self.handle),
        }
    }
}

impl<B: QueryBackend> Coordinator<B> {
    /// Takes ownership of `backend` and starts the worker task on `S`.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use typeahead::{Config, Coordinator, TokioSpawner};
    ///
    /// let coordinator = Coordinator::open::<TokioSpawner>(backend, Config::default());
    /// ```
    pub fn open<S: Spawner>(backend: B, config: Config) -> Self {
        let shared = Arc::new(Shared::new(config, backend.interrupt_handle()));

        S::spawn(worker_loop(backend, Arc::clone(&shared)));

        #[cfg(feature = "tracing")]
        tracing::debug!(result_limit = config.result_limit, "Coordinator opened");

        Self {
            handle: Arc::new(Handle { shared }),
        }
    }

    fn shared(&self) -> &Arc<Shared<B>> {
        &self.handle.shared
    }

    /// Submits `query`, superseding every earlier submission.
    ///
    /// The returned [`QueryFuture`] resolves with the backend's rows only if
    /// no newer query is submitted (and [`stop`](Self::stop) is not called)
    /// before the backend returns. Fails immediately with
    /// [`Error::Shutdown`] once [`close`](Self::close) has begun; such a
    /// refused submission is not assigned an identifier and its
    /// [`id`](QueryFuture::id) is `0`.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    pub fn submit(&self, query: impl Into<String>) -> QueryFuture<B> {
        let shared = self.shared();

        if shared.shutdown.is_cancelled() {
            return QueryFuture::failed(NO_ACTIVE, Error::Shutdown);
        }

        let id = shared.sequence.next_id();
        // Whatever is executing is stale from here on.
        shared.interrupt();

        let (request, rx) = Request::new(id, query.into());

        #[cfg(feature = "tracing")]
        tracing::trace!(id, query = %request.query, "Query submitted");

        shared.inbox.publish(request);

        // Raced with `close`; the worker may already be gone.
        if shared.shutdown.is_cancelled() {
            if let Some(pending) = shared.inbox.take() {
                pending.fail(Error::Shutdown);
            }
        }

        QueryFuture::new(id, rx, Arc::clone(shared))
    }

    /// Invalidates every submitted request and interrupts the active one.
    ///
    /// Nothing submitted before this call will be delivered. Safe to call at
    /// any time, any number of times.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub fn stop(&self) {
        let shared = self.shared();
        let marker = shared.sequence.invalidate();

        if let Some(pending) = shared.inbox.take() {
            if pending.id > marker {
                // Submitted after we invalidated; it stays fresh.
                shared.inbox.publish(pending);
            } else {
                pending.supersede();
            }
        }
        shared.interrupt();

        #[cfg(feature = "tracing")]
        tracing::debug!(marker, "Coordinator stopped");
    }

    /// Shuts the coordinator down and waits for the backend to be released.
    ///
    /// Releases the interrupt capability so an executing query aborts quickly,
    /// refuses any further submissions, resolves the pending request with
    /// [`Error::Shutdown`], and waits for the worker to exit. No backend
    /// execution starts once this has been called. Idempotent: repeat calls
    /// wait for the same completion.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub async fn close(&self) {
        let shared = self.shared();
        shared.begin_shutdown();
        shared.closed.cancelled().await;

        #[cfg(feature = "tracing")]
        tracing::debug!("Coordinator closed");
    }

    /// Returns `true` once shutdown has begun.
    pub fn is_closed(&self) -> bool {
        self.shared().shutdown.is_cancelled()
    }

    /// The freshest identifier issued so far.
    pub fn latest_id(&self) -> RequestId {
        self.shared().sequence.latest()
    }

    /// The identifier the worker is executing right now, if any.
    pub fn active_id(&self) -> Option<RequestId> {
        self.shared().sequence.active()
    }

    /// The settings this coordinator was opened with.
    pub fn config(&self) -> &Config {
        &self.shared().config
    }
}

#[cfg(all(test, feature = "async-tokio"))]
mod tests;
