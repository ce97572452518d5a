use crate::{
    backend::QueryBackend,
    coordinator::Shared,
    error::Error,
    sequence::{RequestId, SequenceState},
};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use std::sync::Arc;
use tokio::sync::oneshot;

/// What a [`QueryFuture`] resolves to.
pub type QueryResult<B> = crate::error::Result<
    Vec<<B as QueryBackend>::Row>,
    <B as QueryBackend>::Error,
>;

/// A submitted query waiting to be executed or discarded by the worker.
///
/// The caller keeps the receiving half of `slot` inside its [`QueryFuture`];
/// only the worker (or a fresher submission displacing this one) decides how
/// the slot resolves. Every path through the worker resolves or drops the
/// slot exactly once.
pub(crate) struct Request<B: QueryBackend> {
    pub(crate) id: RequestId,
    pub(crate) query: String,
    slot: oneshot::Sender<QueryResult<B>>,
}

impl<B: QueryBackend> Request<B> {
    pub(crate) fn new(id: RequestId, query: String) -> (Self, oneshot::Receiver<QueryResult<B>>) {
        let (slot, rx) = oneshot::channel();
        (Self { id, query, slot }, rx)
    }

    /// The caller dropped its [`QueryFuture`].
    pub(crate) fn is_cancelled(&self) -> bool {
        self.slot.is_closed()
    }

    pub(crate) fn should_fulfill(&self, sequence: &SequenceState) -> bool {
        sequence.is_latest(self.id) && !self.is_cancelled()
    }

    pub(crate) fn fulfill(self, rows: Vec<B::Row>) {
        self.resolve(Ok(rows));
    }

    pub(crate) fn fail(self, error: Error<B::Error>) {
        self.resolve(Err(error));
    }

    pub(crate) fn supersede(self) {
        self.fail(Error::Superseded);
    }

    fn resolve(self, result: QueryResult<B>) {
        // The receiver may already be gone; nobody is left to tell.
        let _ = self.slot.send(result);
    }
}

/// Future returned by [`Coordinator::submit`](crate::Coordinator::submit).
///
/// Resolves with the backend's rows if this request was still the freshest
/// when the backend returned, with [`Error::Backend`] if the backend failed
/// under the same condition, and with [`Error::Superseded`] or
/// [`Error::Shutdown`] otherwise.
///
/// Dropping the future before it resolves cancels the request. If the worker
/// is executing it at that moment, the backend is interrupted; otherwise the
/// worker skips it when it gets there.
#[must_use = "futures do nothing unless polled; dropping cancels the query"]
pub struct QueryFuture<B: QueryBackend> {
    id: RequestId,
    rx: oneshot::Receiver<QueryResult<B>>,
    shared: Option<Arc<Shared<B>>>,
    done: bool,
}

impl<B: QueryBackend> QueryFuture<B> {
    pub(crate) fn new(
        id: RequestId,
        rx: oneshot::Receiver<QueryResult<B>>,
        shared: Arc<Shared<B>>,
    ) -> Self {
        Self {
            id,
            rx,
            shared: Some(shared),
            done: false,
        }
    }

    /// A future that has already failed with `error`.
    pub(crate) fn failed(id: RequestId, error: Error<B::Error>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self {
            id,
            rx,
            shared: None,
            done: false,
        }
    }

    /// The identifier assigned to this request at submission, or `0` if the
    /// submission was refused because the coordinator had shut down.
    pub const fn id(&self) -> RequestId {
        self.id
    }
}

impl<B: QueryBackend> Future for QueryFuture<B> {
    type Output = QueryResult<B>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(result) => {
                this.done = true;
                // A dropped sender means the worker went away without
                // resolving us, which only happens on shutdown.
                Poll::Ready(result.unwrap_or(Err(Error::Shutdown)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<B: QueryBackend> Drop for QueryFuture<B> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(shared) = &self.shared {
            if shared.sequence.is_active(self.id) {
                #[cfg(feature = "tracing")]
                tracing::trace!(id = self.id, "Active query cancelled by caller");
                shared.interrupt();
            }
        }
    }
}
