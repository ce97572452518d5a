use crate::interrupt::Interrupt;
use core::future::Future;
use tokio_util::sync::CancellationToken;

/// A stateful query engine driven by a [`Coordinator`].
///
/// The coordinator's worker is the only caller of [`execute`], so an
/// implementation never sees two executions at once and needs no
/// connection-level locking. The backend is moved into the worker task when
/// the coordinator opens and handed to [`close`] when it shuts down.
///
/// # Cancellation
///
/// Every execution receives a fresh [`CancellationToken`]. It is cancelled as
/// soon as the request goes stale or the coordinator closes. Cancellation is
/// cooperative: the coordinator keeps awaiting the execution after cancelling
/// it, so the backend decides how quickly to unwind. A backend that blocks
/// where it can't watch the token should also hand out an
/// [`interrupt_handle`] that reaches into the running call.
///
/// [`Coordinator`]: crate::Coordinator
/// [`execute`]: QueryBackend::execute
/// [`close`]: QueryBackend::close
/// [`interrupt_handle`]: QueryBackend::interrupt_handle
pub trait QueryBackend: Send + 'static {
    /// A single result row.
    type Row: Send + 'static;

    /// Backend-specific failure.
    type Error: core::error::Error + Send + Sync + 'static;

    /// Capability used to interrupt an in-flight [`execute`](Self::execute).
    type Interrupt: Interrupt;

    /// Returns the capability the coordinator will use to abort in-flight
    /// work. Called once, when the coordinator opens.
    fn interrupt_handle(&self) -> Self::Interrupt;

    /// Runs `query`, returning at most `limit` rows in ranked order.
    fn execute(
        &mut self,
        query: &str,
        limit: usize,
        token: CancellationToken,
    ) -> impl Future<Output = Result<Vec<Self::Row>, Self::Error>> + Send;

    /// Releases the underlying connection.
    fn close(self) -> impl Future<Output = ()> + Send
    where
        Self: Sized,
    {
        async {}
    }
}
