use crate::{backend::QueryBackend, coordinator::Shared, error::Error, request::Request};
use std::sync::Arc;

/// Worker task that executes submitted queries one at a time.
///
/// The worker is the sole consumer of the inbox and the only caller of the
/// backend. It runs until the coordinator shuts down, then closes the backend
/// and signals completion to anyone waiting in `close`.
///
/// Each iteration:
///
/// 1. Clears the active identifier and parks until a request is pending.
/// 2. Skips the request if it is no longer the freshest or its caller has
///    gone away.
/// 3. Marks it active and executes it with the configured result limit while
///    watching for interrupts. An interrupt cancels the execution's token;
///    the worker still waits for the backend to return.
/// 4. Delivers the outcome if the request is still the freshest, otherwise
///    resolves it as superseded. A backend failure never ends the loop.
///
/// If the backend panics, the task is torn down and `WorkerGuard` shuts the
/// coordinator down in its place.
pub(crate) async fn worker_loop<B: QueryBackend>(mut backend: B, shared: Arc<Shared<B>>) {
    let mut guard = WorkerGuard {
        shared: Arc::clone(&shared),
        finished: false,
    };

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker started");

    loop {
        shared.sequence.clear_active();

        let request = tokio::select! {
            biased;
            () = shared.shutdown.cancelled() => break,
            request = shared.inbox.recv() => request,
        };

        if shared.shutdown.is_cancelled() {
            request.fail(Error::Shutdown);
            break;
        }

        run_request(&mut backend, &shared, request).await;
    }

    shared.sequence.clear_active();
    if let Some(pending) = shared.inbox.take() {
        pending.fail(Error::Shutdown);
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("Worker stopping, closing backend");

    backend.close().await;
    guard.finished = true;

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker stopped");
}

/// Signals `closed` when the worker task goes away, however it goes away.
///
/// A task torn down by a backend panic never reaches the end of
/// [`worker_loop`]. Dropping the guard then shuts the coordinator down so
/// that pending and later submissions fail with [`Error::Shutdown`] and
/// `close` returns. The backend is dropped without being closed.
struct WorkerGuard<B: QueryBackend> {
    shared: Arc<Shared<B>>,
    finished: bool,
}

impl<B: QueryBackend> Drop for WorkerGuard<B> {
    fn drop(&mut self) {
        if !self.finished {
            #[cfg(feature = "tracing")]
            tracing::error!("Worker exited abnormally, shutting coordinator down");
            self.shared.begin_shutdown();
            self.shared.sequence.clear_active();
            if let Some(pending) = self.shared.inbox.take() {
                pending.fail(Error::Shutdown);
            }
        }
        self.shared.closed.cancel();
    }
}

async fn run_request<B: QueryBackend>(backend: &mut B, shared: &Shared<B>, request: Request<B>) {
    let id = request.id;

    // Taken before the freshness check so an interrupt issued by a newer
    // submission in between is not lost.
    let scope = shared.signal.scope();

    if !request.should_fulfill(&shared.sequence) {
        #[cfg(feature = "tracing")]
        tracing::trace!(id, cancelled = request.is_cancelled(), "Discarding stale query");
        discard(shared, request);
        return;
    }

    shared.sequence.set_active(id);
    // Dropped before it became active, so the drop did not interrupt anyone.
    if request.is_cancelled() {
        shared.sequence.clear_active();
        discard(shared, request);
        return;
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(id, query = %request.query, "Executing query");

    let token = shared.shutdown.child_token();
    let outcome = {
        let execution = backend.execute(&request.query, shared.config.result_limit, token.clone());
        tokio::pin!(execution);

        tokio::select! {
            biased;
            outcome = &mut execution => outcome,
            () = scope.interrupted() => {
                #[cfg(feature = "tracing")]
                tracing::trace!(id, "Interrupted, waiting for backend to unwind");
                token.cancel();
                execution.await
            }
        }
    };

    if !request.should_fulfill(&shared.sequence) {
        // Failures of a superseded request are expected fallout from the
        // interrupt, not faults worth surfacing.
        #[cfg(feature = "tracing")]
        tracing::trace!(id, failed = outcome.is_err(), "Discarding superseded result");
        discard(shared, request);
        return;
    }

    match outcome {
        Ok(rows) => {
            #[cfg(feature = "tracing")]
            tracing::trace!(id, rows = rows.len(), "Delivering result");
            request.fulfill(rows);
        }
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(id, error = %e, "Backend failed");
            request.fail(Error::Backend(e));
        }
    }
}

fn discard<B: QueryBackend>(shared: &Shared<B>, request: Request<B>) {
    if shared.shutdown.is_cancelled() {
        request.fail(Error::Shutdown);
    } else {
        request.supersede();
    }
}
