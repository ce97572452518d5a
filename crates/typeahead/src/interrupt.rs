//! Interrupt capability used to abort in-flight backend work early.
//!
//! Interrupts are cooperative: they only *request* that whatever is running
//! stops as soon as possible. The party doing the work decides when it
//! observes the request, either by polling an [`InterruptScope`] or by
//! awaiting [`InterruptScope::interrupted`].

use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A handle that can ask in-flight backend work to abort.
///
/// Backends that block inside a call (for example a database connection
/// stepping through a statement) expose one of these so the coordinator can
/// reach into the running call from another context.
pub trait Interrupt: Send + Sync + 'static {
    /// Requests that whatever is currently executing abort. Best-effort and
    /// non-blocking.
    fn interrupt(&self);

    /// Frees the underlying resources. Must be idempotent.
    ///
    /// The default implementation interrupts once more, which is all most
    /// handles need.
    fn release(&self) {
        self.interrupt();
    }
}

/// No-op capability for backends that only observe their cancellation token.
impl Interrupt for () {
    fn interrupt(&self) {}
}

impl<I: Interrupt> Interrupt for Arc<I> {
    fn interrupt(&self) {
        (**self).interrupt();
    }

    fn release(&self) {
        (**self).release();
    }
}

/// Error returned by work that noticed it was interrupted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, thiserror::Error)]
#[error("Operation interrupted")]
pub struct Interrupted;

#[derive(Debug, Default)]
struct Inner {
    counter: AtomicU64,
    released: AtomicBool,
    notify: Notify,
}

/// A counter-based [`Interrupt`] implementation.
///
/// Every call to [`interrupt`](Interrupt::interrupt) bumps a shared counter and
/// wakes anyone awaiting [`InterruptScope::interrupted`]. Work that wants to
/// observe interrupts takes an [`InterruptScope`] before it starts and compares
/// against the counter value it captured.
///
/// Once [released](Interrupt::release), the handle stays interrupted: every
/// existing and future scope reports an interrupt.
#[derive(Clone, Debug, Default)]
pub struct InterruptHandle {
    inner: Arc<Inner>,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the current interrupt count.
    #[inline]
    pub fn scope(&self) -> InterruptScope {
        InterruptScope {
            start_value: self.inner.counter.load(Ordering::SeqCst),
            handle: self.clone(),
        }
    }

    /// Number of interrupts issued so far.
    pub fn count(&self) -> u64 {
        self.inner.counter.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }
}

impl Interrupt for InterruptHandle {
    fn interrupt(&self) {
        self.inner.counter.fetch_add(1, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    fn release(&self) {
        if !self.inner.released.swap(true, Ordering::SeqCst) {
            #[cfg(feature = "tracing")]
            tracing::trace!("Interrupt handle released");
        }
        self.interrupt();
    }
}

/// Snapshot of an [`InterruptHandle`] taken before a unit of work starts.
pub struct InterruptScope {
    start_value: u64,
    handle: InterruptHandle,
}

impl InterruptScope {
    #[inline]
    pub fn was_interrupted(&self) -> bool {
        let inner = &self.handle.inner;
        inner.released.load(Ordering::SeqCst)
            || inner.counter.load(Ordering::SeqCst) != self.start_value
    }

    /// Returns [`Interrupted`] if an interrupt arrived after this scope was
    /// taken.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] once the handle was interrupted or released.
    #[inline]
    pub fn err_if_interrupted(&self) -> core::result::Result<(), Interrupted> {
        if self.was_interrupted() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }

    /// Resolves once an interrupt arrives after this scope was taken.
    ///
    /// Resolves immediately if one already has.
    pub async fn interrupted(&self) {
        loop {
            let notified = self.handle.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent interrupt can't slip
            // between the check and the wait.
            notified.as_mut().enable();
            if self.was_interrupted() {
                return;
            }
            notified.await;
        }
    }
}
