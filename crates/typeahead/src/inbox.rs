//! Single-slot register holding the freshest pending request.
//!
//! Every request waiting behind a fresher one would be discarded unexecuted
//! anyway, so instead of an unbounded queue the coordinator keeps only the
//! latest pending request. Publishing swaps the new request in atomically and
//! resolves whichever of the two is older as superseded. The worker parks on a
//! [`Notify`] while the slot is empty.

use crate::{backend::QueryBackend, request::Request};
use crossbeam_utils::atomic::AtomicCell;
use tokio::sync::Notify;

pub(crate) struct Inbox<B: QueryBackend> {
    slot: AtomicCell<Option<Request<B>>>,
    notify: Notify,
}

impl<B: QueryBackend> Default for Inbox<B> {
    fn default() -> Self {
        Self {
            slot: AtomicCell::new(None),
            notify: Notify::new(),
        }
    }
}

impl<B: QueryBackend> Inbox<B> {
    /// Makes `request` the pending request and wakes the worker.
    ///
    /// Concurrent publishers can race, so a fresher request displaced by a
    /// staler one is swapped back in until the slot holds the highest
    /// identifier seen. Each displaced loser is superseded.
    pub(crate) fn publish(&self, request: Request<B>) {
        let mut carry = request;
        loop {
            let carry_id = carry.id;
            match self.slot.swap(Some(carry)) {
                None => break,
                Some(displaced) if displaced.id < carry_id => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(id = displaced.id, by = carry_id, "Pending query superseded");
                    displaced.supersede();
                    break;
                }
                // A fresher request lost the race to us; reinstate it.
                Some(displaced) => carry = displaced,
            }
        }
        self.notify.notify_one();
    }

    /// Removes the pending request, if any.
    pub(crate) fn take(&self) -> Option<Request<B>> {
        self.slot.take()
    }

    /// Waits until a request is pending and removes it.
    pub(crate) async fn recv(&self) -> Request<B> {
        loop {
            if let Some(request) = self.take() {
                return request;
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, interrupt::Interrupted};
    use futures::FutureExt;
    use tokio_util::sync::CancellationToken;

    struct NullBackend;

    impl QueryBackend for NullBackend {
        type Row = ();
        type Error = Interrupted;
        type Interrupt = ();

        fn interrupt_handle(&self) {}

        async fn execute(
            &mut self,
            _query: &str,
            _limit: usize,
            _token: CancellationToken,
        ) -> Result<Vec<()>, Interrupted> {
            Ok(Vec::new())
        }
    }

    type Slot = tokio::sync::oneshot::Receiver<crate::QueryResult<NullBackend>>;

    fn request(id: u64) -> (Request<NullBackend>, Slot) {
        Request::new(id, format!("q{id}"))
    }

    #[test]
    fn publish_keeps_only_the_freshest() {
        let inbox = Inbox::<NullBackend>::default();
        let (first, mut first_rx) = request(1);
        let (second, mut second_rx) = request(2);

        inbox.publish(first);
        inbox.publish(second);

        assert!(matches!(first_rx.try_recv(), Ok(Err(Error::Superseded))));
        assert!(second_rx.try_recv().is_err());

        let pending = inbox.take().expect("pending request");
        assert_eq!(pending.id, 2);
        assert!(inbox.take().is_none());
    }

    #[test]
    fn stale_publish_does_not_displace_fresher() {
        let inbox = Inbox::<NullBackend>::default();
        let (fresh, mut fresh_rx) = request(5);
        let (stale, mut stale_rx) = request(4);

        inbox.publish(fresh);
        inbox.publish(stale);

        assert!(matches!(stale_rx.try_recv(), Ok(Err(Error::Superseded))));
        assert!(fresh_rx.try_recv().is_err());
        assert_eq!(inbox.take().map(|r| r.id), Some(5));
    }

    #[test]
    fn recv_returns_pending_request_without_waiting() {
        let inbox = Inbox::<NullBackend>::default();
        let (req, _rx) = request(1);
        inbox.publish(req);

        let got = inbox.recv().now_or_never().expect("request was pending");
        assert_eq!(got.id, 1);
        assert_eq!(got.query, "q1");
        assert!(inbox.recv().now_or_never().is_none());
    }
}
