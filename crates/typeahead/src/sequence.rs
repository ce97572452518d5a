use portable_atomic::{AtomicU64, Ordering};

/// Identifier assigned to every submitted query.
///
/// Identifiers are handed out in submission order starting at `1` and are
/// never reused.
pub type RequestId = u64;

/// Sentinel stored in the active slot while the worker is idle.
pub(crate) const NO_ACTIVE: RequestId = 0;

/// Shared freshness state between callers and the worker.
///
/// Tracks two counters:
///
/// - `latest`: the identifier of the most recently submitted (or
///   stop-invalidated) request. Only ever increases.
/// - `active`: the identifier the worker is currently executing, or nothing.
///
/// Both counters are plain atomics. Freshness of a request is a single
/// comparison against `latest`, which is what lets the worker skip a burst of
/// stale submissions without executing them.
#[derive(Debug)]
pub struct SequenceState {
    #[cfg(feature = "cache-padded")]
    latest: crossbeam_utils::CachePadded<AtomicU64>,
    #[cfg(not(feature = "cache-padded"))]
    latest: AtomicU64,
    #[cfg(feature = "cache-padded")]
    active: crossbeam_utils::CachePadded<AtomicU64>,
    #[cfg(not(feature = "cache-padded"))]
    active: AtomicU64,
}

impl Default for SequenceState {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceState {
    /// Creates a state where nothing has been submitted and nothing is
    /// active.
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "cache-padded")]
            latest: crossbeam_utils::CachePadded::new(AtomicU64::new(0)),
            #[cfg(not(feature = "cache-padded"))]
            latest: AtomicU64::new(0),
            #[cfg(feature = "cache-padded")]
            active: crossbeam_utils::CachePadded::new(AtomicU64::new(NO_ACTIVE)),
            #[cfg(not(feature = "cache-padded"))]
            active: AtomicU64::new(NO_ACTIVE),
        }
    }

    /// Claims the next identifier, making it the latest.
    pub fn next_id(&self) -> RequestId {
        self.latest.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Bumps the latest identifier without a request behind it.
    ///
    /// Every identifier issued before this call stops being fresh. Returns the
    /// new latest value.
    pub fn invalidate(&self) -> RequestId {
        self.next_id()
    }

    /// Returns the latest identifier (`0` if nothing was ever submitted).
    pub fn latest(&self) -> RequestId {
        self.latest.load(Ordering::Acquire)
    }

    /// Returns `true` if `id` is still the freshest identifier.
    pub fn is_latest(&self, id: RequestId) -> bool {
        self.latest() == id
    }

    /// Returns the identifier currently executing, if any.
    pub fn active(&self) -> Option<RequestId> {
        match self.active.load(Ordering::Acquire) {
            NO_ACTIVE => None,
            id => Some(id),
        }
    }

    /// Returns `true` if `id` is the identifier currently executing.
    pub fn is_active(&self, id: RequestId) -> bool {
        id != NO_ACTIVE && self.active.load(Ordering::Acquire) == id
    }

    pub(crate) fn set_active(&self, id: RequestId) {
        self.active.store(id, Ordering::Release);
    }

    pub(crate) fn clear_active(&self) {
        self.active.store(NO_ACTIVE, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread::scope;

    #[test]
    fn ids_start_at_one_and_increase() {
        let state = SequenceState::new();
        assert_eq!(state.latest(), 0);
        assert_eq!(state.next_id(), 1);
        assert_eq!(state.next_id(), 2);
        assert!(state.is_latest(2));
        assert!(!state.is_latest(1));
    }

    #[test]
    fn invalidate_makes_every_issued_id_stale() {
        let state = SequenceState::new();
        let a = state.next_id();
        let b = state.next_id();
        let marker = state.invalidate();

        assert!(marker > b);
        assert!(!state.is_latest(a));
        assert!(!state.is_latest(b));
        assert_eq!(state.next_id(), marker + 1);
    }

    #[test]
    fn active_round_trips_through_sentinel() {
        let state = SequenceState::new();
        assert_eq!(state.active(), None);
        assert!(!state.is_active(0));

        state.set_active(7);
        assert_eq!(state.active(), Some(7));
        assert!(state.is_active(7));
        assert!(!state.is_active(6));

        state.clear_active();
        assert_eq!(state.active(), None);
        assert!(!state.is_active(7));
    }

    #[test]
    fn concurrent_ids_are_unique() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 1024;

        let state = Arc::new(SequenceState::new());
        let mut seen = scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    let state = Arc::clone(&state);
                    s.spawn(move || (0..PER_THREAD).map(|_| state.next_id()).collect::<Vec<_>>())
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().expect("thread panicked"))
                .collect::<Vec<_>>()
        });

        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), THREADS * PER_THREAD);
        assert_eq!(state.latest(), (THREADS * PER_THREAD) as u64);
    }
}
