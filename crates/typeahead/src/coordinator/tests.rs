use super::*;
use crate::{Error, InterruptHandle, QueryBackend};
use core::time::Duration;
use futures::{FutureExt, future::join_all};
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};

const FRUITS: &[&str] = &[
    "apple",
    "apricot",
    "avocado",
    "banana",
    "blueberry",
    "cherry",
];

const WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
enum FruitError {
    #[error("interrupted")]
    Interrupted,
    #[error("boom")]
    Boom,
}

/// Everything a test can observe about the backend from outside.
#[derive(Clone)]
struct Probe {
    calls: Arc<Mutex<Vec<String>>>,
    started: mpsc::UnboundedSender<String>,
    unwound: mpsc::UnboundedSender<String>,
    gate: Arc<Notify>,
    interrupts: InterruptHandle,
    closed: CancellationToken,
}

/// Prefix search over [`FRUITS`] with a few magic queries:
///
/// - `slow...` runs until its token is cancelled, then fails.
/// - `gate...` ignores its token and waits for [`Probe::gate`].
/// - `fail` fails straight away.
/// - `panic` panics.
struct FruitBackend {
    probe: Probe,
}

impl QueryBackend for FruitBackend {
    type Row = &'static str;
    type Error = FruitError;
    type Interrupt = InterruptHandle;

    fn interrupt_handle(&self) -> InterruptHandle {
        self.probe.interrupts.clone()
    }

    async fn execute(
        &mut self,
        query: &str,
        limit: usize,
        token: CancellationToken,
    ) -> core::result::Result<Vec<&'static str>, FruitError> {
        self.probe.calls.lock().push(query.to_owned());
        let _ = self.probe.started.send(query.to_owned());

        if query.starts_with("slow") {
            token.cancelled().await;
            let _ = self.probe.unwound.send(query.to_owned());
            return Err(FruitError::Interrupted);
        }
        if query.starts_with("gate") {
            self.probe.gate.notified().await;
            return Ok(vec!["gated"]);
        }
        if query == "fail" {
            return Err(FruitError::Boom);
        }
        if query == "panic" {
            panic!("fruit backend panicked");
        }

        Ok(FRUITS
            .iter()
            .copied()
            .filter(|fruit| fruit.starts_with(query))
            .take(limit)
            .collect())
    }

    async fn close(self) {
        self.probe.closed.cancel();
    }
}

struct Harness {
    probe: Probe,
    started: mpsc::UnboundedReceiver<String>,
    unwound: mpsc::UnboundedReceiver<String>,
}

impl Harness {
    fn calls(&self) -> Vec<String> {
        self.probe.calls.lock().clone()
    }

    async fn wait_started(&mut self) -> String {
        tokio::time::timeout(WAIT, self.started.recv())
            .await
            .expect("backend never started")
            .expect("backend dropped")
    }

    async fn wait_unwound(&mut self) -> String {
        tokio::time::timeout(WAIT, self.unwound.recv())
            .await
            .expect("backend never unwound")
            .expect("backend dropped")
    }
}

fn open(config: Config) -> (Coordinator<FruitBackend>, Harness) {
    let (started_tx, started) = mpsc::unbounded_channel();
    let (unwound_tx, unwound) = mpsc::unbounded_channel();
    let probe = Probe {
        calls: Arc::default(),
        started: started_tx,
        unwound: unwound_tx,
        gate: Arc::default(),
        interrupts: InterruptHandle::new(),
        closed: CancellationToken::new(),
    };

    let backend = FruitBackend {
        probe: probe.clone(),
    };
    let coordinator = Coordinator::open::<crate::TokioSpawner>(backend, config);

    (
        coordinator,
        Harness {
            probe,
            started,
            unwound,
        },
    )
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn delivers_rows_for_single_query() {
    let (coordinator, harness) = open(Config::default());

    let rows = coordinator.submit("ap").await.expect("query failed");
    assert_eq!(rows, vec!["apple", "apricot"]);
    assert_eq!(harness.calls(), vec!["ap"]);

    coordinator.close().await;
}

#[tokio::test]
async fn respects_result_limit() {
    let (coordinator, _harness) = open(Config::default().with_result_limit(1));
    assert_eq!(coordinator.config().result_limit, 1);

    let rows = coordinator.submit("a").await.expect("query failed");
    assert_eq!(rows, vec!["apple"]);

    coordinator.close().await;
}

#[tokio::test]
async fn queued_request_is_skipped_when_superseded() {
    let (coordinator, harness) = open(Config::default());

    // Nothing yields between the two submissions, so the worker can't have
    // picked up "a" yet.
    let first = coordinator.submit("a");
    let second = coordinator.submit("ab");
    assert_eq!(first.id(), 1);
    assert_eq!(second.id(), 2);

    assert!(matches!(first.await, Err(Error::Superseded)));
    assert_eq!(second.await.expect("query failed"), Vec::<&str>::new());
    assert_eq!(harness.calls(), vec!["ab"]);

    coordinator.close().await;
}

#[tokio::test]
async fn only_the_last_of_a_burst_is_delivered() {
    let (coordinator, harness) = open(Config::default());
    let typed = "blueberry";

    let futures: Vec<_> = (1..=typed.len())
        .map(|end| coordinator.submit(&typed[..end]))
        .collect();
    let results = join_all(futures).await;

    let (last, stale) = results.split_last().expect("no results");
    assert_eq!(last.as_ref().expect("last query failed"), &vec!["blueberry"]);
    assert!(stale.iter().all(|r| matches!(r, Err(Error::Superseded))));
    assert_eq!(harness.calls(), vec![typed]);

    coordinator.close().await;
}

#[tokio::test]
async fn active_query_is_interrupted_by_newer_submission() {
    let (coordinator, mut harness) = open(Config::default());

    let slow = coordinator.submit("slow");
    assert_eq!(harness.wait_started().await, "slow");
    assert_eq!(coordinator.active_id(), Some(slow.id()));
    let interrupts_before = harness.probe.interrupts.count();

    let fresh = coordinator.submit("ap");
    assert!(harness.probe.interrupts.count() > interrupts_before);

    // The backend failed, but only because it was interrupted.
    assert!(matches!(slow.await, Err(Error::Superseded)));
    assert_eq!(harness.wait_unwound().await, "slow");
    assert_eq!(fresh.await.expect("query failed"), vec!["apple", "apricot"]);
    assert_eq!(harness.calls(), vec!["slow", "ap"]);

    coordinator.close().await;
}

#[tokio::test]
async fn superseded_success_is_discarded() {
    let (coordinator, mut harness) = open(Config::default());

    let gated = coordinator.submit("gate");
    assert_eq!(harness.wait_started().await, "gate");

    let fresh = coordinator.submit("ch");
    harness.probe.gate.notify_one();

    assert!(matches!(gated.await, Err(Error::Superseded)));
    assert_eq!(fresh.await.expect("query failed"), vec!["cherry"]);

    coordinator.close().await;
}

#[tokio::test]
async fn fresh_backend_error_is_surfaced_and_worker_survives() {
    let (coordinator, harness) = open(Config::default());

    match coordinator.submit("fail").await {
        Err(Error::Backend(e)) => assert_eq!(e, FruitError::Boom),
        other => panic!("expected backend error, got {other:?}"),
    }

    let rows = coordinator.submit("ba").await.expect("query failed");
    assert_eq!(rows, vec!["banana"]);
    assert_eq!(harness.calls(), vec!["fail", "ba"]);

    coordinator.close().await;
}

#[tokio::test]
async fn stop_when_idle_changes_nothing_observable() {
    let (coordinator, harness) = open(Config::default());

    coordinator.stop();
    coordinator.stop();
    assert_eq!(coordinator.latest_id(), 2);

    let rows = coordinator.submit("ch").await.expect("query failed");
    assert_eq!(rows, vec!["cherry"]);
    assert_eq!(harness.calls(), vec!["ch"]);

    coordinator.close().await;
}

#[tokio::test]
async fn stop_supersedes_pending_request() {
    let (coordinator, harness) = open(Config::default());

    let pending = coordinator.submit("ap");
    coordinator.stop();

    assert!(matches!(pending.await, Err(Error::Superseded)));
    settle().await;
    assert!(harness.calls().is_empty());
    assert_eq!(coordinator.active_id(), None);

    coordinator.close().await;
}

#[tokio::test]
async fn stop_interrupts_active_request() {
    let (coordinator, mut harness) = open(Config::default());

    let slow = coordinator.submit("slow");
    harness.wait_started().await;

    coordinator.stop();

    assert!(matches!(slow.await, Err(Error::Superseded)));
    assert_eq!(harness.wait_unwound().await, "slow");
    settle().await;
    assert_eq!(coordinator.active_id(), None);
    assert_eq!(harness.calls(), vec!["slow"]);

    coordinator.close().await;
}

#[tokio::test]
async fn dropping_active_future_interrupts_backend() {
    let (coordinator, mut harness) = open(Config::default());

    let slow = coordinator.submit("slow");
    harness.wait_started().await;
    let latest = coordinator.latest_id();

    drop(slow);

    // No newer submission was needed to unwind it.
    assert_eq!(harness.wait_unwound().await, "slow");
    assert_eq!(coordinator.latest_id(), latest);

    let rows = coordinator.submit("av").await.expect("query failed");
    assert_eq!(rows, vec!["avocado"]);

    coordinator.close().await;
}

#[tokio::test]
async fn dropping_queued_future_skips_execution() {
    let (coordinator, harness) = open(Config::default());

    drop(coordinator.submit("ap"));
    settle().await;
    assert!(harness.calls().is_empty());

    let rows = coordinator.submit("bl").await.expect("query failed");
    assert_eq!(rows, vec!["blueberry"]);
    assert_eq!(harness.calls(), vec!["bl"]);

    coordinator.close().await;
}

#[tokio::test]
async fn close_interrupts_active_request_and_releases_backend() {
    let (coordinator, mut harness) = open(Config::default());

    let slow = coordinator.submit("slow");
    harness.wait_started().await;

    tokio::time::timeout(WAIT, coordinator.close())
        .await
        .expect("close did not finish");

    assert!(matches!(slow.await, Err(Error::Shutdown)));
    assert!(coordinator.is_closed());
    assert!(harness.probe.interrupts.is_released());
    assert!(harness.probe.closed.is_cancelled());
    assert_eq!(harness.calls(), vec!["slow"]);
}

#[tokio::test]
async fn submit_after_close_fails_fast() {
    let (coordinator, harness) = open(Config::default());
    coordinator.close().await;

    let result = coordinator
        .submit("ap")
        .now_or_never()
        .expect("submit after close must not hang");
    assert!(matches!(result, Err(Error::Shutdown)));
    assert!(harness.calls().is_empty());
}

#[tokio::test]
async fn close_resolves_pending_request() {
    let (coordinator, harness) = open(Config::default());

    let pending = coordinator.submit("ap");
    coordinator.close().await;

    assert!(matches!(pending.await, Err(Error::Shutdown)));
    assert!(harness.calls().is_empty());
}

#[tokio::test]
async fn backend_panic_shuts_coordinator_down() {
    let (coordinator, harness) = open(Config::default());

    let panicked = tokio::time::timeout(WAIT, coordinator.submit("panic"))
        .await
        .expect("panicking query never resolved");
    assert!(matches!(panicked, Err(Error::Shutdown)));

    let later = tokio::time::timeout(WAIT, coordinator.submit("ap"))
        .await
        .expect("submit after worker panic never resolved");
    assert!(matches!(later, Err(Error::Shutdown)));

    tokio::time::timeout(WAIT, coordinator.close())
        .await
        .expect("close after worker panic did not finish");

    assert!(coordinator.is_closed());
    assert!(harness.probe.interrupts.is_released());
    // The backend was dropped mid-call, never closed.
    assert!(!harness.probe.closed.is_cancelled());
    assert_eq!(harness.calls(), vec!["panic"]);
}

#[tokio::test]
async fn submit_after_close_is_not_assigned_an_id() {
    let (coordinator, _harness) = open(Config::default());
    let served = coordinator.submit("ap");
    let served_id = served.id();
    served.await.expect("query failed");
    coordinator.close().await;

    let refused = coordinator.submit("ap");
    assert_eq!(refused.id(), 0);
    assert_ne!(refused.id(), served_id);
    assert!(matches!(refused.await, Err(Error::Shutdown)));
}

#[tokio::test]
async fn close_is_idempotent() {
    let (coordinator, harness) = open(Config::default());
    let other = coordinator.clone();

    tokio::join!(coordinator.close(), other.close());
    coordinator.close().await;

    assert!(harness.probe.closed.is_cancelled());
}

#[tokio::test]
async fn dropping_last_handle_shuts_down() {
    let (coordinator, harness) = open(Config::default());
    let clone = coordinator.clone();

    drop(coordinator);
    settle().await;
    assert!(!harness.probe.closed.is_cancelled());

    drop(clone);
    tokio::time::timeout(WAIT, harness.probe.closed.cancelled())
        .await
        .expect("backend was not closed");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_submitters_freshest_wins() {
    const SUBMITTERS: usize = 64;

    let (coordinator, _harness) = open(Config::default());

    let tasks: Vec<_> = (0..SUBMITTERS)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let future = coordinator.submit("a");
                let id = future.id();
                (id, future.await)
            })
        })
        .collect();

    let mut delivered = Vec::new();
    for task in tasks {
        let (id, result) = task.await.expect("submitter panicked");
        match result {
            Ok(_) => delivered.push(id),
            Err(e) => assert!(e.is_superseded(), "unexpected error: {e}"),
        }
    }

    // Earlier submitters may win too if they finished before anyone newer
    // arrived, but the freshest one always does.
    assert!(delivered.contains(&(SUBMITTERS as u64)));
    assert_eq!(coordinator.latest_id(), SUBMITTERS as u64);

    coordinator.close().await;
}

#[cfg(feature = "async-smol")]
#[test]
fn runs_on_smol() {
    smol::block_on(async {
        let (started_tx, _started) = mpsc::unbounded_channel();
        let (unwound_tx, _unwound) = mpsc::unbounded_channel();
        let probe = Probe {
            calls: Arc::default(),
            started: started_tx,
            unwound: unwound_tx,
            gate: Arc::default(),
            interrupts: InterruptHandle::new(),
            closed: CancellationToken::new(),
        };
        let coordinator = Coordinator::open::<crate::SmolSpawner>(
            FruitBackend {
                probe: probe.clone(),
            },
            Config::default(),
        );

        let stale = coordinator.submit("b");
        let fresh = coordinator.submit("bl");

        assert!(matches!(stale.await, Err(Error::Superseded)));
        assert_eq!(fresh.await.expect("query failed"), vec!["blueberry"]);

        coordinator.close().await;
        assert!(probe.closed.is_cancelled());
    });
}
