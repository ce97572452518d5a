//! Simulated typing session.
//!
//! Each input line is "typed" one character at a time: every prefix is
//! submitted to the coordinator, `interval` apart, exactly as an
//! autocomplete box would on each keystroke. Only delivered results are
//! printed. Superseded submissions are expected and only counted.

use super::telemetry;
use core::{fmt::Display, time::Duration};
use portable_atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    task::JoinSet,
    time::Instant,
};
use typeahead::{Coordinator, QueryBackend, QueryFuture};

#[derive(Debug, Default)]
pub struct SessionStats {
    submitted: AtomicU64,
    delivered: AtomicU64,
    superseded: AtomicU64,
    failed: AtomicU64,
}

impl SessionStats {
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    pub fn superseded(&self) -> u64 {
        self.superseded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Types every line of `input` until EOF.
pub async fn run<B, R>(
    coordinator: &Coordinator<B>,
    input: R,
    interval: Duration,
    stats: &Arc<SessionStats>,
) -> anyhow::Result<()>
where
    B: QueryBackend,
    B::Row: Display,
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        type_line(coordinator, line, interval, stats).await;
    }

    tracing::debug!("Input exhausted");
    Ok(())
}

/// Submits each prefix of `line` and waits until every submission has
/// resolved one way or another.
#[tracing::instrument(level = "debug", skip(coordinator, interval, stats))]
pub async fn type_line<B>(
    coordinator: &Coordinator<B>,
    line: &str,
    interval: Duration,
    stats: &Arc<SessionStats>,
) where
    B: QueryBackend,
    B::Row: Display,
{
    let mut outcomes = JoinSet::new();

    let keystrokes = line
        .char_indices()
        .map(|(start, c)| start + c.len_utf8());
    for (n, end) in keystrokes.enumerate() {
        if n > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }

        let prefix = &line[..end];
        let future = coordinator.submit(prefix);
        stats.submitted.fetch_add(1, Ordering::Relaxed);
        telemetry::increment_submitted();

        outcomes.spawn(report(
            prefix.to_owned(),
            future,
            Instant::now(),
            Arc::clone(stats),
        ));
    }

    while let Some(joined) = outcomes.join_next().await {
        if let Err(e) = joined {
            tracing::warn!(error = %e, "Report task failed");
        }
    }
}

async fn report<B>(query: String, future: QueryFuture<B>, started: Instant, stats: Arc<SessionStats>)
where
    B: QueryBackend,
    B::Row: Display,
{
    let id = future.id();
    match future.await {
        Ok(rows) => {
            let latency = started.elapsed();
            stats.delivered.fetch_add(1, Ordering::Relaxed);
            telemetry::increment_delivered();
            telemetry::record_query_latency(latency.as_secs_f64() * 1_000.0);

            let rows = rows.iter().map(ToString::to_string).collect::<Vec<_>>();
            println!("{query}: {}", rows.join(", "));
            tracing::debug!(id, ?latency, rows = rows.len(), "Delivered");
        }
        Err(e) if e.is_superseded() => {
            stats.superseded.fetch_add(1, Ordering::Relaxed);
            telemetry::increment_superseded();
            tracing::trace!(id, %query, "Superseded");
        }
        Err(e) if e.is_shutdown() => {
            tracing::debug!(id, %query, "Dropped during shutdown");
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            telemetry::increment_failed();
            tracing::warn!(id, %query, error = %e, "Query failed");
        }
    }
}
