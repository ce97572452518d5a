#![doc = include_str!("../README.md")]

mod demo;

use clap::Parser;
use demo::backend::{WordListBackend, load_words};
use demo::config::{CliArgs, DemoConfig};
use demo::session::{self, SessionStats};
use demo::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::signal;
use typeahead::{Coordinator, TokioSpawner};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = DemoConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let words = load_words(config.words_file.as_deref())?;
    let backend = WordListBackend::new(words, config.backend_latency, config.scan_chunk);
    log_startup_info(&backend, &config);

    let coordinator = Coordinator::open::<TokioSpawner>(backend, config.coordinator());
    let stats = Arc::new(SessionStats::default());
    let input = BufReader::new(tokio::io::stdin());

    let outcome = tokio::select! {
        res = session::run(&coordinator, input, config.keystroke_interval, &stats) => res,
        res = shutdown_signal() => res.map_err(anyhow::Error::from),
    };

    // Nothing typed so far should print once we start tearing down.
    coordinator.stop();
    coordinator.close().await;

    tracing::info!(
        submitted = stats.submitted(),
        delivered = stats.delivered(),
        superseded = stats.superseded(),
        failed = stats.failed(),
        "Session finished"
    );

    providers.shutdown();
    outcome
}

fn log_startup_info(backend: &WordListBackend, config: &DemoConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Searching {} words with full config: {:#?}",
            backend.word_count(),
            config
        );
    } else {
        tracing::info!(
            "Searching {} words, {} results per query",
            backend.word_count(),
            config.result_limit
        );
    }
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())?
            .recv()
            .await;
        Ok::<_, std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    tokio::select! {
        res = signal::ctrl_c() => {
            res?;
            tracing::info!("Received Ctrl+C signal");
        },
        res = terminate => {
            res?;
            tracing::info!("Received SIGTERM signal");
        },
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    Ok(())
}
