use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use std::path::PathBuf;

/// Runtime configuration for the `typeahead` binary.
///
/// These settings control how fast the simulated user types, how slow the
/// simulated backend is, and how many rows each query asks for. All values
/// are parsed from CLI arguments or environment variables (a `.env` file is
/// honoured), with defaults that make superseded queries easy to observe.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "typeahead",
    version,
    about = "Types each stdin line one keystroke at a time against a word-list backend"
)]
pub struct CliArgs {
    /// Newline-separated word list to search. Blank lines and lines starting
    /// with `#` are ignored. A small built-in list is used when omitted.
    ///
    /// Environment variable: `WORDS_FILE`
    #[arg(long, env = "WORDS_FILE")]
    pub words_file: Option<PathBuf>,

    /// Maximum number of rows requested per query.
    ///
    /// Environment variable: `RESULT_LIMIT`
    #[arg(long, env = "RESULT_LIMIT", default_value_t = typeahead::DEFAULT_RESULT_LIMIT)]
    pub result_limit: usize,

    /// Simulated latency, in milliseconds, after each scanned chunk of words.
    ///
    /// Higher values make each query slow enough to be interrupted by the
    /// next keystroke.
    ///
    /// Environment variable: `BACKEND_LATENCY_MS`
    #[arg(long, env = "BACKEND_LATENCY_MS", default_value_t = 30)]
    pub backend_latency_ms: u64,

    /// Number of words scanned between interrupt checks.
    ///
    /// Environment variable: `SCAN_CHUNK`
    #[arg(long, env = "SCAN_CHUNK", default_value_t = 64)]
    pub scan_chunk: usize,

    /// Delay, in milliseconds, between simulated keystrokes. `0` submits every
    /// prefix back to back.
    ///
    /// Environment variable: `KEYSTROKE_INTERVAL_MS`
    #[arg(long, env = "KEYSTROKE_INTERVAL_MS", default_value_t = 15)]
    pub keystroke_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub words_file: Option<PathBuf>,
    pub result_limit: usize,
    pub backend_latency: Duration,
    pub scan_chunk: usize,
    pub keystroke_interval: Duration,
}

impl DemoConfig {
    /// Settings for the coordinator itself.
    pub fn coordinator(&self) -> typeahead::Config {
        typeahead::Config::default().with_result_limit(self.result_limit)
    }
}

impl TryFrom<CliArgs> for DemoConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.result_limit == 0 {
            bail!("RESULT_LIMIT must be greater than 0");
        }

        if args.scan_chunk == 0 {
            bail!("SCAN_CHUNK must be greater than 0");
        }

        Ok(Self {
            words_file: args.words_file,
            result_limit: args.result_limit,
            backend_latency: Duration::from_millis(args.backend_latency_ms),
            scan_chunk: args.scan_chunk,
            keystroke_interval: Duration::from_millis(args.keystroke_interval_ms),
        })
    }
}
