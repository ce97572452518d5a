use anyhow::Context;
use core::time::Duration;
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use typeahead::{Interrupt, InterruptHandle, Interrupted, QueryBackend};

/// Used when no `WORDS_FILE` is given.
const DEFAULT_WORDS: &str = include_str!("words.txt");

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
}

/// Case-insensitive prefix search over an in-memory word list.
///
/// The list is scanned `chunk` words at a time with a simulated `latency`
/// after each chunk, standing in for a slow storage engine. Between chunks the
/// scan checks both its [`InterruptScope`](typeahead::InterruptScope) and the
/// execution token, and bails out with [`SearchError::Interrupted`] as soon as
/// either fires.
pub struct WordListBackend {
    words: Arc<[String]>,
    latency: Duration,
    chunk: usize,
    interrupts: InterruptHandle,
}

impl WordListBackend {
    pub fn new(words: impl Into<Arc<[String]>>, latency: Duration, chunk: usize) -> Self {
        Self {
            words: words.into(),
            latency,
            chunk: chunk.max(1),
            interrupts: InterruptHandle::new(),
        }
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}

impl QueryBackend for WordListBackend {
    type Row = String;
    type Error = SearchError;
    type Interrupt = InterruptHandle;

    fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupts.clone()
    }

    #[tracing::instrument(level = "trace", skip(self, token))]
    async fn execute(
        &mut self,
        query: &str,
        limit: usize,
        token: CancellationToken,
    ) -> Result<Vec<String>, SearchError> {
        let scope = self.interrupts.scope();
        let needle = query.to_lowercase();
        let mut rows = Vec::with_capacity(limit.min(self.words.len()));

        for chunk in self.words.chunks(self.chunk) {
            scope.err_if_interrupted()?;

            rows.extend(
                chunk
                    .iter()
                    .filter(|word| word.to_lowercase().starts_with(&needle))
                    .take(limit - rows.len())
                    .cloned(),
            );
            if rows.len() >= limit {
                break;
            }

            if !self.latency.is_zero() {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return Err(Interrupted.into()),
                    () = tokio::time::sleep(self.latency) => {}
                }
            }
        }

        scope.err_if_interrupted()?;
        Ok(rows)
    }

    async fn close(self) {
        self.interrupts.release();
        tracing::debug!(words = self.words.len(), "Word list backend closed");
    }
}

/// Reads the word list from `path`, or falls back to the built-in list.
pub fn load_words(path: Option<&Path>) -> anyhow::Result<Vec<String>> {
    let Some(path) = path else {
        return Ok(parse_words(DEFAULT_WORDS));
    };

    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read word list `{}`", path.display()))?;
    let words = parse_words(&raw);
    if words.is_empty() {
        anyhow::bail!("word list `{}` is empty", path.display());
    }
    Ok(words)
}

/// One word per line. Blank lines and `#` comments are skipped.
fn parse_words(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}
