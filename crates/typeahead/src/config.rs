/// Number of rows requested from the backend when no limit is configured.
pub const DEFAULT_RESULT_LIMIT: usize = 10;

/// Tunables for a [`Coordinator`](crate::Coordinator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of rows requested per query.
    pub result_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            result_limit: DEFAULT_RESULT_LIMIT,
        }
    }
}

impl Config {
    #[must_use]
    pub const fn with_result_limit(mut self, result_limit: usize) -> Self {
        self.result_limit = result_limit;
        self
    }
}
