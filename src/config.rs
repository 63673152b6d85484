//! Pre-run workflow configuration.

use tracing::warn;

/// Limits governing one workflow run.
///
/// All limits are fixed before the run starts; nothing adjusts them
/// mid-flight.
///
/// # Examples
///
/// ```
/// use timeloom::config::WorkflowConfig;
///
/// let config = WorkflowConfig::default()
///     .with_max_questions(8)
///     .with_recursion_depth(100);
/// assert_eq!(config.max_questions, 8);
/// assert_eq!(config.max_notes, 20);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Answered-question count at which the questioner is forced to the
    /// builder.
    pub max_questions: usize,
    /// Note count at which the questioner is forced to the builder.
    pub max_notes: usize,
    /// Maximum number of node transitions before the run is declared
    /// non-convergent.
    pub recursion_depth: u64,
    /// Consecutive empty model responses tolerated before an agent turn
    /// fails.
    pub max_empty_retries: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_questions: 5,
            max_notes: 20,
            recursion_depth: 50,
            max_empty_retries: 3,
        }
    }
}

impl WorkflowConfig {
    #[must_use]
    pub fn with_max_questions(mut self, max_questions: usize) -> Self {
        self.max_questions = max_questions;
        self
    }

    #[must_use]
    pub fn with_max_notes(mut self, max_notes: usize) -> Self {
        self.max_notes = max_notes;
        self
    }

    #[must_use]
    pub fn with_recursion_depth(mut self, recursion_depth: u64) -> Self {
        self.recursion_depth = recursion_depth;
        self
    }

    #[must_use]
    pub fn with_max_empty_retries(mut self, max_empty_retries: u32) -> Self {
        self.max_empty_retries = max_empty_retries;
        self
    }

    /// Loads overrides from `TIMELOOM_*` environment variables, consulting a
    /// `.env` file when present. Unparseable values keep the default and log
    /// a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();
        Self {
            max_questions: env_value("TIMELOOM_MAX_QUESTIONS")
                .unwrap_or(defaults.max_questions),
            max_notes: env_value("TIMELOOM_MAX_NOTES").unwrap_or(defaults.max_notes),
            recursion_depth: env_value("TIMELOOM_RECURSION_DEPTH")
                .unwrap_or(defaults.recursion_depth),
            max_empty_retries: env_value("TIMELOOM_MAX_EMPTY_RETRIES")
                .unwrap_or(defaults.max_empty_retries),
        }
    }
}

fn env_value<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "unparseable configuration value, keeping default");
            None
        }
    }
}
