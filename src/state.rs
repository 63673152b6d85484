//! Shared research state for a single workflow run.
//!
//! [`ResearchState`] is the mutable heart of the engine: the question queue,
//! the answered-question records, the note log, the open/closed research
//! flag, observability counters, and the persisted message log visible to
//! the currently active agent.
//!
//! One instance exists per user query. It is exclusively owned by the
//! running workflow and threaded explicitly through every component call;
//! nothing here performs I/O.
//!
//! # Examples
//!
//! ```
//! use timeloom::state::ResearchState;
//!
//! let mut state = ResearchState::new();
//! let outcome = state.enqueue_questions(vec![
//!     "When did the project start?".to_string(),
//!     "when did   the project start?".to_string(), // duplicate after normalization
//! ]);
//! assert_eq!(outcome.accepted, 1);
//! assert_eq!(outcome.warnings.len(), 1);
//! assert_eq!(state.pop_next_question().as_deref(), Some("When did the project start?"));
//! ```

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::message::Message;

/// Running token totals across every model invocation in a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UsageCounters {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageCounters {
    /// Adds one invocation's reported token counts to the totals.
    pub fn add(&mut self, input_tokens: u64, output_tokens: u64) {
        self.input_tokens = self.input_tokens.saturating_add(input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(output_tokens);
    }

    /// Combined input and output tokens.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Result of a batched state mutation (`enqueue_questions` / `record_notes`).
///
/// Warnings are human-readable and flow back to the agent as tool feedback;
/// they are never machine-parsed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Number of items actually stored.
    pub accepted: usize,
    /// One entry per rejected item, stating why.
    pub warnings: Vec<String>,
}

impl BatchOutcome {
    /// Renders the outcome as the feedback string a tool returns to the agent.
    #[must_use]
    pub fn render(&self, noun: &str) -> String {
        let mut out = format!("Accepted {} {}(s).", self.accepted, noun);
        if !self.warnings.is_empty() {
            out.push_str("\nWarnings:");
            for warning in &self.warnings {
                out.push_str("\n- ");
                out.push_str(warning);
            }
        }
        out
    }
}

/// Error returned when `close_research` is called on an already-closed state.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("research phase is already closed")]
pub struct AlreadyClosed;

/// Normalizes a string for deduplication: trim plus collapse of internal
/// whitespace runs to a single space.
#[must_use]
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Shared mutable state for one research run.
///
/// Invariants (upheld by the mutators, checked by tests):
/// - no two queued questions are equal after whitespace normalization;
/// - no queued question is a case-insensitive substring or superstring of
///   any answered-question record;
/// - no two notes are equal case-insensitively;
/// - once `researching` is false, question and note additions are rejected.
#[derive(Clone, Debug, Default)]
pub struct ResearchState {
    /// Pending research questions, FIFO.
    pub questions: VecDeque<String>,
    /// Append-only `"<question> -> <answer>"` records.
    pub answered_questions: Vec<String>,
    /// Append-only free-text notes.
    pub notes: Vec<String>,
    /// True until the terminal tool closes the question-gathering phase.
    pub researching: bool,
    /// Token totals across the run.
    pub usage: UsageCounters,
    /// Per-tool invocation counters, keyed by tool name.
    pub tool_calls: FxHashMap<String, u64>,
    /// Number of tool invocations served from the per-run response cache.
    pub cache_hits: u64,
    /// Canonical message log visible to the currently active agent.
    pub persisted_log: Vec<Message>,
}

impl ResearchState {
    /// Creates a fresh state with `researching` open and everything empty.
    #[must_use]
    pub fn new() -> Self {
        Self {
            researching: true,
            ..Self::default()
        }
    }

    /// Enqueues questions, deduplicating against the queue, the batch
    /// itself, and the answered records.
    ///
    /// Each rejected item produces one warning. Once research is closed the
    /// whole batch is rejected.
    pub fn enqueue_questions(&mut self, questions: Vec<String>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if !self.researching {
            for question in &questions {
                outcome
                    .warnings
                    .push(format!("research is closed; rejected question: {question}"));
            }
            return outcome;
        }

        for question in questions {
            let normalized = normalize_whitespace(&question);
            if normalized.is_empty() {
                outcome.warnings.push("rejected empty question".to_string());
                continue;
            }
            if self
                .questions
                .iter()
                .any(|existing| normalize_whitespace(existing) == normalized)
            {
                outcome
                    .warnings
                    .push(format!("rejected duplicate question: {normalized}"));
                continue;
            }
            let lowered = normalized.to_lowercase();
            if self.answered_questions.iter().any(|record| {
                let record_lowered = record.to_lowercase();
                record_lowered.contains(&lowered) || lowered.contains(&record_lowered)
            }) {
                outcome.warnings.push(format!(
                    "rejected already-answered question: {normalized}"
                ));
                continue;
            }
            self.questions.push_back(normalized);
            outcome.accepted += 1;
        }
        outcome
    }

    /// Records notes, deduplicating case-insensitively against the log and
    /// the batch itself. Rejected wholesale once research is closed.
    pub fn record_notes(&mut self, notes: Vec<String>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if !self.researching {
            for note in &notes {
                outcome
                    .warnings
                    .push(format!("research is closed; rejected note: {note}"));
            }
            return outcome;
        }

        for note in notes {
            let normalized = normalize_whitespace(&note);
            if normalized.is_empty() {
                outcome.warnings.push("rejected empty note".to_string());
                continue;
            }
            let lowered = normalized.to_lowercase();
            if self
                .notes
                .iter()
                .any(|existing| existing.to_lowercase() == lowered)
            {
                outcome
                    .warnings
                    .push(format!("rejected duplicate note: {normalized}"));
                continue;
            }
            self.notes.push(normalized);
            outcome.accepted += 1;
        }
        outcome
    }

    /// Pops the head of the question queue, if any.
    pub fn pop_next_question(&mut self) -> Option<String> {
        self.questions.pop_front()
    }

    /// Appends a `"<question> -> <answer>"` record.
    pub fn record_answer(&mut self, question: &str, answer: &str) -> String {
        let record = format!("{question} -> {answer}");
        self.answered_questions.push(record.clone());
        record
    }

    /// Closes the question-gathering phase. The transition happens exactly
    /// once; a second call is rejected rather than silently ignored.
    pub fn close_research(&mut self) -> Result<(), AlreadyClosed> {
        if !self.researching {
            return Err(AlreadyClosed);
        }
        self.researching = false;
        Ok(())
    }

    /// Bumps the invocation counter for the named tool.
    pub fn record_tool_call(&mut self, name: &str) {
        *self.tool_calls.entry(name.to_string()).or_insert(0) += 1;
    }

    /// Bumps the cache-hit counter.
    pub fn record_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    /// Returns the most recent assistant message in the persisted log.
    #[must_use]
    pub fn last_assistant(&self) -> Option<&Message> {
        self.persisted_log.iter().rev().find(|m| m.is_assistant())
    }
}
