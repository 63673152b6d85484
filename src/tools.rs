//! Tool definitions and the batch executor backing the tool nodes.
//!
//! Three built-in tools mutate the shared state directly: `ask_questions`
//! and `record_notes` feed the research loop, and `finish_research` is the
//! terminal tool that closes the question-gathering phase. External tools
//! (search providers and the like) implement the [`Tool`] trait and are
//! looked up in a registry; their responses go through a per-run cache
//! keyed by normalized arguments.
//!
//! Tool failures are in-band: the executor converts them into error-status
//! tool responses so the agent can read the failure and correct itself,
//! rather than tearing down the run.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::agent::ToolSchema;
use crate::message::{Message, ToolCall};
use crate::state::ResearchState;

/// Name of the question-enqueueing tool.
pub const ASK_QUESTIONS: &str = "ask_questions";
/// Name of the note-recording tool.
pub const RECORD_NOTES: &str = "record_notes";
/// Name of the terminal tool that closes the research phase.
pub const FINISH_RESEARCH: &str = "finish_research";

/// Failure inside a tool implementation.
#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    /// The argument bag did not match the tool's schema.
    #[error("invalid arguments: {0}")]
    #[diagnostic(code(timeloom::tools::invalid_arguments))]
    InvalidArguments(String),

    /// The tool ran but could not produce a result.
    #[error("{0}")]
    #[diagnostic(code(timeloom::tools::failed))]
    Failed(String),
}

/// An external tool the researcher can call, such as a search provider.
///
/// Built-in state tools do not go through this trait; the executor handles
/// them inline because they need mutable access to the shared state.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema for the argument object.
    fn parameters(&self) -> serde_json::Value;

    async fn call(&self, args: &serde_json::Value) -> Result<String, ToolError>;

    /// The schema advertised to the model for this tool.
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Schema for `ask_questions`.
#[must_use]
pub fn ask_questions_schema() -> ToolSchema {
    ToolSchema {
        name: ASK_QUESTIONS.to_string(),
        description: "Queue concise research questions that can be answered by searching online."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "questions": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Questions to queue for research."
                }
            },
            "required": ["questions"]
        }),
    }
}

/// Schema for `record_notes`.
#[must_use]
pub fn record_notes_schema() -> ToolSchema {
    ToolSchema {
        name: RECORD_NOTES.to_string(),
        description: "Log dated notes into persistent memory, one event per note, \
                      formatted as (MM-DD-YYYY): <note>."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "notes": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Notes to record."
                }
            },
            "required": ["notes"]
        }),
    }
}

/// Schema for `finish_research`.
#[must_use]
pub fn finish_research_schema() -> ToolSchema {
    ToolSchema {
        name: FINISH_RESEARCH.to_string(),
        description: "Declare research complete. No further questions or notes will be accepted."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {}
        }),
    }
}

/// Extracts a required `[string]` field from a tool argument bag.
fn parse_string_list(args: &serde_json::Value, key: &str) -> Result<Vec<String>, ToolError> {
    let items = args
        .get(key)
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| {
            ToolError::InvalidArguments(format!("expected an array of strings at `{key}`"))
        })?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                ToolError::InvalidArguments(format!("`{key}` entries must be strings"))
            })
        })
        .collect()
}

/// Cache key for an external call: tool name plus the lowercased compact
/// rendering of the argument bag. serde_json keeps object keys in a stable
/// order, so semantically equal bags collide as intended.
fn cache_key(name: &str, args: &serde_json::Value) -> String {
    format!("{name}:{}", args.to_string().to_lowercase())
}

/// Executes the tool-call batches of assistant messages.
///
/// One executor exists per run: the response cache and the registry live
/// for exactly one user query.
pub struct ToolExecutor {
    registry: FxHashMap<String, Arc<dyn Tool>>,
    cache: FxHashMap<String, String>,
}

impl ToolExecutor {
    #[must_use]
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        let registry = tools
            .into_iter()
            .map(|tool| (tool.name().to_string(), tool))
            .collect();
        Self {
            registry,
            cache: FxHashMap::default(),
        }
    }

    /// Executes every call in the batch, in order.
    ///
    /// Returns one tool-response message per call. If any call fails, the
    /// entire batch is reported as failed: every call in it receives an
    /// error-status response carrying the same corrective text, so the
    /// conversation never ends up with a half-answered batch.
    pub async fn execute_batch(
        &mut self,
        state: &mut ResearchState,
        calls: &[ToolCall],
    ) -> Vec<Message> {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            state.record_tool_call(&call.name);
            match self.execute_one(state, call).await {
                Ok(content) => {
                    debug!(tool = %call.name, call_id = %call.id, "tool call succeeded");
                    responses.push(Message::tool_ok(content, &call.id, &call.name));
                }
                Err(err) => {
                    warn!(tool = %call.name, call_id = %call.id, error = %err, "tool call failed");
                    let content = format!("Error: {err}\nplease fix your mistakes.");
                    return calls
                        .iter()
                        .map(|c| Message::tool_error(content.clone(), &c.id, &c.name))
                        .collect();
                }
            }
        }
        responses
    }

    async fn execute_one(
        &mut self,
        state: &mut ResearchState,
        call: &ToolCall,
    ) -> Result<String, ToolError> {
        match call.name.as_str() {
            ASK_QUESTIONS => {
                let questions = parse_string_list(&call.args, "questions")?;
                Ok(state.enqueue_questions(questions).render("question"))
            }
            RECORD_NOTES => {
                let notes = parse_string_list(&call.args, "notes")?;
                Ok(state.record_notes(notes).render("note"))
            }
            FINISH_RESEARCH => Ok(match state.close_research() {
                Ok(()) => "Research phase closed. Proceed to build the timeline.".to_string(),
                Err(_) => {
                    "Research is already closed; finish_research has no further effect."
                        .to_string()
                }
            }),
            name => {
                let tool = self
                    .registry
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ToolError::Failed(format!("unknown tool: {name}")))?;
                let key = cache_key(name, &call.args);
                if let Some(cached) = self.cache.get(&key) {
                    debug!(tool = name, "tool response served from cache");
                    state.record_cache_hit();
                    return Ok(cached.clone());
                }
                let result = tool.call(&call.args).await?;
                self.cache.insert(key, result.clone());
                Ok(result)
            }
        }
    }
}
