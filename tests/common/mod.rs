#![allow(dead_code)]

//! Shared scripted fakes for workflow scenario tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::json;
use timeloom::agent::{ChatModel, ModelError, ModelResponse, TokenUsage, ToolSchema};
use timeloom::message::{Message, ToolCall};
use timeloom::tools::{Tool, ToolError};

/// A chat model that replays a fixed script of responses.
///
/// When the script runs dry it either fails (default) or keeps repeating
/// the final response (`repeating`), which is how non-converging agents are
/// simulated. Every window passed to `invoke` is recorded for inspection.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<ModelResponse>>,
    repeat_last: bool,
    last: Mutex<Option<ModelResponse>>,
    pub windows: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            repeat_last: false,
            last: Mutex::new(None),
            windows: Mutex::new(Vec::new()),
        }
    }

    /// A model that returns `response` on every invocation, forever.
    pub fn repeating(response: ModelResponse) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            repeat_last: true,
            last: Mutex::new(Some(response)),
            windows: Mutex::new(Vec::new()),
        }
    }

    pub fn invocations(&self) -> usize {
        self.windows.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(
        &self,
        messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<ModelResponse, ModelError> {
        self.windows.lock().unwrap().push(messages.to_vec());
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            *self.last.lock().unwrap() = Some(response.clone());
            return Ok(response);
        }
        if self.repeat_last {
            if let Some(response) = self.last.lock().unwrap().clone() {
                return Ok(response);
            }
        }
        Err(ModelError::new("script exhausted"))
    }
}

/// Text-only model response with token accounting.
pub fn text(content: &str) -> ModelResponse {
    ModelResponse {
        content: content.to_string(),
        tool_calls: Vec::new(),
        usage: Some(TokenUsage {
            input_tokens: 100,
            output_tokens: 25,
        }),
    }
}

/// Tool-calling model response with token accounting.
pub fn calls(tool_calls: Vec<ToolCall>) -> ModelResponse {
    ModelResponse {
        content: String::new(),
        tool_calls,
        usage: Some(TokenUsage {
            input_tokens: 100,
            output_tokens: 25,
        }),
    }
}

/// A response carrying neither text nor tool calls.
pub fn empty() -> ModelResponse {
    ModelResponse::default()
}

pub fn ask(id: &str, questions: &[&str]) -> ToolCall {
    ToolCall::new(id, "ask_questions", json!({ "questions": questions }))
}

pub fn note(id: &str, notes: &[&str]) -> ToolCall {
    ToolCall::new(id, "record_notes", json!({ "notes": notes }))
}

pub fn finish(id: &str) -> ToolCall {
    ToolCall::new(id, "finish_research", json!({}))
}

pub fn search(id: &str, query: &str) -> ToolCall {
    ToolCall::new(id, "search", json!({ "query": query }))
}

/// Canned search tool counting its real (uncached) invocations.
pub struct FakeSearch {
    pub invocations: AtomicU64,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self {
            invocations: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Tool for FakeSearch {
    fn name(&self) -> &str {
        "search"
    }
    fn description(&self) -> &str {
        "Searches the web for a query."
    }
    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        })
    }
    async fn call(&self, args: &serde_json::Value) -> Result<String, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let query = args
            .get("query")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("missing `query`".to_string()))?;
        Ok(format!("search results for: {query}"))
    }
}
