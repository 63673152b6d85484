//! Model abstraction and the generic agent-invocation loop.
//!
//! [`ChatModel`] is the seam behind which any chat-completion provider
//! lives; the engine only ever sees [`ModelResponse`]. [`AgentRuntime`]
//! wraps a model with the retry and accounting behavior every agent shares:
//! reprompting on empty responses (capped), accumulating token usage, and
//! appending exactly one assistant message to the persisted log per logical
//! turn.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::context::AgentRole;
use crate::message::{Message, ToolCall};
use crate::state::ResearchState;

/// JSON-schema description of a tool, advertised to the model.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON schema for the argument object.
    pub parameters: serde_json::Value,
}

/// Token counts reported by the provider for one invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// One model completion: text, tool calls, and optional usage accounting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// `None` when the provider omitted or mangled the usage block; the
    /// runtime logs a warning and carries on.
    pub usage: Option<TokenUsage>,
}

impl ModelResponse {
    /// A response is empty when it carries neither text nor tool calls.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tool_calls.is_empty() && self.content.trim().is_empty()
    }
}

/// Failure reported by the model provider.
#[derive(Debug, Error, Diagnostic)]
#[error("model invocation failed: {message}")]
#[diagnostic(code(timeloom::agent::model))]
pub struct ModelError {
    pub message: String,
}

impl ModelError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A chat-completion provider.
///
/// Implementations receive the full message window and the schemas of the
/// tools available to the calling agent. Production implementations wrap an
/// HTTP client; tests use scripted fakes.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
    ) -> Result<ModelResponse, ModelError>;
}

/// Errors from an agent turn.
#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    /// The model produced only empty responses, even after reprompting.
    #[error("model returned {attempts} empty responses in a row")]
    #[diagnostic(
        code(timeloom::agent::empty_response_retries),
        help("the model kept returning neither text nor tool calls; check the provider or raise max_empty_retries")
    )]
    EmptyResponseRetries { attempts: u32 },

    /// The provider itself failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Model(#[from] ModelError),
}

/// One agent: a role, its model, and the tool schemas it may call.
///
/// The runtime owns no conversation state; the window lives in
/// [`ResearchState::persisted_log`] and reprompt messages stay local to a
/// single [`take_turn`](AgentRuntime::take_turn) call.
pub struct AgentRuntime {
    pub role: AgentRole,
    model: Arc<dyn ChatModel>,
    tools: Vec<ToolSchema>,
    max_empty_retries: u32,
}

impl AgentRuntime {
    #[must_use]
    pub fn new(
        role: AgentRole,
        model: Arc<dyn ChatModel>,
        tools: Vec<ToolSchema>,
        max_empty_retries: u32,
    ) -> Self {
        Self {
            role,
            model,
            tools,
            max_empty_retries,
        }
    }

    /// The tool schemas this agent advertises to its model.
    #[must_use]
    pub fn tools(&self) -> &[ToolSchema] {
        &self.tools
    }

    /// Runs one logical agent turn.
    ///
    /// Invokes the model on the persisted log; an empty response triggers a
    /// reprompt with a synthetic `"Provide a nonempty response."` user
    /// message appended to a *local* copy of the window only. Exactly one
    /// assistant message lands in the persisted log, no matter how many
    /// retries it took. Exhausting the retry cap is fatal.
    #[instrument(skip(self, state), fields(role = %self.role))]
    pub async fn take_turn(&self, state: &mut ResearchState) -> Result<Message, AgentError> {
        let mut window = state.persisted_log.clone();
        let mut attempts: u32 = 0;

        loop {
            let response = self.model.invoke(&window, &self.tools).await?;

            match response.usage {
                Some(usage) => state.usage.add(usage.input_tokens, usage.output_tokens),
                None => warn!(role = %self.role, "model response carried no usage accounting"),
            }

            if !response.is_empty() {
                debug!(
                    role = %self.role,
                    tool_calls = response.tool_calls.len(),
                    retries = attempts,
                    "agent turn accepted"
                );
                let message = Message::assistant_with_calls(response.content, response.tool_calls);
                state.persisted_log.push(message.clone());
                return Ok(message);
            }

            attempts += 1;
            if attempts >= self.max_empty_retries {
                return Err(AgentError::EmptyResponseRetries { attempts });
            }
            debug!(role = %self.role, attempts, "empty model response, reprompting");
            window.push(Message::user("Provide a nonempty response."));
        }
    }
}
