//! Message and tool-call primitives for agent conversations.
//!
//! Messages are the unit of communication between the workflow engine, the
//! language model, and tool executions. Each variant carries exactly the
//! fields that role needs, so routing and reconciliation code can match
//! exhaustively instead of sniffing optional fields.
//!
//! # Examples
//!
//! ```
//! use timeloom::message::{Message, ToolCall};
//! use serde_json::json;
//!
//! let system = Message::system("You are a timeline researcher.");
//! let user = Message::user("Timeline of the Apollo program");
//!
//! // Assistant turns may carry tool calls alongside (possibly empty) text.
//! let call = ToolCall::new("call_1", "ask_questions", json!({"questions": ["When did Apollo 11 land?"]}));
//! let assistant = Message::assistant_with_calls("", vec![call]);
//! assert_eq!(assistant.tool_calls().len(), 1);
//! ```

use serde::{Deserialize, Serialize};

/// Outcome status of a tool execution, recorded on the tool-response message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    /// The tool ran and produced a usable result.
    Ok,
    /// The tool failed; the content describes the failure for the agent.
    Error,
}

/// A structured function-call request emitted by an assistant message.
///
/// The `id` links the call to the tool-response message that answers it.
/// Ids come from the model provider and are **not** guaranteed unique across
/// retried calls; see [`crate::reconcile`] for how duplicates are paired.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call identifier.
    pub id: String,
    /// Name of the tool being invoked.
    pub name: String,
    /// Argument bag, opaque to the engine until the tool parses it.
    pub args: serde_json::Value,
}

impl ToolCall {
    /// Creates a new tool call.
    #[must_use]
    pub fn new(id: &str, name: &str, args: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            args,
        }
    }
}

/// A message in an agent conversation.
///
/// The tagged-union shape means every consumer states which roles it handles;
/// adding a role is a compile error everywhere a match needs updating.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// System prompt or instruction.
    System { content: String },
    /// User input (including synthesized state digests).
    User { content: String },
    /// Model output: text content and an ordered batch of tool calls.
    Assistant {
        content: String,
        #[serde(default)]
        tool_calls: Vec<ToolCall>,
    },
    /// Result of executing one tool call, keyed back to the call id.
    Tool {
        content: String,
        tool_call_id: String,
        name: String,
        status: ToolStatus,
    },
}

impl Message {
    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Creates an assistant message with text content and no tool calls.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Creates an assistant message carrying tool calls.
    #[must_use]
    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    /// Creates a successful tool-response message for the given call.
    #[must_use]
    pub fn tool_ok(content: impl Into<String>, tool_call_id: &str, name: &str) -> Self {
        Self::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.to_string(),
            name: name.to_string(),
            status: ToolStatus::Ok,
        }
    }

    /// Creates an error tool-response message for the given call.
    #[must_use]
    pub fn tool_error(content: impl Into<String>, tool_call_id: &str, name: &str) -> Self {
        Self::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.to_string(),
            name: name.to_string(),
            status: ToolStatus::Error,
        }
    }

    /// Returns the textual content of this message.
    #[must_use]
    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }

    /// Returns the tool calls carried by this message (empty for non-assistant roles).
    #[must_use]
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Returns `true` if this is an assistant message.
    #[must_use]
    pub fn is_assistant(&self) -> bool {
        matches!(self, Self::Assistant { .. })
    }

    /// Returns `true` if this is a tool-response message.
    #[must_use]
    pub fn is_tool_response(&self) -> bool {
        matches!(self, Self::Tool { .. })
    }
}
