//! Workflow progress events.
//!
//! The engine emits a small event stream over an optional `flume` channel so
//! a front end can render progress live (agent text, tool activity, step
//! transitions) without the engine knowing anything about rendering. With no
//! sink attached, emission is a no-op.

use crate::context::AgentRole;
use crate::workflow::WorkflowNode;

/// One observable step of a workflow run.
#[derive(Clone, Debug, PartialEq)]
pub enum WorkflowEvent {
    /// The scheduler entered a node.
    NodeEntered { node: WorkflowNode, step: u64 },
    /// An agent produced text output.
    AssistantMessage { role: AgentRole, content: String },
    /// An agent requested a tool call.
    ToolCallRequested {
        name: String,
        args: serde_json::Value,
    },
    /// A tool call produced a response.
    ToolResponse { name: String, content: String },
    /// A research question received its answer.
    QuestionAnswered { record: String },
    /// The run reached the end node.
    RunFinished { steps: u64 },
}

/// Fire-and-forget emitter wrapping an optional channel sender.
#[derive(Clone, Default)]
pub struct EventEmitter {
    sender: Option<flume::Sender<WorkflowEvent>>,
}

impl EventEmitter {
    /// An emitter that drops every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// An emitter feeding the given channel.
    #[must_use]
    pub fn new(sender: flume::Sender<WorkflowEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Sends an event if a sink is attached. A disconnected receiver is
    /// logged and otherwise ignored; observability never fails a run.
    pub fn emit(&self, event: WorkflowEvent) {
        if let Some(sender) = &self.sender {
            if sender.send(event).is_err() {
                tracing::debug!("event sink disconnected, dropping event");
            }
        }
    }
}
