//! Scripted workflow run.
//!
//! Drives the whole engine end to end with a canned model and search tool,
//! printing the event stream and the resulting timeline. Useful for seeing
//! the node routing and context resets without any provider credentials.
//!
//! Running:
//! ```bash
//! cargo run --example scripted_run
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use miette::{IntoDiagnostic, Result};
use serde_json::json;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use timeloom::agent::{ChatModel, ModelError, ModelResponse, TokenUsage, ToolSchema};
use timeloom::config::WorkflowConfig;
use timeloom::event::WorkflowEvent;
use timeloom::message::{Message, ToolCall};
use timeloom::tools::{Tool, ToolError};
use timeloom::workflow::{RunOutcome, WorkflowBuilder};

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,timeloom=debug"))
        .unwrap();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

/// Replays a fixed conversation, synthesizing fresh call ids per turn.
struct CannedModel {
    turns: Mutex<VecDeque<Turn>>,
}

enum Turn {
    Say(&'static str),
    Call(&'static str, serde_json::Value),
}

impl CannedModel {
    fn new(turns: Vec<Turn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
        }
    }
}

#[async_trait]
impl ChatModel for CannedModel {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<ModelResponse, ModelError> {
        let turn = self
            .turns
            .lock()
            .expect("poisoned script")
            .pop_front()
            .ok_or_else(|| ModelError::new("script exhausted"))?;
        let usage = Some(TokenUsage {
            input_tokens: 120,
            output_tokens: 30,
        });
        Ok(match turn {
            Turn::Say(text) => ModelResponse {
                content: text.to_string(),
                tool_calls: Vec::new(),
                usage,
            },
            Turn::Call(name, args) => ModelResponse {
                content: String::new(),
                tool_calls: vec![ToolCall::new(&Uuid::new_v4().to_string(), name, args)],
                usage,
            },
        })
    }
}

struct CannedSearch;

#[async_trait]
impl Tool for CannedSearch {
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
        Ok(format!(
            "Apollo 11 launched on July 16, 1969 and landed on July 20, 1969. (query: {})",
            args["query"]
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    miette::set_panic_hook();

    let questioner = Arc::new(CannedModel::new(vec![
        Turn::Call(
            "ask_questions",
            json!({"questions": ["When did Apollo 11 launch and land?"]}),
        ),
        Turn::Say("done"),
    ]));
    let researcher = Arc::new(CannedModel::new(vec![
        Turn::Call("search", json!({"query": "apollo 11 launch landing dates"})),
        Turn::Call(
            "record_notes",
            json!({"notes": [
                "(07-16-1969): Apollo 11 launches from Kennedy Space Center",
                "(07-20-1969): Apollo 11 lands on the Moon",
            ]}),
        ),
        Turn::Say("Apollo 11 launched July 16, 1969 and landed July 20, 1969."),
    ]));
    let builder = Arc::new(CannedModel::new(vec![Turn::Say(
        "(07-16-1969): Apollo 11 launches\n(07-20-1969): Apollo 11 lands on the Moon",
    )]));

    let (tx, rx) = flume::unbounded();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv_async().await {
            match event {
                WorkflowEvent::NodeEntered { node, step } => println!("[step {step}] -> {node}"),
                WorkflowEvent::AssistantMessage { role, content } => {
                    println!("  {role}: {content}");
                }
                WorkflowEvent::ToolCallRequested { name, args } => {
                    println!("  tool call: {name} {args}");
                }
                WorkflowEvent::ToolResponse { name, content } => {
                    println!("  tool response ({name}): {content}");
                }
                WorkflowEvent::QuestionAnswered { record } => println!("  answered: {record}"),
                WorkflowEvent::RunFinished { steps } => println!("finished in {steps} steps"),
            }
        }
    });

    let workflow = WorkflowBuilder::new()
        .with_role_model(timeloom::context::AgentRole::Questioner, questioner)
        .with_role_model(timeloom::context::AgentRole::Researcher, researcher)
        .with_role_model(timeloom::context::AgentRole::Builder, builder)
        .with_tool(Arc::new(CannedSearch))
        .with_config(WorkflowConfig::from_env())
        .with_event_sink(tx)
        .build()?;

    match workflow.run("Timeline of the Apollo 11 mission").await? {
        RunOutcome::Completed { timeline, state } => {
            println!("\n=== timeline ===\n{timeline}\n");
            println!(
                "tokens: {} in / {} out, cache hits: {}",
                state.usage.input_tokens, state.usage.output_tokens, state.cache_hits
            );
        }
        RunOutcome::Aborted { .. } => println!("run aborted"),
    }

    // Dropping the workflow closes the event channel and ends the printer.
    drop(workflow);
    printer.await.into_diagnostic()?;
    Ok(())
}
