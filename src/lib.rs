//! # timeloom
//!
//! A multi-agent timeline research workflow engine.
//!
//! Three LLM agents cooperate over a shared [`state::ResearchState`] to turn
//! a user request into a chronological timeline:
//!
//! - the **questioner** queues research questions and decides when enough is
//!   known;
//! - the **researcher** answers one question at a time with search tools and
//!   records dated notes;
//! - the **builder** assembles the final timeline from answers and notes.
//!
//! A fixed node graph with conditional routing ([`workflow`]) coordinates
//! them, resetting each agent's context on handoff so every agent works from
//! a small, focused window. Tool responses are merged into the conversation
//! by an idempotent reconciler ([`reconcile`]) that tolerates provider id
//! reuse.
//!
//! Models and search tools stay behind traits ([`agent::ChatModel`],
//! [`tools::Tool`]); the engine ships no provider bindings.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use timeloom::config::WorkflowConfig;
//! use timeloom::workflow::{RunOutcome, WorkflowBuilder};
//!
//! # fn model() -> Arc<dyn timeloom::agent::ChatModel> { unimplemented!() }
//! # async fn demo() -> miette::Result<()> {
//! let workflow = WorkflowBuilder::new()
//!     .with_model(model())
//!     .with_config(WorkflowConfig::default())
//!     .build()?;
//!
//! match workflow.run("Timeline of the Apollo program").await? {
//!     RunOutcome::Completed { timeline, state } => {
//!         println!("{timeline}");
//!         println!("tokens used: {}", state.usage.total());
//!     }
//!     RunOutcome::Aborted { .. } => println!("aborted"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod event;
pub mod message;
pub mod reconcile;
pub mod state;
pub mod tools;
pub mod workflow;
