//! Workflow scheduler: the node graph coordinating the three agents.
//!
//! A run walks a small fixed graph. The questioner queues research
//! questions; the dequeuer hands them one at a time to the researcher; the
//! researcher searches and answers; once the questioner declares research
//! complete (or the configured limits force the issue) the builder turns
//! the accumulated notes and answers into the final timeline.
//!
//! ```text
//! Start ─▶ questioner ─▶ questioner_tools ─▶ dequeuer ─▶ researcher ─▶ researcher_tools
//!              │  ▲            │    ▲            │  ▲         │   ▲            │
//!              │  └────────────┘    └────────────┘  └─────────┘   └────────────┘
//!              ▼
//!           builder ─▶ End
//! ```
//!
//! Every node transition counts against the step budget; a run that never
//! converges fails loudly instead of looping forever.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::{info, instrument};

use crate::agent::{AgentError, AgentRuntime, ChatModel, ToolSchema};
use crate::config::WorkflowConfig;
use crate::context::{AgentRole, reset_context};
use crate::event::{EventEmitter, WorkflowEvent};
use crate::message::Message;
use crate::reconcile::{ReconcileError, ensure_no_pending, reconcile_tool_responses};
use crate::state::ResearchState;
use crate::tools::{
    Tool, ToolExecutor, ask_questions_schema, finish_research_schema, record_notes_schema,
};

/// Nodes of the workflow graph. `Start` and `End` are virtual: they carry
/// no agent and exist only as routing endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WorkflowNode {
    Start,
    Questioner,
    QuestionerTools,
    Dequeuer,
    Researcher,
    ResearcherTools,
    Builder,
    End,
}

impl std::fmt::Display for WorkflowNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Questioner => "questioner",
            Self::QuestionerTools => "questioner_tools",
            Self::Dequeuer => "dequeuer",
            Self::Researcher => "researcher",
            Self::ResearcherTools => "researcher_tools",
            Self::Builder => "builder",
            Self::End => "end",
        };
        f.write_str(name)
    }
}

/// Fatal workflow failures.
#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowError {
    /// The run used up its step budget without reaching the end node.
    #[error("workflow did not converge within {budget} steps")]
    #[diagnostic(
        code(timeloom::workflow::step_budget),
        help("the agents are looping without making progress; inspect the event stream or raise recursion_depth")
    )]
    StepBudgetExhausted { budget: u64 },

    /// An agent turn failed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Agent(#[from] AgentError),

    /// The conversation log violated the call/response invariant.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// Error constructing a [`Workflow`].
#[derive(Debug, Error, Diagnostic)]
pub enum WorkflowBuildError {
    #[error("no model configured for the {role} agent")]
    #[diagnostic(
        code(timeloom::workflow::missing_model),
        help("call with_model(..) for a shared model or with_role_model(..) per agent")
    )]
    MissingModel { role: AgentRole },
}

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// The builder produced a timeline.
    Completed {
        timeline: String,
        state: ResearchState,
    },
    /// The abort flag was raised between steps.
    Aborted { state: ResearchState },
}

/// Builder for [`Workflow`] in the usual configure-then-build shape.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use timeloom::workflow::WorkflowBuilder;
/// # use timeloom::config::WorkflowConfig;
/// # fn model() -> Arc<dyn timeloom::agent::ChatModel> { unimplemented!() }
/// let workflow = WorkflowBuilder::new()
///     .with_model(model())
///     .with_config(WorkflowConfig::default().with_recursion_depth(80))
///     .build()
///     .unwrap();
/// ```
#[derive(Default)]
pub struct WorkflowBuilder {
    models: FxHashMap<AgentRole, Arc<dyn ChatModel>>,
    external_tools: Vec<Arc<dyn Tool>>,
    config: Option<WorkflowConfig>,
    event_sink: Option<flume::Sender<WorkflowEvent>>,
}

impl WorkflowBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses one model for all three agents.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn ChatModel>) -> Self {
        for role in [AgentRole::Questioner, AgentRole::Researcher, AgentRole::Builder] {
            self.models.insert(role, Arc::clone(&model));
        }
        self
    }

    /// Overrides the model for one agent.
    #[must_use]
    pub fn with_role_model(mut self, role: AgentRole, model: Arc<dyn ChatModel>) -> Self {
        self.models.insert(role, model);
        self
    }

    /// Registers an external tool, available to the researcher.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.external_tools.push(tool);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: WorkflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Attaches a channel receiving [`WorkflowEvent`]s during runs.
    #[must_use]
    pub fn with_event_sink(mut self, sender: flume::Sender<WorkflowEvent>) -> Self {
        self.event_sink = Some(sender);
        self
    }

    pub fn build(mut self) -> Result<Workflow, WorkflowBuildError> {
        let config = self.config.unwrap_or_default();

        let mut take_model = |role: AgentRole| {
            self.models
                .remove(&role)
                .ok_or(WorkflowBuildError::MissingModel { role })
        };

        let questioner_tools = vec![ask_questions_schema(), finish_research_schema()];
        let mut researcher_tools = vec![record_notes_schema()];
        researcher_tools.extend(self.external_tools.iter().map(|tool| tool.schema()));

        let questioner = AgentRuntime::new(
            AgentRole::Questioner,
            take_model(AgentRole::Questioner)?,
            questioner_tools,
            config.max_empty_retries,
        );
        let researcher = AgentRuntime::new(
            AgentRole::Researcher,
            take_model(AgentRole::Researcher)?,
            researcher_tools,
            config.max_empty_retries,
        );
        let builder = AgentRuntime::new(
            AgentRole::Builder,
            take_model(AgentRole::Builder)?,
            Vec::<ToolSchema>::new(),
            config.max_empty_retries,
        );

        Ok(Workflow {
            questioner,
            researcher,
            builder,
            external_tools: self.external_tools,
            config,
            emitter: self
                .event_sink
                .map_or_else(EventEmitter::disabled, EventEmitter::new),
            abort: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// A compiled workflow, reusable across runs. Each run gets a fresh
/// [`ResearchState`] and tool executor.
pub struct Workflow {
    questioner: AgentRuntime,
    researcher: AgentRuntime,
    builder: AgentRuntime,
    external_tools: Vec<Arc<dyn Tool>>,
    config: WorkflowConfig,
    emitter: EventEmitter,
    abort: Arc<AtomicBool>,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    /// Shared flag that aborts the run at the next step boundary. Cleared
    /// at the start of every run.
    #[must_use]
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Runs the workflow for one user request.
    #[instrument(skip(self), fields(budget = self.config.recursion_depth))]
    pub async fn run(&self, user_request: &str) -> Result<RunOutcome, WorkflowError> {
        // A previous run's abort request must not carry into this one.
        self.abort.store(false, Ordering::Relaxed);
        let mut state = ResearchState::new();
        let mut executor = ToolExecutor::new(self.external_tools.clone());
        let mut current = WorkflowNode::Start;
        let mut step: u64 = 0;
        let mut timeline = String::new();

        while current != WorkflowNode::End {
            if self.abort.load(Ordering::Relaxed) {
                info!(step, node = %current, "run aborted");
                return Ok(RunOutcome::Aborted { state });
            }
            step += 1;
            if step > self.config.recursion_depth {
                return Err(WorkflowError::StepBudgetExhausted {
                    budget: self.config.recursion_depth,
                });
            }
            self.emitter.emit(WorkflowEvent::NodeEntered {
                node: current,
                step,
            });

            current = match current {
                WorkflowNode::Start => {
                    reset_context(&mut state, AgentRole::Questioner, user_request);
                    WorkflowNode::Questioner
                }
                WorkflowNode::Questioner => {
                    let message = self.agent_turn(&self.questioner, &mut state).await?;
                    let research_done = message.tool_calls().is_empty()
                        || state.answered_questions.len() >= self.config.max_questions
                        || state.notes.len() >= self.config.max_notes;
                    if research_done {
                        reset_context(&mut state, AgentRole::Builder, user_request);
                        WorkflowNode::Builder
                    } else {
                        WorkflowNode::QuestionerTools
                    }
                }
                WorkflowNode::QuestionerTools => {
                    self.tool_turn(&mut state, &mut executor).await?;
                    if state.questions.is_empty() {
                        WorkflowNode::Questioner
                    } else {
                        WorkflowNode::Dequeuer
                    }
                }
                WorkflowNode::Dequeuer => {
                    if state.questions.is_empty() {
                        reset_context(&mut state, AgentRole::Questioner, user_request);
                        WorkflowNode::Questioner
                    } else {
                        reset_context(&mut state, AgentRole::Researcher, user_request);
                        WorkflowNode::Researcher
                    }
                }
                WorkflowNode::Researcher => {
                    let message = self.agent_turn(&self.researcher, &mut state).await?;
                    if message.tool_calls().is_empty() {
                        if let Some(question) = state.pop_next_question() {
                            let record = state.record_answer(&question, message.content());
                            info!(%question, "question answered");
                            self.emitter
                                .emit(WorkflowEvent::QuestionAnswered { record });
                        }
                        WorkflowNode::Dequeuer
                    } else {
                        WorkflowNode::ResearcherTools
                    }
                }
                WorkflowNode::ResearcherTools => {
                    self.tool_turn(&mut state, &mut executor).await?;
                    WorkflowNode::Researcher
                }
                WorkflowNode::Builder => {
                    let message = self.agent_turn(&self.builder, &mut state).await?;
                    timeline = message.content().to_string();
                    WorkflowNode::End
                }
                WorkflowNode::End => WorkflowNode::End,
            };
        }

        info!(
            steps = step,
            answered = state.answered_questions.len(),
            notes = state.notes.len(),
            tokens = state.usage.total(),
            "run completed"
        );
        self.emitter.emit(WorkflowEvent::RunFinished { steps: step });
        Ok(RunOutcome::Completed { timeline, state })
    }

    async fn agent_turn(
        &self,
        agent: &AgentRuntime,
        state: &mut ResearchState,
    ) -> Result<Message, WorkflowError> {
        let message = agent.take_turn(state).await?;
        if !message.content().trim().is_empty() {
            self.emitter.emit(WorkflowEvent::AssistantMessage {
                role: agent.role,
                content: message.content().to_string(),
            });
        }
        for call in message.tool_calls() {
            self.emitter.emit(WorkflowEvent::ToolCallRequested {
                name: call.name.clone(),
                args: call.args.clone(),
            });
        }
        Ok(message)
    }

    /// Executes the pending tool batch of the latest assistant message and
    /// reconciles the responses into the persisted log. Any call left
    /// unanswered afterwards is an invariant violation.
    async fn tool_turn(
        &self,
        state: &mut ResearchState,
        executor: &mut ToolExecutor,
    ) -> Result<(), WorkflowError> {
        let calls = state
            .last_assistant()
            .map(|message| message.tool_calls().to_vec())
            .unwrap_or_default();

        let transient = executor.execute_batch(state, &calls).await;
        for response in &transient {
            if let Message::Tool { content, name, .. } = response {
                self.emitter.emit(WorkflowEvent::ToolResponse {
                    name: name.clone(),
                    content: content.clone(),
                });
            }
        }
        reconcile_tool_responses(&mut state.persisted_log, &transient);
        ensure_no_pending(&state.persisted_log)?;
        Ok(())
    }
}
