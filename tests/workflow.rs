//! End-to-end workflow scenarios with scripted models and tools.

mod common;

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{FakeSearch, ScriptedModel, ask, calls, empty, finish, note, search, text};
use timeloom::agent::{AgentError, ChatModel, ModelError, ModelResponse, ToolSchema};
use timeloom::message::Message;
use timeloom::config::WorkflowConfig;
use timeloom::context::AgentRole;
use timeloom::event::WorkflowEvent;
use timeloom::workflow::{RunOutcome, WorkflowBuilder, WorkflowError, WorkflowNode};

/// Full happy path: one question asked, researched with a search and a
/// note, answered, then a timeline built.
#[tokio::test]
async fn single_question_run_produces_a_timeline() {
    let questioner = Arc::new(ScriptedModel::new(vec![
        calls(vec![ask("q1", &["When did Apollo 11 land?"])]),
        text("done"),
    ]));
    let researcher = Arc::new(ScriptedModel::new(vec![
        calls(vec![search("s1", "apollo 11 landing date")]),
        calls(vec![note("n1", &["(07-20-1969): Apollo 11 lands on the Moon"])]),
        text("Apollo 11 landed on July 20, 1969."),
    ]));
    let builder = Arc::new(ScriptedModel::new(vec![text(
        "(07-20-1969): Apollo 11 lands on the Moon",
    )]));
    let search_tool = Arc::new(FakeSearch::new());

    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner.clone())
        .with_role_model(AgentRole::Researcher, researcher.clone())
        .with_role_model(AgentRole::Builder, builder.clone())
        .with_tool(search_tool.clone())
        .build()
        .unwrap();

    let outcome = workflow.run("Timeline of the Apollo program").await.unwrap();
    let RunOutcome::Completed { timeline, state } = outcome else {
        panic!("expected a completed run");
    };

    assert_eq!(timeline, "(07-20-1969): Apollo 11 lands on the Moon");
    assert_eq!(
        state.answered_questions,
        vec!["When did Apollo 11 land? -> Apollo 11 landed on July 20, 1969.".to_string()]
    );
    assert_eq!(state.notes.len(), 1);
    assert!(state.questions.is_empty());

    assert_eq!(state.tool_calls.get("ask_questions"), Some(&1));
    assert_eq!(state.tool_calls.get("search"), Some(&1));
    assert_eq!(state.tool_calls.get("record_notes"), Some(&1));
    assert_eq!(search_tool.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(state.cache_hits, 0);

    // Six model invocations, each reporting 125 tokens.
    assert_eq!(state.usage.total(), 6 * 125);
}

/// Each agent starts from a fresh three-message window: system prompt, the
/// original request, and its own digest of the shared state.
#[tokio::test]
async fn agents_work_from_reset_context_windows() {
    let questioner = Arc::new(ScriptedModel::new(vec![
        calls(vec![ask("q1", &["When did it happen?"])]),
        text("done"),
    ]));
    let researcher = Arc::new(ScriptedModel::new(vec![text("It happened in 1969.")]));
    let builder = Arc::new(ScriptedModel::new(vec![text("(01-01-1969): it happened")]));

    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner.clone())
        .with_role_model(AgentRole::Researcher, researcher.clone())
        .with_role_model(AgentRole::Builder, builder.clone())
        .build()
        .unwrap();

    workflow.run("the request").await.unwrap();

    let researcher_windows = researcher.windows.lock().unwrap();
    let window = &researcher_windows[0];
    assert_eq!(window.len(), 3);
    assert!(window[0].content().contains("You are a timeline researcher"));
    assert_eq!(window[1].content(), "the request");
    assert!(window[2].content().contains("When did it happen?"));

    // The second questioner turn sees its own digest, not the researcher's
    // conversation, and the digest carries the answered record.
    let questioner_windows = questioner.windows.lock().unwrap();
    let second = &questioner_windows[1];
    assert_eq!(second.len(), 3);
    assert!(
        second[2]
            .content()
            .contains("When did it happen? -> It happened in 1969.")
    );

    let builder_windows = builder.windows.lock().unwrap();
    assert_eq!(builder_windows[0].len(), 3);
    assert!(builder_windows[0][2].content().contains("[Timeline Builder]"));
}

/// Tool responses land in the questioner's window after the tool node runs.
#[tokio::test]
async fn tool_responses_are_reconciled_into_the_agent_window() {
    let questioner = Arc::new(ScriptedModel::new(vec![
        calls(vec![ask("q1", &[])]),
        text("done"),
    ]));
    let builder = Arc::new(ScriptedModel::new(vec![text("timeline")]));

    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner.clone())
        .with_role_model(AgentRole::Researcher, Arc::new(ScriptedModel::new(vec![])))
        .with_role_model(AgentRole::Builder, builder)
        .build()
        .unwrap();

    workflow.run("anything").await.unwrap();

    // Empty batch accepted nothing; the queue stays empty and the tool node
    // routes straight back to the questioner with the response in view.
    let windows = questioner.windows.lock().unwrap();
    let second = &windows[1];
    assert_eq!(second.len(), 5);
    assert!(second[3].is_assistant());
    assert!(second[4].is_tool_response());
    assert!(second[4].content().contains("Accepted 0 question(s)."));
}

/// The answered-question limit forces the handoff to the builder even while
/// the questioner keeps requesting more research.
#[tokio::test]
async fn answered_question_limit_forces_the_builder() {
    let questioner = Arc::new(ScriptedModel::repeating(calls(vec![ask(
        "q1",
        &["What happened next?"],
    )])));
    let researcher = Arc::new(ScriptedModel::repeating(text("An answer.")));
    let builder = Arc::new(ScriptedModel::new(vec![text("the timeline")]));

    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner)
        .with_role_model(AgentRole::Researcher, researcher)
        .with_role_model(AgentRole::Builder, builder)
        .with_config(WorkflowConfig::default().with_max_questions(1))
        .build()
        .unwrap();

    let outcome = workflow.run("topic").await.unwrap();
    let RunOutcome::Completed { timeline, state } = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(timeline, "the timeline");
    assert_eq!(state.answered_questions.len(), 1);
}

/// finish_research closes the question phase; the questioner's next
/// no-tool-call turn routes to the builder.
#[tokio::test]
async fn finish_research_closes_the_run() {
    let questioner = Arc::new(ScriptedModel::new(vec![
        calls(vec![finish("f1")]),
        text("done"),
    ]));
    let builder = Arc::new(ScriptedModel::new(vec![text("timeline")]));

    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner)
        .with_role_model(AgentRole::Researcher, Arc::new(ScriptedModel::new(vec![])))
        .with_role_model(AgentRole::Builder, builder)
        .build()
        .unwrap();

    let outcome = workflow.run("topic").await.unwrap();
    let RunOutcome::Completed { state, .. } = outcome else {
        panic!("expected a completed run");
    };
    assert!(!state.researching);
    assert_eq!(state.tool_calls.get("finish_research"), Some(&1));
}

/// A questioner that loops without making progress exhausts the step budget.
#[tokio::test]
async fn non_convergence_exhausts_the_step_budget() {
    let questioner = Arc::new(ScriptedModel::repeating(calls(vec![ask("q1", &[])])));

    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner)
        .with_role_model(AgentRole::Researcher, Arc::new(ScriptedModel::new(vec![])))
        .with_role_model(AgentRole::Builder, Arc::new(ScriptedModel::new(vec![])))
        .with_config(WorkflowConfig::default().with_recursion_depth(10))
        .build()
        .unwrap();

    let err = workflow.run("topic").await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::StepBudgetExhausted { budget: 10 }
    ));
}

/// A model that keeps returning empty responses fails the run after the
/// retry cap, not silently and not forever.
#[tokio::test]
async fn empty_responses_exhaust_the_retry_cap() {
    let questioner = Arc::new(ScriptedModel::repeating(empty()));

    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner.clone())
        .with_role_model(AgentRole::Researcher, Arc::new(ScriptedModel::new(vec![])))
        .with_role_model(AgentRole::Builder, Arc::new(ScriptedModel::new(vec![])))
        .with_config(WorkflowConfig::default().with_max_empty_retries(2))
        .build()
        .unwrap();

    let err = workflow.run("topic").await.unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Agent(AgentError::EmptyResponseRetries { attempts: 2 })
    ));
    assert_eq!(questioner.invocations(), 2);
}

/// Questioner model that raises the run's abort flag from inside its first
/// invocation and behaves normally afterwards.
struct AbortingModel {
    handle: Mutex<Option<Arc<AtomicBool>>>,
    fired: AtomicBool,
}

impl AbortingModel {
    fn new() -> Self {
        Self {
            handle: Mutex::new(None),
            fired: AtomicBool::new(false),
        }
    }

    fn arm(&self, handle: Arc<AtomicBool>) {
        *self.handle.lock().unwrap() = Some(handle);
    }
}

#[async_trait]
impl ChatModel for AbortingModel {
    async fn invoke(
        &self,
        _messages: &[Message],
        _tools: &[ToolSchema],
    ) -> Result<ModelResponse, ModelError> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            if let Some(handle) = self.handle.lock().unwrap().as_ref() {
                handle.store(true, Ordering::Relaxed);
            }
            return Ok(text("still thinking"));
        }
        Ok(text("done"))
    }
}

/// Raising the abort flag mid-run stops the run at the next step boundary.
#[tokio::test]
async fn abort_flag_stops_the_run_gracefully() {
    let questioner = Arc::new(AbortingModel::new());
    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner.clone())
        .with_role_model(AgentRole::Researcher, Arc::new(ScriptedModel::new(vec![])))
        .with_role_model(AgentRole::Builder, Arc::new(ScriptedModel::new(vec![])))
        .build()
        .unwrap();
    questioner.arm(workflow.abort_handle());

    let outcome = workflow.run("topic").await.unwrap();
    assert!(matches!(outcome, RunOutcome::Aborted { .. }));
}

/// The abort flag is cleared at the start of each run: a workflow whose
/// previous run was aborted stays reusable.
#[tokio::test]
async fn aborted_workflow_can_run_again() {
    let questioner = Arc::new(AbortingModel::new());
    let builder = Arc::new(ScriptedModel::new(vec![text("the timeline")]));
    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner.clone())
        .with_role_model(AgentRole::Researcher, Arc::new(ScriptedModel::new(vec![])))
        .with_role_model(AgentRole::Builder, builder)
        .build()
        .unwrap();
    questioner.arm(workflow.abort_handle());

    let first = workflow.run("topic").await.unwrap();
    assert!(matches!(first, RunOutcome::Aborted { .. }));

    let second = workflow.run("topic").await.unwrap();
    let RunOutcome::Completed { timeline, .. } = second else {
        panic!("expected the second run to complete");
    };
    assert_eq!(timeline, "the timeline");
}

/// Repeated identical searches are served from the per-run cache.
#[tokio::test]
async fn repeated_searches_hit_the_cache() {
    let questioner = Arc::new(ScriptedModel::new(vec![
        calls(vec![ask("q1", &["When?"])]),
        text("done"),
    ]));
    let researcher = Arc::new(ScriptedModel::new(vec![
        calls(vec![search("s1", "the event")]),
        calls(vec![search("s2", "the event")]),
        text("In 1969."),
    ]));
    let builder = Arc::new(ScriptedModel::new(vec![text("timeline")]));
    let search_tool = Arc::new(FakeSearch::new());

    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner)
        .with_role_model(AgentRole::Researcher, researcher)
        .with_role_model(AgentRole::Builder, builder)
        .with_tool(search_tool.clone())
        .build()
        .unwrap();

    let outcome = workflow.run("topic").await.unwrap();
    let RunOutcome::Completed { state, .. } = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(search_tool.invocations.load(Ordering::SeqCst), 1);
    assert_eq!(state.cache_hits, 1);
    assert_eq!(state.tool_calls.get("search"), Some(&2));
}

/// The event stream narrates the run: node entries, agent text, tool
/// activity, answered questions, and the finish marker.
#[tokio::test]
async fn event_stream_narrates_the_run() {
    let (tx, rx) = flume::unbounded();

    let questioner = Arc::new(ScriptedModel::new(vec![
        calls(vec![ask("q1", &["When?"])]),
        text("done"),
    ]));
    let researcher = Arc::new(ScriptedModel::new(vec![text("In 1969.")]));
    let builder = Arc::new(ScriptedModel::new(vec![text("timeline")]));

    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner)
        .with_role_model(AgentRole::Researcher, researcher)
        .with_role_model(AgentRole::Builder, builder)
        .with_event_sink(tx)
        .build()
        .unwrap();

    workflow.run("topic").await.unwrap();

    let events: Vec<WorkflowEvent> = rx.drain().collect();
    assert!(events.iter().any(|e| matches!(
        e,
        WorkflowEvent::NodeEntered {
            node: WorkflowNode::Researcher,
            ..
        }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        WorkflowEvent::ToolCallRequested { name, .. } if name == "ask_questions"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        WorkflowEvent::QuestionAnswered { record } if record == "When? -> In 1969."
    )));
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::RunFinished { .. })
    ));
}

/// A failing search surfaces as corrective error responses the researcher
/// can read, and the run still completes.
#[tokio::test]
async fn tool_failure_is_fed_back_to_the_agent() {
    struct BrokenSearch;

    #[async_trait::async_trait]
    impl timeloom::tools::Tool for BrokenSearch {
        fn name(&self) -> &str {
            "search"
        }
        fn description(&self) -> &str {
            "Always fails."
        }
        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn call(
            &self,
            _args: &serde_json::Value,
        ) -> Result<String, timeloom::tools::ToolError> {
            Err(timeloom::tools::ToolError::Failed(
                "provider unreachable".to_string(),
            ))
        }
    }

    let questioner = Arc::new(ScriptedModel::new(vec![
        calls(vec![ask("q1", &["When?"])]),
        text("done"),
    ]));
    let researcher = Arc::new(ScriptedModel::new(vec![
        calls(vec![search("s1", "the event")]),
        text("I could not find anything on this"),
    ]));
    let builder = Arc::new(ScriptedModel::new(vec![text("timeline")]));

    let workflow = WorkflowBuilder::new()
        .with_role_model(AgentRole::Questioner, questioner)
        .with_role_model(AgentRole::Researcher, researcher.clone())
        .with_role_model(AgentRole::Builder, builder)
        .with_tool(Arc::new(BrokenSearch))
        .build()
        .unwrap();

    let outcome = workflow.run("topic").await.unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { .. }));

    // The researcher's second turn sees the corrective error text.
    let windows = researcher.windows.lock().unwrap();
    let second = &windows[1];
    let last = second.last().unwrap();
    assert!(last.is_tool_response());
    assert!(last.content().starts_with("Error: "));
    assert!(last.content().ends_with("please fix your mistakes."));
}
