//! Agent roles, system prompts, state digests, and context resets.
//!
//! Each agent works from a deliberately small window: when control hands
//! over to a role, [`reset_context`] replaces the persisted log with exactly
//! three messages: the role's system prompt, the original user request, and
//! a role-specific digest of the shared state. Agents never see each other's
//! raw conversations; the digest is the only cross-agent channel.

use chrono::Local;

use crate::message::Message;
use crate::state::ResearchState;

/// The three agent roles of the workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AgentRole {
    /// Generates research questions and decides when research is complete.
    Questioner,
    /// Answers one question at a time using search tools and records notes.
    Researcher,
    /// Assembles the final chronological timeline from answered questions
    /// and notes.
    Builder,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Questioner => "questioner",
            Self::Researcher => "researcher",
            Self::Builder => "builder",
        };
        f.write_str(name)
    }
}

fn current_date() -> String {
    format!("{} (MM-DD-YYYY)", Local::now().format("%m-%d-%Y"))
}

fn current_time() -> String {
    Local::now().format("%I:%M %p").to_string()
}

/// Renders a list as numbered `1. item` lines, or `(none)` when empty.
fn numbered<S: AsRef<str>>(items: impl IntoIterator<Item = S>) -> String {
    let lines: Vec<String> = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.as_ref()))
        .collect();
    if lines.is_empty() {
        "(none)".to_string()
    } else {
        lines.join("\n")
    }
}

impl AgentRole {
    /// The role's system prompt, with the current date and time injected.
    #[must_use]
    pub fn system_prompt(&self) -> String {
        match self {
            Self::Questioner => format!(
                "You are a timeline researcher. \
                 You will call ask_questions to produce concise questions appropriate to the user's prompt that can be researched online. \
                 If no more questions are needed, you will NOT call ask_questions, and will simply output 'done'. \
                 You may produce up to 3 questions per call. \
                 You MUST ask questions that forward the understanding of the user prompt (ex. try asking, what happened in year/month/date X?). \
                 You MUST produce diverse questions (ex, don't make multiple questions around the same date) unless a certain date is extremely important or queried by the user. \
                 When research is complete, call finish_research. \
                 Today is {}. The time is {}.",
                current_date(),
                current_time()
            ),
            Self::Researcher => format!(
                "You are a timeline researcher. \
                 You will be assigned a research question. \
                 Your job is to search online to answer your assigned question. You may search up to 3 times. \
                 After searching, you will log dates found into your notes to place them in persistent memory. \
                 Your log MUST follow this format -> (MM-DD-YYYY): <note>. \
                 Do NOT log identical events: two notes cannot talk about the same event. \
                 After logging notes, you will output a concise response under 50 words. \
                 If you do not know the answer, write 'I could not find anything on this'. \
                 Today is {}. The time is {}.",
                current_date(),
                current_time()
            ),
            Self::Builder => "You are a timeline builder. \
                 You will take the provided notes and questions/answers and build an event timeline. \
                 You will build a list of events in chronological order. \
                 Your output MUST follow this format -> (MM-DD-YYYY): <event>. \
                 Your output will be displayed as markdown text. \
                 Use both the notes and the questions and answers to build this timeline."
                .to_string(),
        }
    }

    /// Builds the role-specific digest of the shared state.
    ///
    /// The questioner sees the full queue; the researcher sees only the head
    /// question it must answer; the builder sees no open questions at all.
    #[must_use]
    pub fn digest(&self, state: &ResearchState) -> String {
        match self {
            Self::Questioner => format!(
                "[Questioner] :\n\n\
                 Questions:\n{}\n\n\
                 Answered Questions:\n{}\n\n\
                 Notes:\n{}",
                numbered(&state.questions),
                numbered(&state.answered_questions),
                numbered(&state.notes),
            ),
            Self::Researcher => format!(
                "[Researcher] Self-Reflect:\n\n\
                 Research Question:\n{}\n\n\
                 Answered Questions:\n{}\n\n\
                 Notes:\n{}",
                state.questions.front().map_or("(none)", String::as_str),
                numbered(&state.answered_questions),
                numbered(&state.notes),
            ),
            Self::Builder => format!(
                "[Timeline Builder] Self-Reflect:\n\n\
                 Answered Questions:\n{}\n\n\
                 Notes:\n{}",
                numbered(&state.answered_questions),
                numbered(&state.notes),
            ),
        }
    }
}

/// Replaces the persisted log with the role's fresh three-message window.
pub fn reset_context(state: &mut ResearchState, role: AgentRole, user_request: &str) {
    tracing::debug!(role = %role, "resetting agent context");
    state.persisted_log = vec![
        Message::system(role.system_prompt()),
        Message::user(user_request),
        Message::user(role.digest(state)),
    ];
}
