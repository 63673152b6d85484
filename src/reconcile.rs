//! Reconciliation of tool responses into the persisted message log.
//!
//! Tool executions happen against a transient message list; the canonical
//! conversation lives in [`ResearchState::persisted_log`]. After a tool node
//! runs, [`reconcile_tool_responses`] copies exactly the responses that
//! answer still-pending tool calls into the persisted log, in their original
//! relative order, and nothing else. Running it twice is a no-op.
//!
//! Call ids come from the model provider and may repeat across retried
//! calls, so pending calls are keyed by `(call_id, position)` rather than id
//! alone. When an id is reused, the most recent response pairs with the most
//! recent pending call.
//!
//! [`ResearchState::persisted_log`]: crate::state::ResearchState

use miette::Diagnostic;
use thiserror::Error;
use tracing::debug;

use crate::message::Message;

/// A persisted tool call that has not yet received a response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCall {
    /// Index of the owning assistant message in the persisted log.
    pub position: usize,
    pub call_id: String,
    pub name: String,
}

/// Invariant violation: a tool call remained unanswered after its tool node
/// ran and reconciliation completed.
#[derive(Debug, Error, Diagnostic)]
#[error("tool call {call_id} ({name}) was never answered")]
#[diagnostic(
    code(timeloom::reconcile::unanswered_call),
    help("every tool call in an assistant message must receive a tool response before the next model turn")
)]
pub struct ReconcileError {
    pub call_id: String,
    pub name: String,
}

/// Returns the tool calls in `log` that have no matching response yet.
///
/// A response answers the earliest unanswered call with the same id, walking
/// the log in order; each response consumes at most one call.
#[must_use]
pub fn pending_tool_calls(log: &[Message]) -> Vec<PendingCall> {
    let mut pending: Vec<(PendingCall, bool)> = Vec::new();
    for (position, message) in log.iter().enumerate() {
        match message {
            Message::Assistant { tool_calls, .. } => {
                for call in tool_calls {
                    pending.push((
                        PendingCall {
                            position,
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                        },
                        false,
                    ));
                }
            }
            Message::Tool { tool_call_id, .. } => {
                if let Some(slot) = pending
                    .iter_mut()
                    .find(|(call, answered)| !answered && call.call_id == *tool_call_id)
                {
                    slot.1 = true;
                }
            }
            _ => {}
        }
    }
    pending
        .into_iter()
        .filter_map(|(call, answered)| (!answered).then_some(call))
        .collect()
}

/// Copies into `persisted` every transient tool response that answers a
/// pending call, preserving the responses' relative order.
///
/// Matching scans the transient list newest-first and the pending set
/// newest-first, pairing on `(call_id, name)`; this makes id reuse resolve
/// to the most recent call. Already-answered calls are skipped entirely, so
/// the operation is idempotent.
pub fn reconcile_tool_responses(persisted: &mut Vec<Message>, transient: &[Message]) {
    let pending = pending_tool_calls(persisted);
    if pending.is_empty() {
        return;
    }

    let mut open: Vec<&PendingCall> = pending.iter().collect();
    let mut matched_indices: Vec<usize> = Vec::new();

    for (index, message) in transient.iter().enumerate().rev() {
        let Message::Tool {
            tool_call_id, name, ..
        } = message
        else {
            continue;
        };
        let slot = open
            .iter()
            .rposition(|call| call.call_id == *tool_call_id && call.name == *name);
        if let Some(slot) = slot {
            open.remove(slot);
            matched_indices.push(index);
            if open.is_empty() {
                break;
            }
        }
    }

    matched_indices.sort_unstable();
    debug!(
        pending = pending.len(),
        matched = matched_indices.len(),
        "reconciled tool responses"
    );
    for index in matched_indices {
        persisted.push(transient[index].clone());
    }
}

/// Fails if any tool call in `log` is still unanswered.
pub fn ensure_no_pending(log: &[Message]) -> Result<(), ReconcileError> {
    match pending_tool_calls(log).into_iter().next() {
        Some(call) => Err(ReconcileError {
            call_id: call.call_id,
            name: call.name,
        }),
        None => Ok(()),
    }
}
