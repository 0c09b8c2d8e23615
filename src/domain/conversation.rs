//! Conversation state
//!
//! An append-only log of planner turns and tool-result turns. The log enforces
//! the pairing rule: every invocation requested by a planner turn is answered
//! by exactly one result, in the same order, in the turn that immediately
//! follows. A planner turn cannot be appended while invocations are pending.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::invocation::{ToolInvocation, ToolResult};

/// Output of one planner call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerTurn {
    /// Raw model output, kept for audit
    pub raw: String,

    #[serde(default)]
    pub invocations: Vec<ToolInvocation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

/// Results of one dispatch batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultTurn {
    pub results: Vec<ToolResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "turn", rename_all = "snake_case")]
pub enum ConversationTurn {
    Planner(PlannerTurn),
    ToolResults(ToolResultTurn),
}

/// Violations of the append rules
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    #[error("{count} invocation(s) still pending")]
    PendingInvocations { count: usize },

    #[error("no invocations are pending")]
    NothingPending,

    #[error("expected {expected} result(s), got {actual}")]
    ResultCount { expected: usize, actual: usize },

    #[error("result {index} answers '{actual}' but '{expected}' was requested")]
    ResultMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("invocation id '{0}' is already used in this conversation")]
    DuplicateInvocationId(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Initial instruction text
    pub task: String,
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    /// Seed a conversation with the task text
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            turns: Vec::new(),
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// True if the id was used by any invocation already in the log
    pub fn has_invocation_id(&self, id: &str) -> bool {
        self.turns.iter().any(|t| match t {
            ConversationTurn::Planner(p) => p.invocations.iter().any(|i| i.invocation_id == id),
            ConversationTurn::ToolResults(_) => false,
        })
    }

    /// Invocations of the last planner turn still waiting for results
    pub fn pending_invocations(&self) -> &[ToolInvocation] {
        match self.turns.last() {
            Some(ConversationTurn::Planner(p)) => &p.invocations,
            _ => &[],
        }
    }

    pub fn planner_turns(&self) -> usize {
        self.turns
            .iter()
            .filter(|t| matches!(t, ConversationTurn::Planner(_)))
            .count()
    }

    /// Append a planner turn
    ///
    /// Fails if the previous planner turn still has unanswered invocations, or if
    /// an invocation id repeats one already in the conversation.
    pub fn push_planner(&mut self, turn: PlannerTurn) -> Result<(), ConversationError> {
        let pending = self.pending_invocations().len();
        if pending > 0 {
            return Err(ConversationError::PendingInvocations { count: pending });
        }

        let mut batch = HashSet::new();
        for inv in &turn.invocations {
            if self.has_invocation_id(&inv.invocation_id) || !batch.insert(inv.invocation_id.as_str()) {
                return Err(ConversationError::DuplicateInvocationId(inv.invocation_id.clone()));
            }
        }

        self.turns.push(ConversationTurn::Planner(turn));
        Ok(())
    }

    /// Append the complete result batch for the pending invocations
    ///
    /// All-or-nothing: the batch is checked first and appended as a single turn.
    pub fn push_results(&mut self, results: Vec<ToolResult>) -> Result<(), ConversationError> {
        let pending = self.pending_invocations();
        if pending.is_empty() {
            return Err(ConversationError::NothingPending);
        }
        if pending.len() != results.len() {
            return Err(ConversationError::ResultCount {
                expected: pending.len(),
                actual: results.len(),
            });
        }
        for (index, (inv, res)) in pending.iter().zip(&results).enumerate() {
            if inv.invocation_id != res.invocation_id {
                return Err(ConversationError::ResultMismatch {
                    index,
                    expected: inv.invocation_id.clone(),
                    actual: res.invocation_id.clone(),
                });
            }
        }

        self.turns.push(ConversationTurn::ToolResults(ToolResultTurn { results }));
        Ok(())
    }

    /// Final answer of the last planner turn, if any
    pub fn final_answer(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            ConversationTurn::Planner(p) => p.final_answer.as_deref(),
            _ => None,
        })
    }

    /// All results across the conversation, in append order
    pub fn results(&self) -> impl Iterator<Item = &ToolResult> {
        self.turns.iter().flat_map(|t| match t {
            ConversationTurn::ToolResults(r) => r.results.as_slice(),
            ConversationTurn::Planner(_) => &[][..],
        })
    }
}
