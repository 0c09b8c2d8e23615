//! LoopSession: one bounded run of the orchestration loop

use serde::{Deserialize, Serialize};

use super::conversation::Conversation;
use crate::id::{generate_session_id, now_ms};

/// Why a session failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The planner call failed or timed out
    PlannerError(String),
    /// Cancelled by the caller
    Cancelled,
    /// Conversation invariant could not be upheld
    Internal(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PlannerError(msg) => write!(f, "planner error: {}", msg),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    CompletedWithAnswer(String),
    StoppedAtBound,
    Failed(FailureReason),
}

impl SessionStatus {
    /// Terminal states are final: a session never leaves them
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::CompletedWithAnswer(_) => "completed",
            Self::StoppedAtBound => "exhausted",
            Self::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed ({})", reason),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSession {
    pub id: String,
    pub task: String,
    pub conversation: Conversation,

    /// Completed dispatch rounds, never above `max_iterations`
    pub iteration_count: u32,
    pub max_iterations: u32,
    pub status: SessionStatus,

    /// Planner calls made, including a failed final call
    pub planner_calls: u32,
    /// Invocations sent to the gateway
    pub dispatch_count: u32,

    pub created_at: u64,
    pub finished_at: Option<u64>,
}

impl LoopSession {
    pub fn new(task: impl Into<String>, max_iterations: u32) -> Self {
        let task = task.into();
        Self {
            id: generate_session_id(),
            conversation: Conversation::new(task.clone()),
            task,
            iteration_count: 0,
            max_iterations,
            status: SessionStatus::Running,
            planner_calls: 0,
            dispatch_count: 0,
            created_at: now_ms(),
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn bound_reached(&self) -> bool {
        self.iteration_count >= self.max_iterations
    }

    /// Move to a terminal status
    ///
    /// Returns false, leaving the session untouched, if it has already terminated
    /// or if `status` is `Running`.
    pub fn finish(&mut self, status: SessionStatus) -> bool {
        if self.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.finished_at = Some(now_ms());
        true
    }

    pub fn final_answer(&self) -> Option<&str> {
        match &self.status {
            SessionStatus::CompletedWithAnswer(answer) => Some(answer),
            _ => None,
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.finished_at.map(|f| f.saturating_sub(self.created_at))
    }
}
