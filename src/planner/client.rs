//! Planner interface
//!
//! A planner sees the whole conversation plus the catalog and answers with
//! either a final answer or a batch of tool invocations. Each call is
//! independent; the conversation carries all state.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{Conversation, PlannerTurn, ToolInvocation};
use crate::tools::ToolDescriptor;

/// Default instructions for the planning model
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous operations agent.

You accomplish the user's task by calling the tools you are given, observing
their results, and deciding what to do next. When the task is done, reply
with a final answer and no tool calls.

When using tools:
- Only call tools from the advertised catalog, with arguments that match their schemas
- Tool failures are reported back to you; read them and adjust rather than repeating the same call
- Prefer the smallest number of calls that completes the task

Always:
- Be concise and informative in responses
- Alert the user to any errors or issues
- Suggest next steps after operations";

/// Everything needed for one planner call
#[derive(Debug, Clone, Copy)]
pub struct PlannerRequest<'a> {
    pub system_prompt: &'a str,
    pub conversation: &'a Conversation,
    pub tools: &'a [ToolDescriptor],
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannerDecision {
    FinalAnswer(String),
    /// An empty batch is read as a final answer of the raw text
    Invocations(Vec<ToolInvocation>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannerOutput {
    /// Raw model text, kept for audit
    pub raw: String,
    pub decision: PlannerDecision,
}

impl PlannerOutput {
    pub fn final_answer(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            raw: text.clone(),
            decision: PlannerDecision::FinalAnswer(text),
        }
    }

    /// A reply with invocations; an empty list becomes a final answer of `raw`
    pub fn invocations(raw: impl Into<String>, invocations: Vec<ToolInvocation>) -> Self {
        let raw = raw.into();
        let decision = if invocations.is_empty() {
            PlannerDecision::FinalAnswer(raw.clone())
        } else {
            PlannerDecision::Invocations(invocations)
        };
        Self { raw, decision }
    }

    /// Conversation turn recording this output
    pub fn into_turn(self) -> PlannerTurn {
        match self.decision {
            PlannerDecision::FinalAnswer(answer) => PlannerTurn {
                raw: self.raw,
                invocations: Vec::new(),
                final_answer: Some(answer),
            },
            PlannerDecision::Invocations(invocations) if invocations.is_empty() => PlannerTurn {
                final_answer: Some(self.raw.clone()),
                raw: self.raw,
                invocations,
            },
            PlannerDecision::Invocations(invocations) => PlannerTurn {
                raw: self.raw,
                invocations,
                final_answer: None,
            },
        }
    }
}

/// Errors that can occur during a planner call
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Missing API key: environment variable {env_var} not set")]
    MissingApiKey { env_var: String },
}

impl PlannerError {
    /// Whether a caller retrying the whole session might succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Network(_) => true,
            Self::InvalidResponse(_) | Self::MissingApiKey { .. } => false,
        }
    }
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, request: &PlannerRequest<'_>) -> Result<PlannerOutput, PlannerError>;

    /// Name for logs
    fn name(&self) -> &str {
        "planner"
    }
}
