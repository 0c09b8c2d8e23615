//! Tool invocations and their results
//!
//! A `ToolInvocation` is produced by the planner output parser and consumed
//! exactly once by the gateway. A `ToolResult` is produced by a handler, or by
//! the gateway itself when it refuses to dispatch.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::id::now_ms;

/// One request to execute a specific tool with concrete arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Opaque token, unique within a conversation
    pub invocation_id: String,

    /// Name of the tool in the catalog
    pub tool_name: String,

    /// Parameter name -> value
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl ToolInvocation {
    pub fn new(invocation_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            tool_name: tool_name.into(),
            arguments: Map::new(),
        }
    }

    /// Add a single argument
    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Replace all arguments
    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }
}

/// Failure taxonomy exposed to gateway callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownTool,
    InvalidArguments,
    Unauthenticated,
    HandlerError,
    Timeout,
    InternalError,
}

impl FailureKind {
    /// Timeouts and internal errors may indicate systemic trouble
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Timeout | Self::InternalError)
    }

    /// Rejected by the gateway before any handler ran
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::UnknownTool | Self::InvalidArguments | Self::Unauthenticated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownTool => "unknown_tool",
            Self::InvalidArguments => "invalid_arguments",
            Self::Unauthenticated => "unauthenticated",
            Self::HandlerError => "handler_error",
            Self::Timeout => "timeout",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success {
        payload: Value,
    },
    Failure {
        kind: FailureKind,
        message: String,
        /// Set for timeouts
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elapsed_ms: Option<u64>,
    },
}

/// Result of one invocation, matched to it by `invocation_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub invocation_id: String,
    pub outcome: ToolOutcome,
    /// Milliseconds since Unix epoch
    pub timestamp: u64,
}

impl ToolResult {
    pub fn success(invocation_id: impl Into<String>, payload: Value) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            outcome: ToolOutcome::Success { payload },
            timestamp: now_ms(),
        }
    }

    pub fn failure(invocation_id: impl Into<String>, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            outcome: ToolOutcome::Failure {
                kind,
                message: message.into(),
                elapsed_ms: None,
            },
            timestamp: now_ms(),
        }
    }

    pub fn timeout(invocation_id: impl Into<String>, tool_name: &str, elapsed_ms: u64) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            outcome: ToolOutcome::Failure {
                kind: FailureKind::Timeout,
                message: format!("tool '{}' timed out after {}ms", tool_name, elapsed_ms),
                elapsed_ms: Some(elapsed_ms),
            },
            timestamp: now_ms(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    /// Failure kind, if this result is a failure
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Text form fed back to the planner
    pub fn content_text(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { payload } => match payload {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
            ToolOutcome::Failure { kind, message, .. } => format!("error ({}): {}", kind, message),
        }
    }
}
