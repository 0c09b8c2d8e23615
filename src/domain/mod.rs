//! Domain types for toolpilot
//!
//! - ToolInvocation / ToolResult: one request to a tool and its outcome
//! - Conversation: append-only log of planner and tool-result turns
//! - LoopSession: one bounded run of the orchestration loop and its status
//!
//! The orchestration loop is the only writer of a LoopSession; everything else
//! sees snapshots.

pub mod conversation;
pub mod invocation;
pub mod session;

pub use conversation::{Conversation, ConversationError, ConversationTurn, PlannerTurn, ToolResultTurn};
pub use invocation::{FailureKind, ToolInvocation, ToolOutcome, ToolResult};
pub use session::{FailureReason, LoopSession, SessionStatus};
