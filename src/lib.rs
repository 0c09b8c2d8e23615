//! Toolpilot - bounded planner-driven tool orchestration
//!
//! A planner (a language model) chooses tool invocations; an authenticated
//! tool gateway validates and executes them; the orchestration loop folds each
//! batch of results back into the conversation until the planner answers or the
//! iteration bound is hit.

pub mod domain;
pub mod error;
pub mod gateway;
pub mod id;
pub mod ipc;
pub mod manager;
pub mod planner;
pub mod runner;
pub mod tools;

pub use error::{Result, ToolpilotError};
