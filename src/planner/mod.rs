//! Planner abstraction and implementations
//!
//! This module provides:
//! - The `Planner` trait and its request/output types
//! - An Anthropic Messages API planner
//! - Conversation rendering and response parsing for that API
//! - A scripted planner for tests and offline runs

pub mod anthropic;
mod client;
pub mod parser;
pub mod scripted;

pub use anthropic::{AnthropicConfig, AnthropicPlanner};
pub use client::{DEFAULT_SYSTEM_PROMPT, Planner, PlannerDecision, PlannerError, PlannerOutput, PlannerRequest};
pub use scripted::{ScriptStep, ScriptedPlanner};
