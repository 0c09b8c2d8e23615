//! Orchestration loop - drives planner/gateway round trips for one session.
//!
//! This module provides:
//! - LoopRunner, the bounded planner/dispatch state machine
//! - LoopRunnerConfig and DispatchMode
//! - SessionObserver for publishing progress

mod loop_runner;

pub use loop_runner::{
    DEFAULT_PLANNER_TIMEOUT, DispatchMode, LoopRunner, LoopRunnerConfig, NoopObserver, SessionObserver,
};
