//! Loop runner implementation - drives one LoopSession to a terminal state.
//!
//! Each round asks the planner for its next move given the full conversation
//! and catalog, dispatches any requested invocations through the gateway, and
//! folds the whole batch back as one result turn. The iteration bound, the
//! planner timeout and the per-tool timeouts guarantee termination.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::domain::{FailureKind, FailureReason, LoopSession, SessionStatus, ToolInvocation, ToolResult};
use crate::gateway::ToolGateway;
use crate::id::generate_invocation_id;
use crate::planner::{DEFAULT_SYSTEM_PROMPT, Planner, PlannerOutput, PlannerRequest};
use crate::tools::ToolDescriptor;

/// Default bound on a single planner call
pub const DEFAULT_PLANNER_TIMEOUT: Duration = Duration::from_secs(120);

/// How a dispatch batch is executed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    /// One invocation at a time, in request order
    #[default]
    Sequential,
    /// All invocations at once; results still come back in request order
    Concurrent,
}

impl DispatchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sequential" => Some(Self::Sequential),
            "concurrent" => Some(Self::Concurrent),
            _ => None,
        }
    }
}

/// Configuration for the LoopRunner.
#[derive(Debug, Clone)]
pub struct LoopRunnerConfig {
    /// Upper bound on one planner call
    pub planner_timeout: Duration,
    pub dispatch: DispatchMode,
    pub system_prompt: String,
}

impl Default for LoopRunnerConfig {
    fn default() -> Self {
        Self {
            planner_timeout: DEFAULT_PLANNER_TIMEOUT,
            dispatch: DispatchMode::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl LoopRunnerConfig {
    pub fn with_planner_timeout(mut self, timeout: Duration) -> Self {
        self.planner_timeout = timeout;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }
}

/// Receives a snapshot of the session after every state change.
pub trait SessionObserver: Send + Sync {
    fn on_update(&self, session: &LoopSession);
}

/// Observer that ignores every update.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_update(&self, _session: &LoopSession) {}
}

/// LoopRunner executes LoopSessions against one planner and one gateway.
///
/// The runner holds no per-session state, so one runner can drive many
/// sessions concurrently.
pub struct LoopRunner<P, G>
where
    P: Planner + ?Sized,
    G: ToolGateway + ?Sized,
{
    planner: Arc<P>,
    gateway: Arc<G>,
    config: LoopRunnerConfig,
}

impl<P, G> LoopRunner<P, G>
where
    P: Planner + ?Sized,
    G: ToolGateway + ?Sized,
{
    /// Create a new LoopRunner with the default configuration.
    pub fn new(planner: Arc<P>, gateway: Arc<G>) -> Self {
        Self::with_config(planner, gateway, LoopRunnerConfig::default())
    }

    /// Create a new LoopRunner with custom configuration.
    pub fn with_config(planner: Arc<P>, gateway: Arc<G>, config: LoopRunnerConfig) -> Self {
        Self {
            planner,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &LoopRunnerConfig {
        &self.config
    }

    /// Run a fresh session for `task` to completion, without cancellation.
    pub async fn run_task(&self, task: impl Into<String>, max_iterations: u32) -> LoopSession {
        let session = LoopSession::new(task, max_iterations);
        self.run(session, &CancellationToken::new(), &NoopObserver).await
    }

    /// Run the session until it reaches a terminal status.
    ///
    /// A session that is already terminal is returned unchanged.
    pub async fn run(
        &self,
        mut session: LoopSession,
        cancel: &CancellationToken,
        observer: &dyn SessionObserver,
    ) -> LoopSession {
        if session.is_terminal() {
            return session;
        }

        let tools = self.gateway.list_tools().await;
        tracing::info!(
            session_id = %session.id,
            tools = tools.len(),
            max_iterations = session.max_iterations,
            planner = self.planner.name(),
            "Session started"
        );
        observer.on_update(&session);

        let status = loop {
            if session.bound_reached() {
                break SessionStatus::StoppedAtBound;
            }
            if cancel.is_cancelled() {
                break SessionStatus::Failed(FailureReason::Cancelled);
            }

            // AwaitingPlanner
            session.planner_calls += 1;
            let output = match self.call_planner(&session, &tools, cancel).await {
                Ok(output) => output,
                Err(reason) => break SessionStatus::Failed(reason),
            };

            let mut turn = output.into_turn();
            let iteration = session.conversation.planner_turns() as u32;
            normalize_ids(&mut turn.invocations, &session, iteration);

            if let Some(answer) = turn.final_answer.clone() {
                if let Err(e) = session.conversation.push_planner(turn) {
                    break SessionStatus::Failed(FailureReason::Internal(e.to_string()));
                }
                break SessionStatus::CompletedWithAnswer(answer);
            }

            let invocations = turn.invocations.clone();
            if let Err(e) = session.conversation.push_planner(turn) {
                break SessionStatus::Failed(FailureReason::Internal(e.to_string()));
            }
            observer.on_update(&session);

            // DispatchingTools: results are buffered and appended in one step
            tracing::debug!(
                session_id = %session.id,
                iteration = session.iteration_count + 1,
                invocations = invocations.len(),
                "Dispatching batch"
            );
            let results = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                results = self.dispatch_batch(&session.id, &invocations) => Some(results),
            };
            let Some(results) = results else {
                break SessionStatus::Failed(FailureReason::Cancelled);
            };

            session.dispatch_count += invocations.len() as u32;
            let results = reconcile(&invocations, results);
            if let Err(e) = session.conversation.push_results(results) {
                break SessionStatus::Failed(FailureReason::Internal(e.to_string()));
            }
            session.iteration_count += 1;
            observer.on_update(&session);
        };

        session.finish(status);
        match &session.status {
            SessionStatus::Failed(reason) => tracing::warn!(
                session_id = %session.id,
                iterations = session.iteration_count,
                reason = %reason,
                "Session failed"
            ),
            status => tracing::info!(
                session_id = %session.id,
                iterations = session.iteration_count,
                planner_calls = session.planner_calls,
                status = status.label(),
                "Session finished"
            ),
        }
        observer.on_update(&session);
        session
    }

    async fn call_planner(
        &self,
        session: &LoopSession,
        tools: &[ToolDescriptor],
        cancel: &CancellationToken,
    ) -> Result<PlannerOutput, FailureReason> {
        let request = PlannerRequest {
            system_prompt: &self.config.system_prompt,
            conversation: &session.conversation,
            tools,
        };

        let planned = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(FailureReason::Cancelled),
            planned = tokio::time::timeout(self.config.planner_timeout, self.planner.plan(&request)) => planned,
        };

        match planned {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => {
                tracing::warn!(session_id = %session.id, error = %e, retryable = e.is_retryable(), "Planner call failed");
                Err(FailureReason::PlannerError(e.to_string()))
            }
            Err(_) => {
                let ms = self.config.planner_timeout.as_millis();
                tracing::warn!(session_id = %session.id, timeout_ms = ms as u64, "Planner call timed out");
                Err(FailureReason::PlannerError(format!("planner timed out after {}ms", ms)))
            }
        }
    }

    async fn dispatch_batch(&self, session_id: &str, invocations: &[ToolInvocation]) -> Vec<ToolResult> {
        let results = match self.config.dispatch {
            DispatchMode::Sequential => {
                let mut results = Vec::with_capacity(invocations.len());
                for inv in invocations {
                    results.push(self.gateway.invoke(inv.clone()).await);
                }
                results
            }
            DispatchMode::Concurrent => join_all(invocations.iter().cloned().map(|inv| self.gateway.invoke(inv))).await,
        };

        for (inv, result) in invocations.iter().zip(&results) {
            match result.failure_kind() {
                None => tracing::debug!(session_id, tool = %inv.tool_name, invocation_id = %inv.invocation_id, "Tool succeeded"),
                Some(kind) if kind.is_infrastructure() => tracing::warn!(
                    session_id,
                    tool = %inv.tool_name,
                    invocation_id = %inv.invocation_id,
                    kind = %kind,
                    "Tool infrastructure failure"
                ),
                Some(kind) => tracing::info!(
                    session_id,
                    tool = %inv.tool_name,
                    invocation_id = %inv.invocation_id,
                    kind = %kind,
                    "Tool failed"
                ),
            }
        }
        results
    }
}

/// Replace blank or repeated invocation ids with generated ones
fn normalize_ids(invocations: &mut [ToolInvocation], session: &LoopSession, iteration: u32) {
    let mut batch: HashSet<String> = HashSet::new();
    for (index, inv) in invocations.iter_mut().enumerate() {
        if inv.invocation_id.trim().is_empty()
            || session.conversation.has_invocation_id(&inv.invocation_id)
            || batch.contains(&inv.invocation_id)
        {
            let fresh = generate_invocation_id(iteration, index);
            tracing::debug!(session_id = %session.id, old = %inv.invocation_id, new = %fresh, "Replaced invocation id");
            inv.invocation_id = fresh;
        }
        batch.insert(inv.invocation_id.clone());
    }
}

/// Pair every invocation with exactly one result under its own id
fn reconcile(invocations: &[ToolInvocation], results: Vec<ToolResult>) -> Vec<ToolResult> {
    let mut results = results.into_iter();
    invocations
        .iter()
        .map(|inv| match results.next() {
            Some(result) if result.invocation_id == inv.invocation_id => result,
            Some(result) => {
                tracing::error!(
                    expected = %inv.invocation_id,
                    actual = %result.invocation_id,
                    "Gateway returned a result for the wrong invocation"
                );
                ToolResult::failure(
                    inv.invocation_id.clone(),
                    FailureKind::InternalError,
                    "gateway returned a mismatched result",
                )
            }
            None => ToolResult::failure(
                inv.invocation_id.clone(),
                FailureKind::InternalError,
                "gateway returned no result",
            ),
        })
        .collect()
}
