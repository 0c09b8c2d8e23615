//! Session Manager implementation
//!
//! SessionManager is the caller-facing surface: it starts sessions on their own
//! tokio tasks and exposes their progress through watch channels. It never
//! mutates a session; only the runner task does.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::{LoopSession, SessionStatus};
use crate::gateway::ToolGateway;
use crate::planner::Planner;
use crate::runner::{LoopRunner, LoopRunnerConfig, SessionObserver};

/// Opaque reference to a started session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionHandle {
    id: String,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Publishes every runner update to a watch channel
struct WatchObserver(watch::Sender<LoopSession>);

impl SessionObserver for WatchObserver {
    fn on_update(&self, session: &LoopSession) {
        self.0.send_replace(session.clone());
    }
}

struct SessionEntry {
    updates: watch::Receiver<LoopSession>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Starts and tracks LoopSessions
pub struct SessionManager<P, G>
where
    P: Planner + ?Sized,
    G: ToolGateway + ?Sized,
{
    runner: Arc<LoopRunner<P, G>>,
    sessions: RwLock<HashMap<SessionHandle, SessionEntry>>,
}

impl<P, G> SessionManager<P, G>
where
    P: Planner + ?Sized + 'static,
    G: ToolGateway + ?Sized + 'static,
{
    pub fn new(planner: Arc<P>, gateway: Arc<G>, config: LoopRunnerConfig) -> Self {
        Self {
            runner: Arc::new(LoopRunner::with_config(planner, gateway, config)),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a session on its own task and return immediately
    pub async fn start_session(&self, task: impl Into<String>, max_iterations: u32) -> SessionHandle {
        let session = LoopSession::new(task, max_iterations);
        let handle = SessionHandle { id: session.id.clone() };

        let (tx, rx) = watch::channel(session.clone());
        let cancel = CancellationToken::new();

        let runner = Arc::clone(&self.runner);
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            runner.run(session, &token, &WatchObserver(tx)).await;
        });

        tracing::info!(session_id = %handle, max_iterations, "Session spawned");
        self.sessions.write().await.insert(
            handle.clone(),
            SessionEntry {
                updates: rx,
                cancel,
                task,
            },
        );
        handle
    }

    pub async fn get_status(&self, handle: &SessionHandle) -> Option<SessionStatus> {
        let sessions = self.sessions.read().await;
        sessions.get(handle).map(|e| e.updates.borrow().status.clone())
    }

    /// Latest published state, including the partial conversation
    pub async fn snapshot(&self, handle: &SessionHandle) -> Option<LoopSession> {
        let sessions = self.sessions.read().await;
        sessions.get(handle).map(|e| e.updates.borrow().clone())
    }

    /// Wait until the session reaches a terminal status
    pub async fn wait(&self, handle: &SessionHandle) -> Option<LoopSession> {
        let mut updates = {
            let sessions = self.sessions.read().await;
            sessions.get(handle)?.updates.clone()
        };

        let finished = updates
            .wait_for(|s| s.is_terminal())
            .await
            .map(|s| LoopSession::clone(&s));
        match finished {
            Ok(session) => Some(session),
            // Runner task is gone; report the last state it published
            Err(_) => Some(updates.borrow().clone()),
        }
    }

    /// Request cancellation
    ///
    /// Returns false if the handle is unknown or the session already finished.
    pub async fn cancel(&self, handle: &SessionHandle) -> bool {
        let sessions = self.sessions.read().await;
        let Some(entry) = sessions.get(handle) else {
            return false;
        };
        if entry.updates.borrow().is_terminal() {
            return false;
        }
        tracing::info!(session_id = %handle, "Cancelling session");
        entry.cancel.cancel();
        true
    }

    /// Cancel every running session
    pub async fn cancel_all(&self) -> usize {
        let sessions = self.sessions.read().await;
        let mut cancelled = 0;
        for entry in sessions.values() {
            if !entry.updates.borrow().is_terminal() {
                entry.cancel.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    /// All known sessions with their current status, ordered by id
    pub async fn list(&self) -> Vec<(SessionHandle, SessionStatus)> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<_> = sessions
            .iter()
            .map(|(h, e)| (h.clone(), e.updates.borrow().status.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Release a finished session and return its final state
    ///
    /// A session that is still running stays tracked and `None` is returned.
    pub async fn remove(&self, handle: &SessionHandle) -> Option<LoopSession> {
        let mut sessions = self.sessions.write().await;
        if !sessions.get(handle)?.updates.borrow().is_terminal() {
            return None;
        }
        let entry = sessions.remove(handle)?;
        let session = entry.updates.borrow().clone();
        tracing::debug!(session_id = %handle, status = %session.status, "Session released");
        Some(session)
    }

    /// Release every finished session
    pub async fn prune_finished(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, e| !e.updates.borrow().is_terminal());
        before - sessions.len()
    }

    pub async fn running_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.values().filter(|e| !e.task.is_finished()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureKind, FailureReason, ToolInvocation, ToolResult};
    use crate::planner::{PlannerOutput, ScriptedPlanner};
    use crate::tools::ToolDescriptor;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    struct SleepyGateway;

    #[async_trait]
    impl ToolGateway for SleepyGateway {
        async fn list_tools(&self) -> Vec<ToolDescriptor> {
            vec![ToolDescriptor::new("nap", "Sleep a while")]
        }

        async fn invoke(&self, invocation: ToolInvocation) -> ToolResult {
            if invocation.tool_name != "nap" {
                return ToolResult::failure(invocation.invocation_id, FailureKind::UnknownTool, "no such tool");
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
            ToolResult::success(invocation.invocation_id, json!("rested"))
        }
    }

    fn manager(planner: ScriptedPlanner) -> SessionManager<ScriptedPlanner, SleepyGateway> {
        SessionManager::new(Arc::new(planner), Arc::new(SleepyGateway), LoopRunnerConfig::default())
    }

    #[tokio::test]
    async fn test_start_and_wait() {
        let mgr = manager(ScriptedPlanner::new().then_invoke("nap", json!({})).then_answer("done"));
        let handle = mgr.start_session("take a nap", 5).await;

        let finished = mgr.wait(&handle).await.unwrap();
        assert_eq!(finished.status, SessionStatus::CompletedWithAnswer("done".into()));
        assert_eq!(finished.id, handle.id());
        assert_eq!(mgr.get_status(&handle).await, Some(finished.status.clone()));
        assert_eq!(mgr.snapshot(&handle).await.unwrap().iteration_count, 1);
    }

    #[tokio::test]
    async fn test_unknown_handle() {
        let mgr = manager(ScriptedPlanner::new());
        let handle = SessionHandle { id: "ses-nope".into() };
        assert!(mgr.get_status(&handle).await.is_none());
        assert!(mgr.wait(&handle).await.is_none());
        assert!(!mgr.cancel(&handle).await);
    }

    #[tokio::test]
    async fn test_cancel_running_session() {
        let mgr = manager(ScriptedPlanner::new().otherwise(|_| {
            PlannerOutput::invocations("", vec![ToolInvocation::new("", "nap")])
        }));
        let handle = mgr.start_session("nap forever", 1000).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(mgr.cancel(&handle).await);
        let finished = mgr.wait(&handle).await.unwrap();
        assert_eq!(finished.status, SessionStatus::Failed(FailureReason::Cancelled));
        assert!(!mgr.cancel(&handle).await);
    }

    #[tokio::test]
    async fn test_independent_sessions() {
        let mgr = manager(ScriptedPlanner::new().otherwise(|req| {
            PlannerOutput::final_answer(format!("answer to {}", req.conversation.task))
        }));
        let a = mgr.start_session("a", 3).await;
        let b = mgr.start_session("b", 3).await;
        assert_ne!(a, b);

        assert_eq!(mgr.wait(&a).await.unwrap().final_answer(), Some("answer to a"));
        assert_eq!(mgr.wait(&b).await.unwrap().final_answer(), Some("answer to b"));

        let listed = mgr.list().await;
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|(_, s)| s.is_terminal()));
    }

    #[tokio::test]
    async fn test_waited_session_is_released() {
        let mgr = manager(ScriptedPlanner::new().then_answer("done"));
        let handle = mgr.start_session("quick", 3).await;
        mgr.wait(&handle).await.unwrap();

        let released = mgr.remove(&handle).await.unwrap();
        assert_eq!(released.final_answer(), Some("done"));
        assert!(mgr.get_status(&handle).await.is_none());
        assert!(mgr.list().await.is_empty());
        assert!(mgr.remove(&handle).await.is_none());
    }

    #[tokio::test]
    async fn test_running_session_is_not_released() {
        let mgr = manager(ScriptedPlanner::new().then_hang());
        let handle = mgr.start_session("stuck", 3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(mgr.remove(&handle).await.is_none());
        assert_eq!(mgr.prune_finished().await, 0);
        assert_eq!(mgr.get_status(&handle).await, Some(SessionStatus::Running));

        mgr.cancel(&handle).await;
        mgr.wait(&handle).await.unwrap();
        assert_eq!(mgr.prune_finished().await, 1);
        assert!(mgr.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let mgr = manager(ScriptedPlanner::new().then_hang());
        let handle = mgr.start_session("stuck", 3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(mgr.cancel_all().await, 1);
        let finished = mgr.wait(&handle).await.unwrap();
        assert_eq!(finished.status, SessionStatus::Failed(FailureReason::Cancelled));
        assert_eq!(finished.planner_calls, 1);
    }
}
