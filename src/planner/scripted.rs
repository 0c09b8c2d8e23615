//! Deterministic planner driven by a fixed script
//!
//! Used by the unit and integration tests. Each `plan` call pops
//! the next step; once the script runs out, an optional fallback produces the
//! output, otherwise the call fails.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::client::{Planner, PlannerError, PlannerOutput, PlannerRequest};
use crate::domain::{Conversation, ToolInvocation};
use crate::id::generate_invocation_id;

/// One scripted reply
#[derive(Debug)]
pub enum ScriptStep {
    Output(PlannerOutput),
    Error(PlannerError),
    /// Never answer
    Hang,
}

type Fallback = Box<dyn Fn(&PlannerRequest<'_>) -> PlannerOutput + Send + Sync>;

#[derive(Default)]
pub struct ScriptedPlanner {
    steps: Mutex<VecDeque<ScriptStep>>,
    fallback: Option<Fallback>,
    delay: Option<Duration>,
    calls: AtomicU32,
    seen: Mutex<Vec<Conversation>>,
}

impl ScriptedPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, output: PlannerOutput) -> Self {
        self.step(ScriptStep::Output(output))
    }

    pub fn then_answer(self, text: impl Into<String>) -> Self {
        self.then(PlannerOutput::final_answer(text))
    }

    /// Request a single tool call
    pub fn then_invoke(self, tool: &str, arguments: Value) -> Self {
        self.then_invoke_all(vec![(tool, arguments)])
    }

    /// Request several tool calls in one turn
    pub fn then_invoke_all(self, calls: Vec<(&str, Value)>) -> Self {
        let invocations = calls
            .into_iter()
            .map(|(tool, args)| ToolInvocation::new("", tool).with_arguments(as_map(args)))
            .collect();
        self.then(PlannerOutput::invocations("", invocations))
    }

    pub fn then_error(self, error: PlannerError) -> Self {
        self.step(ScriptStep::Error(error))
    }

    pub fn then_hang(self) -> Self {
        self.step(ScriptStep::Hang)
    }

    fn step(self, step: ScriptStep) -> Self {
        self.steps.lock().unwrap_or_else(PoisonError::into_inner).push_back(step);
        self
    }

    /// Produce outputs from `f` once the script is exhausted
    pub fn otherwise<F>(mut self, f: F) -> Self
    where
        F: Fn(&PlannerRequest<'_>) -> PlannerOutput + Send + Sync + 'static,
    {
        self.fallback = Some(Box::new(f));
        self
    }

    /// Sleep before every reply
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of the conversation passed to each call, in call order
    pub fn seen_conversations(&self) -> Vec<Conversation> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl std::fmt::Debug for ScriptedPlanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedPlanner")
            .field("calls", &self.calls())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

fn as_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Give scripted invocations with blank ids a generated one
fn assign_ids(mut output: PlannerOutput, iteration: u32) -> PlannerOutput {
    if let super::client::PlannerDecision::Invocations(invocations) = &mut output.decision {
        for (index, inv) in invocations.iter_mut().enumerate() {
            if inv.invocation_id.is_empty() {
                inv.invocation_id = generate_invocation_id(iteration, index);
            }
        }
    }
    output
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, request: &PlannerRequest<'_>) -> Result<PlannerOutput, PlannerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.conversation.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self.steps.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let iteration = request.conversation.planner_turns() as u32;
        match step {
            Some(ScriptStep::Output(output)) => Ok(assign_ids(output, iteration)),
            Some(ScriptStep::Error(err)) => Err(err),
            Some(ScriptStep::Hang) => std::future::pending().await,
            None => match &self.fallback {
                Some(f) => Ok(assign_ids(f(request), iteration)),
                None => Err(PlannerError::InvalidResponse("planner script exhausted".to_string())),
            },
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
