//! Gateway construction and invocation dispatch
//!
//! `Gateway` binds an immutable catalog to its handlers. Dispatch looks the
//! tool up, validates arguments, runs the handler under a timeout, and maps
//! every outcome (including panics) to a `ToolResult`. Nothing here retries.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;

use crate::domain::{FailureKind, ToolInvocation, ToolResult};
use crate::error::{Result, ToolpilotError};
use crate::id::generate_gateway_session_id;
use crate::tools::schema::describe_violations;
use crate::tools::{ToolCatalog, ToolDescriptor, ToolHandler};

use super::auth::Credential;
use super::session::GatewaySession;

/// Default bound on one handler execution
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for a `Gateway`
pub struct GatewayBuilder {
    catalog: ToolCatalog,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    credential: Option<Credential>,
    default_timeout: Duration,
    errors: Vec<String>,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            catalog: ToolCatalog::new(),
            handlers: HashMap::new(),
            credential: None,
            default_timeout: DEFAULT_TOOL_TIMEOUT,
            errors: Vec::new(),
        }
    }

    /// Register a tool with its handler
    pub fn tool(mut self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> Self {
        let name = descriptor.name.clone();
        if let Err(e) = self.catalog.add(descriptor) {
            self.errors.push(e.to_string());
        } else {
            self.handlers.insert(name, handler);
        }
        self
    }

    /// Register every descriptor of a catalog; bind handlers with `handler`
    pub fn catalog(mut self, catalog: ToolCatalog) -> Self {
        for descriptor in catalog.descriptors() {
            if let Err(e) = self.catalog.add(descriptor) {
                self.errors.push(e.to_string());
            }
        }
        self
    }

    /// Bind a handler to a tool registered through `catalog`
    pub fn handler(mut self, name: impl Into<String>, handler: Arc<dyn ToolHandler>) -> Self {
        let name = name.into();
        if self.handlers.insert(name.clone(), handler).is_some() {
            self.errors.push(format!("Handler for '{}' bound twice", name));
        }
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Every descriptor must have a handler and every handler a descriptor
    pub fn build(self) -> Result<Gateway> {
        let mut errors = self.errors;

        for name in self.catalog.names() {
            if !self.handlers.contains_key(name) {
                errors.push(format!("Tool '{}' has no handler", name));
            }
        }
        let mut orphans: Vec<&String> = self
            .handlers
            .keys()
            .filter(|name| !self.catalog.contains(name))
            .collect();
        orphans.sort();
        for name in orphans {
            errors.push(format!("Handler '{}' has no tool descriptor", name));
        }
        if self.default_timeout.is_zero() {
            errors.push("Default timeout must be greater than zero".to_string());
        }

        let credential = match self.credential {
            Some(c) => c,
            None => {
                errors.push("A credential is required".to_string());
                Credential::from_secret("")
            }
        };

        if !errors.is_empty() {
            return Err(ToolpilotError::Gateway(errors.join("; ")));
        }

        tracing::info!(
            tools = self.catalog.len(),
            credential = %credential.fingerprint(),
            "Gateway built"
        );

        Ok(Gateway {
            inner: Arc::new(GatewayInner {
                catalog: self.catalog,
                handlers: self.handlers,
                credential,
                default_timeout: self.default_timeout,
            }),
        })
    }
}

struct GatewayInner {
    catalog: ToolCatalog,
    handlers: HashMap<String, Arc<dyn ToolHandler>>,
    credential: Credential,
    default_timeout: Duration,
}

/// Catalog plus handlers; cheap to clone and safe to share between sessions
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("tools", &self.inner.catalog.names())
            .field("default_timeout", &self.inner.default_timeout)
            .finish()
    }
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Authenticate and open a session; nothing is published before this succeeds
    pub fn open_session(&self, presented: &Credential) -> Result<GatewaySession> {
        if !self.inner.credential.matches(presented) {
            tracing::warn!(presented = %presented.fingerprint(), "Gateway session rejected");
            return Err(ToolpilotError::Unauthenticated("invalid credential".to_string()));
        }
        let id = generate_gateway_session_id();
        tracing::info!(gateway_session = %id, "Gateway session opened");
        Ok(GatewaySession::new(id, self.clone()))
    }

    pub(crate) fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.inner.catalog.descriptors()
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Validate and run one invocation
    pub(crate) async fn dispatch(&self, session_id: &str, invocation: ToolInvocation) -> ToolResult {
        let ToolInvocation {
            invocation_id,
            tool_name,
            mut arguments,
        } = invocation;

        tracing::debug!(
            gateway_session = %session_id,
            tool = %tool_name,
            invocation_id = %invocation_id,
            "Dispatching invocation"
        );

        let Some(descriptor) = self.inner.catalog.get(&tool_name) else {
            tracing::warn!(tool = %tool_name, invocation_id = %invocation_id, "Unknown tool");
            return ToolResult::failure(invocation_id, FailureKind::UnknownTool, format!("unknown tool '{}'", tool_name));
        };

        if let Err(violations) = descriptor.input_schema.validate(&arguments) {
            let details = describe_violations(&violations);
            tracing::warn!(tool = %tool_name, invocation_id = %invocation_id, %details, "Invalid arguments");
            return ToolResult::failure(invocation_id, FailureKind::InvalidArguments, details);
        }
        descriptor.input_schema.normalize(&mut arguments);

        let Some(handler) = self.inner.handlers.get(&tool_name).cloned() else {
            tracing::error!(tool = %tool_name, "No handler bound");
            return ToolResult::failure(
                invocation_id,
                FailureKind::InternalError,
                format!("internal error in tool '{}'", tool_name),
            );
        };

        let timeout = descriptor.effective_timeout(self.inner.default_timeout);
        let started = Instant::now();
        let run = AssertUnwindSafe(handler.handle(arguments)).catch_unwind();

        match tokio::time::timeout(timeout, run).await {
            Ok(Ok(Ok(payload))) => {
                tracing::info!(
                    tool = %tool_name,
                    invocation_id = %invocation_id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Invocation succeeded"
                );
                ToolResult::success(invocation_id, payload)
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(tool = %tool_name, invocation_id = %invocation_id, error = %e, "Handler error");
                ToolResult::failure(invocation_id, FailureKind::HandlerError, e.message)
            }
            Ok(Err(panic)) => {
                tracing::error!(
                    tool = %tool_name,
                    invocation_id = %invocation_id,
                    panic = %panic_message(&*panic),
                    "Handler panicked"
                );
                ToolResult::failure(
                    invocation_id,
                    FailureKind::InternalError,
                    format!("internal error in tool '{}'", tool_name),
                )
            }
            Err(_) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                tracing::error!(tool = %tool_name, invocation_id = %invocation_id, elapsed_ms, "Invocation timed out");
                ToolResult::timeout(invocation_id, &tool_name, elapsed_ms)
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
