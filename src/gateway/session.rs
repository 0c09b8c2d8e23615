//! Authenticated gateway sessions and the `ToolGateway` seam
//!
//! The orchestration loop talks to a `ToolGateway`. In-process that is a
//! `GatewaySession`; across the socket it is an `ipc::GatewayClient`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ToolInvocation, ToolResult};
use crate::tools::ToolDescriptor;

use super::dispatch::Gateway;

/// Request/response surface of an authenticated gateway session
#[async_trait]
pub trait ToolGateway: Send + Sync {
    /// Published catalog, ordered by name; identical on every call
    async fn list_tools(&self) -> Vec<ToolDescriptor>;

    /// Run one invocation; never fails as a Rust error
    async fn invoke(&self, invocation: ToolInvocation) -> ToolResult;
}

#[async_trait]
impl<T: ToolGateway + ?Sized> ToolGateway for Arc<T> {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        (**self).list_tools().await
    }

    async fn invoke(&self, invocation: ToolInvocation) -> ToolResult {
        (**self).invoke(invocation).await
    }
}

/// An authenticated, in-process session on a `Gateway`
///
/// Holds no per-invocation state; many loops may share one session.
#[derive(Debug, Clone)]
pub struct GatewaySession {
    id: String,
    gateway: Gateway,
}

impl GatewaySession {
    pub(crate) fn new(id: String, gateway: Gateway) -> Self {
        Self { id, gateway }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl ToolGateway for GatewaySession {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.gateway.descriptors()
    }

    async fn invoke(&self, invocation: ToolInvocation) -> ToolResult {
        self.gateway.dispatch(&self.id, invocation).await
    }
}
