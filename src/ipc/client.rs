//! Gateway client over the Unix socket.
//!
//! Connects, authenticates, and caches the catalog once. Implements
//! `ToolGateway`, so the orchestration loop can drive a remote gateway exactly
//! like an in-process session. Transport failures during `invoke` become
//! `Failure(InternalError)` results rather than errors.
//!
//! An invocation waits for the tool's own timeout plus a margin, so the
//! gateway's `Timeout` result always arrives before the client gives up.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::UnixStream;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use crate::domain::{FailureKind, ToolInvocation, ToolResult};
use crate::error::{Result, ToolpilotError};
use crate::gateway::{DEFAULT_TOOL_TIMEOUT, ToolGateway};
use crate::ipc::codec::{Frame, NdJsonCodec};
use crate::ipc::messages::{
    AuthenticateResult, ErrorCode, GatewayRequest, GatewayResponse, InvokeParams, Methods, ToolsListResult,
};
use crate::ipc::server::default_socket_path;
use crate::tools::ToolDescriptor;

/// Configuration for the gateway client.
#[derive(Debug, Clone)]
pub struct GatewayClientConfig {
    /// Path to the gateway Unix socket.
    pub socket_path: PathBuf,
    /// Request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// Extra wait on top of a tool's own timeout.
    pub invoke_margin_ms: u64,
}

impl Default for GatewayClientConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            request_timeout_ms: 30000,
            invoke_margin_ms: 5000,
        }
    }
}

impl GatewayClientConfig {
    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    pub fn with_invoke_margin_ms(mut self, margin_ms: u64) -> Self {
        self.invoke_margin_ms = margin_ms;
        self
    }
}

type Writer = SplitSink<Framed<UnixStream, NdJsonCodec<GatewayResponse>>, GatewayRequest>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<GatewayResponse>>>>;

/// Authenticated connection to a gateway server.
pub struct GatewayClient {
    config: GatewayClientConfig,
    writer: Mutex<Writer>,
    pending: Pending,
    next_id: AtomicU64,
    connected: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    session_id: String,
    tools: Vec<ToolDescriptor>,
    tool_default_timeout: Duration,
}

impl GatewayClient {
    /// Connect, authenticate with `secret`, and fetch the catalog.
    pub async fn connect(config: GatewayClientConfig, secret: &str) -> Result<Self> {
        let stream = UnixStream::connect(&config.socket_path).await.map_err(|e| {
            ToolpilotError::Ipc(format!("Failed to connect to {}: {}", config.socket_path.display(), e))
        })?;

        let framed = Framed::new(stream, NdJsonCodec::<GatewayResponse>::new());
        let (writer, mut frames) = framed.split::<GatewayRequest>();

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(true));

        let reader = {
            let pending = Arc::clone(&pending);
            let connected = Arc::clone(&connected);
            tokio::spawn(async move {
                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(Frame::Message(response)) => {
                            if let Some(tx) = pending.lock().await.remove(&response.id) {
                                let _ = tx.send(response);
                            } else {
                                tracing::debug!(id = response.id, "Response with no pending request");
                            }
                        }
                        Ok(Frame::Malformed(msg)) => tracing::warn!(error = %msg, "Malformed frame from gateway"),
                        Err(e) => {
                            tracing::warn!(error = %e, "Gateway connection read failed");
                            break;
                        }
                    }
                }
                connected.store(false, Ordering::SeqCst);
                // Dropping the senders fails every waiting request
                pending.lock().await.clear();
            })
        };

        let mut client = Self {
            config,
            writer: Mutex::new(writer),
            pending,
            next_id: AtomicU64::new(1),
            connected,
            reader,
            session_id: String::new(),
            tools: Vec::new(),
            tool_default_timeout: DEFAULT_TOOL_TIMEOUT,
        };

        let auth: AuthenticateResult =
            serde_json::from_value(client.request(Methods::AUTHENTICATE, json!({ "credential": secret })).await?)?;
        client.session_id = auth.session_id;
        if let Some(ms) = auth.default_timeout_ms {
            client.tool_default_timeout = Duration::from_millis(ms);
        }

        let listed: ToolsListResult = serde_json::from_value(client.request(Methods::TOOLS_LIST, json!({})).await?)?;
        client.tools = listed.tools;

        tracing::info!(
            gateway_session = %client.session_id,
            tools = client.tools.len(),
            "Connected to gateway"
        );
        Ok(client)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// How long `invoke` waits for `tool_name`
    ///
    /// Never shorter than the request timeout. Unknown tools fail fast on the
    /// gateway, so they get the plain request timeout.
    pub fn invoke_timeout(&self, tool_name: &str) -> Duration {
        let request = Duration::from_millis(self.config.request_timeout_ms);
        match self.tools.iter().find(|t| t.name == tool_name) {
            Some(tool) => {
                let bound = tool.effective_timeout(self.tool_default_timeout)
                    + Duration::from_millis(self.config.invoke_margin_ms);
                bound.max(request)
            }
            None => request,
        }
    }

    /// Send a request and wait for its response, bounded by the request timeout.
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        self.request_within(method, params, timeout).await
    }

    async fn request_within(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        if !self.is_connected() {
            return Err(ToolpilotError::Ipc("Not connected".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let sent = self
            .writer
            .lock()
            .await
            .send(GatewayRequest::new(id, method, params))
            .await;
        if let Err(e) = sent {
            self.pending.lock().await.remove(&id);
            return Err(ToolpilotError::Ipc(format!("Failed to write: {}", e)));
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(ToolpilotError::Ipc("Connection closed".into())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(ToolpilotError::Ipc(format!(
                    "Request {} timed out after {}ms",
                    method,
                    timeout.as_millis()
                )));
            }
        };

        match (response.result, response.error) {
            (_, Some(err)) if err.code == ErrorCode::UNAUTHENTICATED => {
                Err(ToolpilotError::Unauthenticated(err.message))
            }
            (_, Some(err)) => Err(ToolpilotError::Ipc(err.to_string())),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        self.request(Methods::PING, json!({})).await.map(|_| ())
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[async_trait]
impl ToolGateway for GatewayClient {
    async fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools.clone()
    }

    async fn invoke(&self, invocation: ToolInvocation) -> ToolResult {
        let invocation_id = invocation.invocation_id.clone();
        let timeout = self.invoke_timeout(&invocation.tool_name);
        let params = match serde_json::to_value(InvokeParams { invocation }) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!(invocation_id = %invocation_id, error = %e, "Failed to encode invocation");
                return ToolResult::failure(invocation_id, FailureKind::InternalError, "gateway transport error");
            }
        };

        let outcome = self
            .request_within(Methods::TOOLS_INVOKE, params, timeout)
            .await
            .and_then(|v| serde_json::from_value::<ToolResult>(v).map_err(ToolpilotError::from));

        match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(invocation_id = %invocation_id, error = %e, "Gateway transport error");
                ToolResult::failure(invocation_id, FailureKind::InternalError, "gateway transport error")
            }
        }
    }
}
