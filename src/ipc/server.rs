//! Gateway server - Unix socket front end for a `Gateway`
//!
//! Provides:
//! - Unix stream socket listener with a client cap
//! - Per-connection authentication (first request must be `authenticate`)
//! - Concurrent `tools.invoke` handling with responses written as they finish
//! - Graceful shutdown via `CancellationToken`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, ToolpilotError};
use crate::gateway::{Credential, Gateway, GatewaySession, ToolGateway};
use crate::ipc::codec::{Frame, NdJsonCodec};
use crate::ipc::messages::{
    AuthenticateParams, AuthenticateResult, GatewayError, GatewayRequest, GatewayResponse, InvokeParams, Methods,
    ToolsListResult,
};

/// Default socket location under the runtime or temp directory
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("toolpilot")
        .join("gateway.sock")
}

#[derive(Debug, Clone)]
pub struct GatewayServerConfig {
    pub socket_path: PathBuf,
    /// Maximum number of concurrent connections
    pub max_clients: usize,
}

impl Default for GatewayServerConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
            max_clients: 16,
        }
    }
}

impl GatewayServerConfig {
    pub fn with_socket_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.socket_path = path.as_ref().to_path_buf();
        self
    }

    pub fn with_max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }
}

/// Decrements the live connection count when a connection ends
struct ConnectionGuard(Arc<AtomicUsize>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct GatewayServer {
    config: GatewayServerConfig,
    gateway: Gateway,
    connections: Arc<AtomicUsize>,
}

impl GatewayServer {
    pub fn new(gateway: Gateway, config: GatewayServerConfig) -> Self {
        Self {
            config,
            gateway,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Accept connections until `shutdown` is cancelled
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let path = &self.config.socket_path;
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(path)
            .map_err(|e| ToolpilotError::Ipc(format!("Failed to bind socket {}: {}", path.display(), e)))?;
        tracing::info!(socket = %path.display(), max_clients = self.config.max_clients, "Gateway server listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => self.admit(stream, &shutdown),
                        Err(e) => tracing::warn!(error = %e, "Accept error"),
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }

        let _ = std::fs::remove_file(path);
        tracing::info!(socket = %path.display(), "Gateway server stopped");
        Ok(())
    }

    fn admit(&self, stream: UnixStream, shutdown: &CancellationToken) {
        let max = self.config.max_clients;
        if self.connections.fetch_add(1, Ordering::SeqCst) >= max {
            self.connections.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(max_clients = max, "Connection refused: at capacity");
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, NdJsonCodec::<GatewayRequest>::new());
                let _ = framed.send(GatewayResponse::error(0, GatewayError::server_busy(max))).await;
            });
            return;
        }

        let guard = ConnectionGuard(Arc::clone(&self.connections));
        let gateway = self.gateway.clone();
        let shutdown = shutdown.child_token();
        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = handle_connection(stream, gateway, shutdown).await {
                tracing::debug!(error = %e, "Connection ended with error");
            }
        });
    }
}

/// What the connection loop does after routing one request
enum Reply {
    Send(GatewayResponse),
    SendAndClose(GatewayResponse),
    /// Response will arrive on the connection's channel
    Deferred,
}

async fn handle_connection(stream: UnixStream, gateway: Gateway, shutdown: CancellationToken) -> Result<()> {
    let framed = Framed::new(stream, NdJsonCodec::<GatewayRequest>::new());
    let (mut sink, mut frames) = framed.split::<GatewayResponse>();
    let (tx, mut rx) = mpsc::channel::<GatewayResponse>(64);
    let mut session: Option<GatewaySession> = None;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            Some(response) = rx.recv() => {
                sink.send(response).await?;
            }
            frame = frames.next() => {
                let reply = match frame {
                    None => break,
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Connection read failed");
                        break;
                    }
                    Some(Ok(Frame::Malformed(msg))) => {
                        let response = GatewayResponse::error(0, GatewayError::parse_error(msg));
                        if session.is_some() { Reply::Send(response) } else { Reply::SendAndClose(response) }
                    }
                    Some(Ok(Frame::Message(request))) => route(&gateway, &mut session, request, &tx),
                };

                match reply {
                    Reply::Send(response) => sink.send(response).await?,
                    Reply::SendAndClose(response) => {
                        sink.send(response).await?;
                        break;
                    }
                    Reply::Deferred => {}
                }
            }
        }
    }

    if let Some(s) = &session {
        tracing::info!(gateway_session = %s.id(), "Gateway session closed");
    }
    Ok(())
}

fn parse_params<T: DeserializeOwned>(params: Value) -> std::result::Result<T, GatewayError> {
    serde_json::from_value(params).map_err(|e| GatewayError::invalid_params(e.to_string()))
}

/// Handle the first request on a connection
fn authenticate(gateway: &Gateway, session: &mut Option<GatewaySession>, request: GatewayRequest) -> Reply {
    let id = request.id;
    if request.method != Methods::AUTHENTICATE {
        return Reply::SendAndClose(GatewayResponse::error(
            id,
            GatewayError::unauthenticated("authenticate must be the first request"),
        ));
    }
    let params: AuthenticateParams = match parse_params(request.params) {
        Ok(p) => p,
        Err(e) => return Reply::SendAndClose(GatewayResponse::error(id, e)),
    };
    match gateway.open_session(&Credential::from_secret(&params.credential)) {
        Ok(opened) => {
            let result = AuthenticateResult {
                session_id: opened.id().to_string(),
                default_timeout_ms: Some(gateway.default_timeout().as_millis() as u64),
            };
            *session = Some(opened);
            Reply::Send(GatewayResponse::success(id, json!(result)))
        }
        Err(e) => Reply::SendAndClose(GatewayResponse::error(id, GatewayError::unauthenticated(e.to_string()))),
    }
}

fn route(
    gateway: &Gateway,
    session: &mut Option<GatewaySession>,
    request: GatewayRequest,
    tx: &mpsc::Sender<GatewayResponse>,
) -> Reply {
    let id = request.id;

    let Some(active) = session.clone() else {
        return authenticate(gateway, session, request);
    };

    match request.method.as_str() {
        Methods::AUTHENTICATE => Reply::Send(GatewayResponse::error(
            id,
            GatewayError::invalid_request("session is already authenticated"),
        )),
        Methods::PING => Reply::Send(GatewayResponse::success(id, json!({ "pong": true }))),
        Methods::TOOLS_LIST => {
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = ToolsListResult {
                    tools: active.list_tools().await,
                };
                let _ = tx.send(GatewayResponse::success(id, json!(result))).await;
            });
            Reply::Deferred
        }
        Methods::TOOLS_INVOKE => {
            let params: InvokeParams = match parse_params(request.params) {
                Ok(p) => p,
                Err(e) => return Reply::Send(GatewayResponse::error(id, e)),
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let result = active.invoke(params.invocation).await;
                let response = match serde_json::to_value(&result) {
                    Ok(value) => GatewayResponse::success(id, value),
                    Err(e) => GatewayResponse::error(id, GatewayError::internal_error(e.to_string())),
                };
                let _ = tx.send(response).await;
            });
            Reply::Deferred
        }
        other => Reply::Send(GatewayResponse::error(id, GatewayError::method_not_found(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::messages::ErrorCode;
    use crate::tools::builtin::Echo;
    use std::time::Duration;
    use tempfile::TempDir;

    fn gateway() -> Gateway {
        Gateway::builder()
            .tool(Echo::descriptor(), Arc::new(Echo))
            .credential(Credential::from_secret("secret"))
            .build()
            .unwrap()
    }

    async fn start(dir: &TempDir, max_clients: usize) -> (PathBuf, CancellationToken, tokio::task::JoinHandle<Result<()>>) {
        let path = dir.path().join("gw.sock");
        let server = GatewayServer::new(
            gateway(),
            GatewayServerConfig::default()
                .with_socket_path(&path)
                .with_max_clients(max_clients),
        );
        let token = CancellationToken::new();
        let run_token = token.clone();
        let handle = tokio::spawn(async move { server.run(run_token).await });
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        (path, token, handle)
    }

    async fn raw_client(path: &Path) -> Framed<UnixStream, NdJsonCodec<GatewayResponse>> {
        Framed::new(UnixStream::connect(path).await.unwrap(), NdJsonCodec::new())
    }

    async fn next_response(framed: &mut Framed<UnixStream, NdJsonCodec<GatewayResponse>>) -> Option<GatewayResponse> {
        match framed.next().await {
            Some(Ok(Frame::Message(r))) => Some(r),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_first_request_must_authenticate() {
        let dir = TempDir::new().unwrap();
        let (path, token, handle) = start(&dir, 4).await;

        let mut c = raw_client(&path).await;
        c.send(GatewayRequest::no_params(1, Methods::TOOLS_LIST)).await.unwrap();
        let resp = next_response(&mut c).await.unwrap();
        assert_eq!(resp.error.unwrap().code, ErrorCode::UNAUTHENTICATED);
        assert!(next_response(&mut c).await.is_none());

        token.cancel();
        handle.await.unwrap().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_wrong_credential_closes() {
        let dir = TempDir::new().unwrap();
        let (path, token, _handle) = start(&dir, 4).await;

        let mut c = raw_client(&path).await;
        c.send(GatewayRequest::new(1, Methods::AUTHENTICATE, json!({"credential": "nope"})))
            .await
            .unwrap();
        let resp = next_response(&mut c).await.unwrap();
        assert_eq!(resp.error.unwrap().code, ErrorCode::UNAUTHENTICATED);
        assert!(next_response(&mut c).await.is_none());
        token.cancel();
    }

    #[tokio::test]
    async fn test_authenticated_session() {
        let dir = TempDir::new().unwrap();
        let (path, token, _handle) = start(&dir, 4).await;

        let mut c = raw_client(&path).await;
        c.send(GatewayRequest::new(1, Methods::AUTHENTICATE, json!({"credential": "secret"})))
            .await
            .unwrap();
        let resp = next_response(&mut c).await.unwrap();
        let result = resp.result.unwrap();
        assert!(result["session_id"].as_str().unwrap().starts_with("gws-"));
        assert_eq!(result["default_timeout_ms"], 30000);

        c.send(GatewayRequest::no_params(2, Methods::PING)).await.unwrap();
        assert_eq!(next_response(&mut c).await.unwrap().result.unwrap()["pong"], true);

        c.send(GatewayRequest::no_params(3, "tools.delete")).await.unwrap();
        assert_eq!(
            next_response(&mut c).await.unwrap().error.unwrap().code,
            ErrorCode::METHOD_NOT_FOUND
        );

        c.send(GatewayRequest::new(4, Methods::TOOLS_INVOKE, json!({"wrong": 1})))
            .await
            .unwrap();
        assert_eq!(
            next_response(&mut c).await.unwrap().error.unwrap().code,
            ErrorCode::INVALID_PARAMS
        );

        c.send(GatewayRequest::new(
            5,
            Methods::TOOLS_INVOKE,
            json!({"invocation": {"invocation_id": "i1", "tool_name": "missing"}}),
        ))
        .await
        .unwrap();
        let resp = next_response(&mut c).await.unwrap();
        assert_eq!(resp.id, 5);
        assert_eq!(resp.result.unwrap()["outcome"]["kind"], "unknown_tool");

        token.cancel();
    }

    #[tokio::test]
    async fn test_malformed_after_auth_keeps_connection() {
        use tokio::io::AsyncWriteExt;

        let dir = TempDir::new().unwrap();
        let (path, token, _handle) = start(&dir, 4).await;

        let mut c = raw_client(&path).await;
        c.send(GatewayRequest::new(1, Methods::AUTHENTICATE, json!({"credential": "secret"})))
            .await
            .unwrap();
        next_response(&mut c).await.unwrap();

        c.get_mut().write_all(b"{broken\n").await.unwrap();
        let resp = next_response(&mut c).await.unwrap();
        assert_eq!(resp.error.unwrap().code, ErrorCode::PARSE_ERROR);

        c.send(GatewayRequest::no_params(2, Methods::PING)).await.unwrap();
        assert!(next_response(&mut c).await.unwrap().is_success());
        token.cancel();
    }

    #[tokio::test]
    async fn test_max_clients() {
        let dir = TempDir::new().unwrap();
        let (path, token, _handle) = start(&dir, 1).await;

        let mut first = raw_client(&path).await;
        first
            .send(GatewayRequest::new(1, Methods::AUTHENTICATE, json!({"credential": "secret"})))
            .await
            .unwrap();
        next_response(&mut first).await.unwrap();

        let mut second = raw_client(&path).await;
        let resp = next_response(&mut second).await.unwrap();
        assert_eq!(resp.error.unwrap().code, ErrorCode::SERVER_BUSY);
        token.cancel();
    }
}
