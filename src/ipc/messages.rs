//! Gateway wire messages.
//!
//! Newline-delimited JSON over a Unix stream socket. Field names follow the
//! familiar id/method/params/result/error shape without claiming JSON-RPC 2.0.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::ToolInvocation;
use crate::tools::ToolDescriptor;

/// Request sent from a client to the gateway server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// Unique request ID for correlating responses.
    pub id: u64,
    /// Method name (see `Methods`).
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl GatewayRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    /// Create a request with no parameters.
    pub fn no_params(id: u64, method: impl Into<String>) -> Self {
        Self::new(id, method, Value::Object(Default::default()))
    }
}

/// Response sent from the gateway server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayError>,
}

impl GatewayResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, error: GatewayError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Transport-level error. Tool failures never use this; they travel as a `ToolResult`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl GatewayError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: impl Into<String>) -> Self {
        Self::new(ErrorCode::METHOD_NOT_FOUND, format!("Unknown method: {}", method.into()))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UNAUTHENTICATED, message)
    }

    pub fn server_busy(max_clients: usize) -> Self {
        let mut err = Self::new(ErrorCode::SERVER_BUSY, "Server at client capacity");
        err.data = Some(serde_json::json!({ "max_clients": max_clients }));
        err
    }
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Standard error codes.
pub struct ErrorCode;

impl ErrorCode {
    /// Invalid JSON.
    pub const PARSE_ERROR: i32 = -32700;
    /// Valid JSON, but not a request.
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Missing or wrong credential.
    pub const UNAUTHENTICATED: i32 = 1003;
    /// Connection refused at `max_clients`.
    pub const SERVER_BUSY: i32 = 1005;
}

/// Method names.
pub struct Methods;

impl Methods {
    pub const AUTHENTICATE: &'static str = "authenticate";
    pub const TOOLS_LIST: &'static str = "tools.list";
    pub const TOOLS_INVOKE: &'static str = "tools.invoke";
    pub const PING: &'static str = "ping";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateParams {
    pub credential: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateResult {
    pub session_id: String,
    /// Timeout the gateway applies to tools that declare none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    pub tools: Vec<ToolDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeParams {
    pub invocation: ToolInvocation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_params_default() {
        let req: GatewayRequest = serde_json::from_str(r#"{"id":1,"method":"ping"}"#).unwrap();
        assert_eq!(req.method, Methods::PING);
        assert!(req.params.is_null());
    }

    #[test]
    fn test_no_params_request() {
        let req = GatewayRequest::no_params(7, Methods::TOOLS_LIST);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v, json!({"id": 7, "method": "tools.list", "params": {}}));
    }

    #[test]
    fn test_success_response_omits_error() {
        let resp = GatewayResponse::success(1, json!({"pong": true}));
        let s = serde_json::to_string(&resp).unwrap();
        assert!(!s.contains("error"));
        assert!(resp.is_success());
    }

    #[test]
    fn test_error_response() {
        let resp = GatewayResponse::error(2, GatewayError::method_not_found("tools.delete"));
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["error"]["code"], -32601);
        assert_eq!(v["error"]["message"], "Unknown method: tools.delete");
        assert!(v.get("result").is_none());
        assert!(!resp.is_success());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(GatewayError::parse_error("x").code, -32700);
        assert_eq!(GatewayError::invalid_params("x").code, -32602);
        assert_eq!(GatewayError::unauthenticated("x").code, 1003);
        assert_eq!(GatewayError::server_busy(4).data, Some(json!({"max_clients": 4})));
    }

    #[test]
    fn test_invoke_params_shape() {
        let params: InvokeParams = serde_json::from_value(json!({
            "invocation": {"invocation_id": "a", "tool_name": "echo", "arguments": {"text": "hi"}}
        }))
        .unwrap();
        assert_eq!(params.invocation.tool_name, "echo");
    }
}
