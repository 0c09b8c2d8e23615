//! Tool handler interface
//!
//! A handler receives arguments that have already passed schema validation and
//! returns a JSON payload or a domain error. Timeouts and panics are handled by
//! the gateway, not here.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Domain failure raised by a handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        Self::new(e.to_string())
    }
}

/// Executes one tool
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, arguments: Map<String, Value>) -> Result<Value, HandlerError>;
}

/// Adapts a synchronous closure into a handler
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Result<Value, HandlerError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(Map<String, Value>) -> Result<Value, HandlerError> + Send + Sync,
{
    async fn handle(&self, arguments: Map<String, Value>) -> Result<Value, HandlerError> {
        (self.f)(arguments)
    }
}

/// Fetch a string argument
pub fn str_arg<'a>(arguments: &'a Map<String, Value>, name: &str) -> Result<&'a str, HandlerError> {
    arguments
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerError::new(format!("Missing '{}' parameter", name)))
}

/// Fetch an optional non-negative integer argument
pub fn usize_arg(arguments: &Map<String, Value>, name: &str) -> Option<usize> {
    arguments.get(name).and_then(|v| v.as_u64()).map(|v| v as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fn_handler() {
        let handler = FnHandler::new(|args: Map<String, Value>| {
            let n = args.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(json!(n * 2))
        });
        let mut args = Map::new();
        args.insert("n".into(), json!(21));
        assert_eq!(handler.handle(args).await.unwrap(), json!(42));
    }

    #[tokio::test]
    async fn test_fn_handler_error() {
        let handler = FnHandler::new(|_| Err(HandlerError::new("no such job")));
        let err = handler.handle(Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "no such job");
    }

    #[test]
    fn test_str_arg() {
        let mut args = Map::new();
        args.insert("path".into(), json!("/tmp"));
        assert_eq!(str_arg(&args, "path").unwrap(), "/tmp");
        assert_eq!(
            str_arg(&args, "other").unwrap_err().message,
            "Missing 'other' parameter"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: HandlerError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.message, "gone");
    }
}
