//! Error types for toolpilot
//!
//! Centralized error handling using thiserror. These errors cover construction,
//! configuration, and transport problems. Tool failures and planner failures are
//! not errors at this level: they are carried as data (`ToolOutcome::Failure`,
//! `SessionStatus::Failed`) so the orchestration loop never has to unwind.

use thiserror::Error;

/// All error types that can occur in toolpilot
#[derive(Debug, Error)]
pub enum ToolpilotError {
    /// Tool catalog could not be built or loaded
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Session credential missing or wrong
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Gateway construction or wiring error
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Planner construction error
    #[error("Planner error: {0}")]
    Planner(String),

    /// IPC communication error
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Invalid configuration value
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for toolpilot operations
pub type Result<T> = std::result::Result<T, ToolpilotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_error() {
        let err = ToolpilotError::Catalog("duplicate tool 'echo'".to_string());
        assert_eq!(err.to_string(), "Catalog error: duplicate tool 'echo'");
    }

    #[test]
    fn test_unauthenticated_error() {
        let err = ToolpilotError::Unauthenticated("bad credential".to_string());
        assert_eq!(err.to_string(), "Unauthenticated: bad credential");
    }

    #[test]
    fn test_ipc_error() {
        let err = ToolpilotError::Ipc("connection reset".to_string());
        assert_eq!(err.to_string(), "IPC error: connection reset");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ToolpilotError = io_err.into();
        assert!(matches!(err, ToolpilotError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: ToolpilotError = json_err.into();
        assert!(matches!(err, ToolpilotError::Json(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid { toml }").unwrap_err();
        let err: ToolpilotError = toml_err.into();
        assert!(matches!(err, ToolpilotError::Toml(_)));
    }
}
