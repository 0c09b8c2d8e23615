//! Tool descriptors
//!
//! A descriptor is what the gateway publishes for a tool: its name, a
//! description for the planner, and the input schema arguments must satisfy.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::schema::{InputSchema, ParamSpec, UnknownFieldPolicy};

/// Published description of one tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool name (e.g., "read_file", "run_command")
    pub name: String,
    /// Human-readable description for the planner
    pub description: String,
    #[serde(default)]
    pub input_schema: InputSchema,
    /// Per-tool execution bound, overriding the gateway default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ToolDescriptor {
    /// Create a tool with no parameters
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: InputSchema::default(),
            timeout_ms: None,
        }
    }

    pub fn with_schema(mut self, schema: InputSchema) -> Self {
        self.input_schema = schema;
        self
    }

    /// Add one parameter
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.input_schema.params.push(spec);
        self
    }

    pub fn with_unknown_fields(mut self, policy: UnknownFieldPolicy) -> Self {
        self.input_schema.unknown_fields = policy;
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Execution bound for this tool
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }

    /// Provider-facing tool definition (`name`, `description`, `input_schema`)
    pub fn to_planner_definition(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "input_schema": self.input_schema.to_json_schema(),
        })
    }
}
