//! Tool catalog
//!
//! Name-ordered set of tool descriptors, buildable in code or loaded from TOML.
//! Ordering by name keeps `list` stable, so repeated listings are identical.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, ToolpilotError};

use super::definition::ToolDescriptor;
use super::schema::{InputSchema, ParamKind, ParamSpec, UnknownFieldPolicy};

/// TOML representation of a tool parameter
#[derive(Debug, Deserialize)]
struct TomlParam {
    #[serde(rename = "type")]
    param_type: String,
    #[serde(default)]
    required: bool,
    description: Option<String>,
}

/// TOML representation of a tool definition
#[derive(Debug, Deserialize)]
struct TomlTool {
    name: String,
    description: String,
    timeout_ms: Option<u64>,
    unknown_fields: Option<String>,
    #[serde(default)]
    params: BTreeMap<String, TomlParam>,
    /// Alternative to per-param `required = true`
    #[serde(default)]
    required: Vec<String>,
}

/// TOML file structure
#[derive(Debug, Deserialize)]
struct TomlCatalog {
    #[serde(rename = "tool", default)]
    tools: Vec<TomlTool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCatalog {
    tools: BTreeMap<String, ToolDescriptor>,
}

impl ToolCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from descriptors, rejecting duplicate names
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ToolDescriptor>) -> Result<Self> {
        let mut catalog = Self::new();
        for d in descriptors {
            catalog.add(d)?;
        }
        Ok(catalog)
    }

    /// Load catalog from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ToolpilotError::Catalog(format!("Failed to read catalog file {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Load catalog from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        let parsed: TomlCatalog = toml::from_str(content)?;

        let mut catalog = Self::new();
        for toml_tool in parsed.tools {
            catalog.add(Self::convert_toml_tool(toml_tool)?)?;
        }
        Ok(catalog)
    }

    fn convert_toml_tool(toml_tool: TomlTool) -> Result<ToolDescriptor> {
        let mut schema = InputSchema::new();

        if let Some(policy) = toml_tool.unknown_fields.as_deref() {
            schema.unknown_fields = UnknownFieldPolicy::parse(policy).ok_or_else(|| {
                ToolpilotError::Catalog(format!(
                    "Invalid unknown_fields '{}' for tool '{}'",
                    policy, toml_tool.name
                ))
            })?;
        }

        if let Some(missing) = toml_tool.required.iter().find(|r| !toml_tool.params.contains_key(r.as_str())) {
            return Err(ToolpilotError::Catalog(format!(
                "Tool '{}' requires undeclared parameter '{}'",
                toml_tool.name, missing
            )));
        }

        for (name, param) in toml_tool.params {
            let kind = ParamKind::parse(&param.param_type).ok_or_else(|| {
                ToolpilotError::Catalog(format!(
                    "Invalid type '{}' for parameter '{}' of tool '{}'",
                    param.param_type, name, toml_tool.name
                ))
            })?;
            let required = param.required || toml_tool.required.contains(&name);
            schema.params.push(ParamSpec {
                name,
                kind,
                required,
                description: param.description,
            });
        }

        let mut tool = ToolDescriptor::new(toml_tool.name, toml_tool.description).with_schema(schema);
        if let Some(timeout) = toml_tool.timeout_ms {
            tool = tool.with_timeout(timeout);
        }
        Ok(tool)
    }

    /// Add a tool; names must be unique
    pub fn add(&mut self, tool: ToolDescriptor) -> Result<()> {
        if tool.name.trim().is_empty() {
            return Err(ToolpilotError::Catalog("Tool name must not be empty".to_string()));
        }
        if self.tools.contains_key(&tool.name) {
            return Err(ToolpilotError::Catalog(format!("Duplicate tool '{}'", tool.name)));
        }
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Tool names, ordered
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Descriptors, ordered by name
    pub fn all(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    /// Owned copy of every descriptor, ordered by name
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
