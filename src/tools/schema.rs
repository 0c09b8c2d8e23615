//! Structural input schemas for tools
//!
//! Every tool declares a closed list of parameters, each with a kind from a
//! fixed set. Arguments are checked against that list before any handler runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Kind of value a parameter accepts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "items", rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    /// Any JSON number, integers included
    Number,
    Boolean,
    /// Homogeneous array of the element kind
    Array(Box<ParamKind>),
    Object,
    Any,
}

/// An `f64` with no fractional part that fits in an `i64`
fn integral_float(n: &serde_json::Number) -> Option<i64> {
    let f = n.as_f64().filter(|_| n.is_f64())?;
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

impl ParamKind {
    /// Parse a kind name such as `string`, `array` or `array<integer>`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        if let Some(inner) = s.strip_prefix("array<").and_then(|rest| rest.strip_suffix('>')) {
            return Self::parse(inner).map(|k| Self::Array(Box::new(k)));
        }
        match s.as_str() {
            "string" => Some(Self::String),
            "integer" | "int" => Some(Self::Integer),
            "number" | "float" => Some(Self::Number),
            "boolean" | "bool" => Some(Self::Boolean),
            "array" => Some(Self::Array(Box::new(Self::Any))),
            "object" => Some(Self::Object),
            "any" => Some(Self::Any),
            _ => None,
        }
    }

    /// Does `value` satisfy this kind (elements included)?
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::String, Value::String(_)) => true,
            (Self::Integer, Value::Number(n)) => n.is_i64() || n.is_u64() || integral_float(n).is_some(),
            (Self::Number, Value::Number(_)) => true,
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Object, Value::Object(_)) => true,
            (Self::Array(inner), Value::Array(items)) => items.iter().all(|v| inner.accepts(v)),
            _ => false,
        }
    }

    /// Rewrite integral floats such as `3.0` as integers where an integer is expected
    pub fn normalize(&self, value: &mut Value) {
        match self {
            Self::Integer => {
                let integral = match value {
                    Value::Number(n) => integral_float(n),
                    _ => None,
                };
                if let Some(i) = integral {
                    *value = Value::from(i);
                }
            }
            Self::Array(inner) => {
                if let Value::Array(items) = value {
                    items.iter_mut().for_each(|v| inner.normalize(v));
                }
            }
            _ => {}
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::String => "string".to_string(),
            Self::Integer => "integer".to_string(),
            Self::Number => "number".to_string(),
            Self::Boolean => "boolean".to_string(),
            Self::Array(inner) if **inner == Self::Any => "array".to_string(),
            Self::Array(inner) => format!("array<{}>", inner.name()),
            Self::Object => "object".to_string(),
            Self::Any => "any".to_string(),
        }
    }

    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::String => json!({"type": "string"}),
            Self::Integer => json!({"type": "integer"}),
            Self::Number => json!({"type": "number"}),
            Self::Boolean => json!({"type": "boolean"}),
            Self::Array(inner) => json!({"type": "array", "items": inner.to_json_schema()}),
            Self::Object => json!({"type": "object"}),
            Self::Any => json!({}),
        }
    }
}

/// JSON type name of a value, for error messages
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            description: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// What to do with arguments that no parameter declares
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownFieldPolicy {
    #[default]
    Reject,
    PassThrough,
}

impl UnknownFieldPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "reject" => Some(Self::Reject),
            "pass-through" | "pass_through" | "passthrough" => Some(Self::PassThrough),
            _ => None,
        }
    }
}

/// A single schema violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaViolation {
    NotAnObject { actual: &'static str },
    Missing { name: String },
    WrongType { name: String, expected: String, actual: &'static str },
    Unknown { name: String },
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject { actual } => write!(f, "arguments must be an object, got {}", actual),
            Self::Missing { name } => write!(f, "missing required argument '{}'", name),
            Self::WrongType { name, expected, actual } => {
                write!(f, "argument '{}' must be {}, got {}", name, expected, actual)
            }
            Self::Unknown { name } => write!(f, "unknown argument '{}'", name),
        }
    }
}

/// Join violations into one message
pub fn describe_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Declared parameters of one tool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSchema {
    /// In declaration order
    #[serde(default)]
    pub params: Vec<ParamSpec>,
    #[serde(default)]
    pub unknown_fields: UnknownFieldPolicy,
}

impl InputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    pub fn with_unknown_fields(mut self, policy: UnknownFieldPolicy) -> Self {
        self.unknown_fields = policy;
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Apply `ParamKind::normalize` to every declared argument
    pub fn normalize(&self, args: &mut Map<String, Value>) {
        for spec in &self.params {
            if let Some(value) = args.get_mut(&spec.name) {
                spec.kind.normalize(value);
            }
        }
    }

    /// Validate an argument map, collecting every violation
    pub fn validate(&self, args: &Map<String, Value>) -> Result<(), Vec<SchemaViolation>> {
        let mut violations = Vec::new();

        for spec in &self.params {
            match args.get(&spec.name) {
                None | Some(Value::Null) if spec.required => {
                    violations.push(SchemaViolation::Missing {
                        name: spec.name.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.kind.accepts(value) => {
                    violations.push(SchemaViolation::WrongType {
                        name: spec.name.clone(),
                        expected: spec.kind.name(),
                        actual: json_type_name(value),
                    });
                }
                Some(_) => {}
            }
        }

        if self.unknown_fields == UnknownFieldPolicy::Reject {
            for key in args.keys() {
                if self.get(key).is_none() {
                    violations.push(SchemaViolation::Unknown { name: key.clone() });
                }
            }
        }

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Validate any JSON value; non-objects are a single violation
    pub fn validate_value(&self, args: &Value) -> Result<(), Vec<SchemaViolation>> {
        match args {
            Value::Object(map) => self.validate(map),
            other => Err(vec![SchemaViolation::NotAnObject {
                actual: json_type_name(other),
            }]),
        }
    }

    /// Render as JSON Schema for the planner
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for spec in &self.params {
            let mut prop = spec.kind.to_json_schema();
            if let (Some(desc), Value::Object(obj)) = (&spec.description, &mut prop) {
                obj.insert("description".to_string(), Value::String(desc.clone()));
            }
            properties.insert(spec.name.clone(), prop);
            if spec.required {
                required.push(Value::String(spec.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": self.unknown_fields == UnknownFieldPolicy::PassThrough,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn read_schema() -> InputSchema {
        InputSchema::new()
            .param(ParamSpec::required("path", ParamKind::String).with_description("File to read"))
            .param(ParamSpec::optional("limit", ParamKind::Integer))
    }

    #[test]
    fn test_parse_kinds() {
        assert_eq!(ParamKind::parse("string"), Some(ParamKind::String));
        assert_eq!(ParamKind::parse(" Integer "), Some(ParamKind::Integer));
        assert_eq!(ParamKind::parse("array"), Some(ParamKind::Array(Box::new(ParamKind::Any))));
        assert_eq!(
            ParamKind::parse("array<string>"),
            Some(ParamKind::Array(Box::new(ParamKind::String)))
        );
        assert_eq!(ParamKind::parse("tuple"), None);
        assert_eq!(ParamKind::parse("array<tuple>"), None);
    }

    #[test]
    fn test_kind_name_roundtrips_through_parse() {
        for kind in [
            ParamKind::String,
            ParamKind::Number,
            ParamKind::Array(Box::new(ParamKind::Integer)),
            ParamKind::Array(Box::new(ParamKind::Any)),
        ] {
            assert_eq!(ParamKind::parse(&kind.name()), Some(kind));
        }
    }

    #[test]
    fn test_accepts() {
        assert!(ParamKind::Integer.accepts(&json!(3)));
        assert!(!ParamKind::Integer.accepts(&json!(3.5)));
        assert!(ParamKind::Integer.accepts(&json!(3.0)));
        assert!(ParamKind::Integer.accepts(&json!(-2.0)));
        assert!(!ParamKind::Integer.accepts(&json!(1e300)));
        assert!(ParamKind::Number.accepts(&json!(3)));
        assert!(ParamKind::Number.accepts(&json!(3.5)));
        assert!(!ParamKind::String.accepts(&json!(3)));
        assert!(ParamKind::Any.accepts(&Value::Null));
        assert!(ParamKind::Array(Box::new(ParamKind::String)).accepts(&json!(["a", "b"])));
        assert!(!ParamKind::Array(Box::new(ParamKind::String)).accepts(&json!(["a", 1])));
    }

    #[test]
    fn test_normalize_integral_floats() {
        let schema = InputSchema::new()
            .param(ParamSpec::required("count", ParamKind::Integer))
            .param(ParamSpec::optional("ids", ParamKind::Array(Box::new(ParamKind::Integer))))
            .param(ParamSpec::optional("ratio", ParamKind::Number));
        let mut args = json!({"count": 3.0, "ids": [1.0, 2], "ratio": 2.0});
        let args = args.as_object_mut().unwrap();

        assert!(schema.validate(args).is_ok());
        schema.normalize(args);
        assert_eq!(args["count"].as_i64(), Some(3));
        assert_eq!(args["ids"], json!([1, 2]));
        // Number parameters keep their float form
        assert!(args["ratio"].is_f64());
    }

    #[test]
    fn test_valid_arguments() {
        let schema = read_schema();
        assert!(schema.validate(&args(json!({"path": "/tmp/a"}))).is_ok());
        assert!(schema.validate(&args(json!({"path": "/tmp/a", "limit": 5}))).is_ok());
    }

    #[test]
    fn test_null_optional_counts_as_absent() {
        let schema = read_schema();
        assert!(schema.validate(&args(json!({"path": "/tmp/a", "limit": null}))).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let schema = read_schema();
        let errs = schema.validate(&args(json!({}))).unwrap_err();
        assert_eq!(errs, vec![SchemaViolation::Missing { name: "path".into() }]);

        let errs = schema.validate(&args(json!({"path": null}))).unwrap_err();
        assert_eq!(errs, vec![SchemaViolation::Missing { name: "path".into() }]);
    }

    #[test]
    fn test_collects_all_violations() {
        let schema = read_schema();
        let errs = schema
            .validate(&args(json!({"limit": "ten", "extra": true})))
            .unwrap_err();
        assert_eq!(errs.len(), 3);
        let msg = describe_violations(&errs);
        assert!(msg.contains("missing required argument 'path'"));
        assert!(msg.contains("argument 'limit' must be integer, got string"));
        assert!(msg.contains("unknown argument 'extra'"));
    }

    #[test]
    fn test_pass_through_allows_unknown() {
        let schema = read_schema().with_unknown_fields(UnknownFieldPolicy::PassThrough);
        assert!(schema.validate(&args(json!({"path": "x", "extra": 1}))).is_ok());
    }

    #[test]
    fn test_non_object_rejected() {
        let schema = read_schema();
        let errs = schema.validate_value(&json!([1, 2])).unwrap_err();
        assert_eq!(errs, vec![SchemaViolation::NotAnObject { actual: "array" }]);
    }

    #[test]
    fn test_to_json_schema() {
        let js = read_schema().to_json_schema();
        assert_eq!(js["type"], "object");
        assert_eq!(js["properties"]["path"]["type"], "string");
        assert_eq!(js["properties"]["path"]["description"], "File to read");
        assert_eq!(js["properties"]["limit"]["type"], "integer");
        assert_eq!(js["required"], json!(["path"]));
        assert_eq!(js["additionalProperties"], false);
    }

    #[test]
    fn test_unknown_field_policy_parse() {
        assert_eq!(UnknownFieldPolicy::parse("reject"), Some(UnknownFieldPolicy::Reject));
        assert_eq!(UnknownFieldPolicy::parse("pass-through"), Some(UnknownFieldPolicy::PassThrough));
        assert_eq!(UnknownFieldPolicy::parse("ignore"), None);
    }

    #[test]
    fn test_schema_serde_roundtrip() {
        let schema = InputSchema::new().param(ParamSpec::required(
            "tags",
            ParamKind::Array(Box::new(ParamKind::String)),
        ));
        let json = serde_json::to_string(&schema).unwrap();
        let back: InputSchema = serde_json::from_str(&json).unwrap();
        assert_eq!(back, schema);
    }
}
