//! Tool Protocol Abstraction Layer
//!
//! This module defines the Tool Registry boundary: named operations with declared
//! argument schemas, grouped behind [`ToolProtocol`] implementations and looked up by
//! name through a [`ToolRegistry`].
//!
//! # Architecture
//!
//! ```text
//! ToolDispatcher → ToolRegistry → Tool → ToolProtocol (trait) → [Writer | Custom | User-defined]
//! ```
//!
//! # Example
//!
//! ```rust
//! use scribe::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType};
//! use serde_json::json;
//!
//! let metadata = ToolMetadata::new("write_file", "Write text to a file")
//!     .with_parameter(ToolParameter::new("filename", ToolParameterType::String).required());
//!
//! assert!(metadata.validate_arguments(&json!({"filename": "a.md"})).is_ok());
//! assert!(metadata.validate_arguments(&json!({})).is_err());
//! ```

use crate::client_wrapper::ToolDefinition;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Defines the type of a tool parameter
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ToolParameterType {
    /// JSON schema name of the type.
    pub fn schema_name(&self) -> &'static str {
        match self {
            ToolParameterType::String => "string",
            ToolParameterType::Number => "number",
            ToolParameterType::Integer => "integer",
            ToolParameterType::Boolean => "boolean",
            ToolParameterType::Array => "array",
            ToolParameterType::Object => "object",
        }
    }

    /// Whether `value` is an instance of this type.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            ToolParameterType::String => value.is_string(),
            ToolParameterType::Number => value.is_number(),
            ToolParameterType::Integer => value.is_i64() || value.is_u64(),
            ToolParameterType::Boolean => value.is_boolean(),
            ToolParameterType::Array => value.is_array(),
            ToolParameterType::Object => value.is_object(),
        }
    }
}

/// Defines a parameter for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<serde_json::Value>,
    /// When set, the argument must equal one of these values.
    pub allowed_values: Option<Vec<serde_json::Value>>,
}

impl ToolParameter {
    /// Define a new tool parameter with the provided name and type.
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
            allowed_values: None,
        }
    }

    /// Add a human readable description that will surface in generated schemas.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark the argument as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Provide a default value that will be used when the LLM omits the parameter.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Restrict the parameter to an enumerated set of values.
    pub fn with_allowed_values(mut self, values: Vec<serde_json::Value>) -> Self {
        self.allowed_values = Some(values);
        self
    }

    fn to_schema(&self) -> serde_json::Value {
        let mut schema = serde_json::Map::new();
        schema.insert("type".into(), self.param_type.schema_name().into());
        if let Some(description) = &self.description {
            schema.insert("description".into(), description.clone().into());
        }
        if let Some(values) = &self.allowed_values {
            schema.insert("enum".into(), serde_json::Value::Array(values.clone()));
        }
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }
        serde_json::Value::Object(schema)
    }
}

/// Metadata about a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    /// Create metadata with the supplied identifier and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    /// Append a parameter definition to the tool metadata.
    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// JSON schema object for the argument payload.
    pub fn parameters_schema(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.to_schema()))
            .collect();
        let required: Vec<serde_json::Value> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.clone().into())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Definition advertised to the model.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema(),
        }
    }

    /// Check an argument payload against the declared parameters.
    ///
    /// The payload must be an object; required parameters must be present; present
    /// parameters must have the declared type and, when enumerated, an allowed value.
    /// Undeclared keys are tolerated.
    pub fn validate_arguments(&self, arguments: &serde_json::Value) -> Result<(), String> {
        let object = arguments
            .as_object()
            .ok_or_else(|| format!("arguments for '{}' must be a JSON object", self.name))?;

        for param in &self.parameters {
            match object.get(&param.name) {
                None | Some(serde_json::Value::Null) => {
                    if param.required {
                        return Err(format!("missing required parameter '{}'", param.name));
                    }
                }
                Some(value) => {
                    if !param.param_type.accepts(value) {
                        return Err(format!(
                            "parameter '{}' must be of type {}",
                            param.name,
                            param.param_type.schema_name()
                        ));
                    }
                    if let Some(allowed) = &param.allowed_values {
                        if !allowed.contains(value) {
                            return Err(format!(
                                "parameter '{}' must be one of {}",
                                param.name,
                                serde_json::Value::Array(allowed.clone())
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Trait for implementing tool execution protocols
#[async_trait]
pub trait ToolProtocol: Send + Sync {
    /// Execute a tool with the given, already validated, parameters.
    async fn execute(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>>;

    /// Get metadata about available tools
    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>>;

    /// Protocol identifier (e.g., "writer", "custom")
    fn protocol_name(&self) -> &str;
}

/// Error types for tool operations
#[derive(Debug, Clone)]
pub enum ToolError {
    /// Requested tool is not registered in the current registry/protocol.
    NotFound(String),
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolError::NotFound(name) => write!(f, "Tool not found: {}", name),
        }
    }
}

impl Error for ToolError {}

/// A tool that can be invoked by the model
pub struct Tool {
    /// Metadata describing the tool interface.
    metadata: ToolMetadata,
    /// Underlying protocol implementation that actually executes the tool.
    protocol: Arc<dyn ToolProtocol>,
}

impl Tool {
    /// Bind metadata to the protocol that executes it.
    pub fn new(metadata: ToolMetadata, protocol: Arc<dyn ToolProtocol>) -> Self {
        Self { metadata, protocol }
    }

    /// Borrow the static metadata for the tool.
    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    /// Execute the tool using the configured protocol.
    pub async fn execute(
        &self,
        parameters: serde_json::Value,
    ) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
        self.protocol.execute(&self.metadata.name, parameters).await
    }
}

/// Registry of the named operations a session may invoke.
///
/// The registry is assembled before the session starts and is only read afterwards.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
}

impl ToolRegistry {
    /// Build an empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Discover every tool a protocol exposes and register them.
    ///
    /// Returns the number of tools added. Tools with a name already present replace
    /// the earlier registration.
    pub async fn add_protocol(
        &mut self,
        protocol: Arc<dyn ToolProtocol>,
    ) -> Result<usize, Box<dyn Error + Send + Sync>> {
        let discovered = protocol.list_tools().await?;
        let count = discovered.len();
        for metadata in discovered {
            log::debug!(
                "ToolRegistry::add_protocol(...): registering '{}' from protocol '{}'",
                metadata.name,
                protocol.protocol_name()
            );
            self.add_tool(Tool::new(metadata, Arc::clone(&protocol)));
        }
        Ok(count)
    }

    /// Insert or replace a tool definition.
    pub fn add_tool(&mut self, tool: Tool) {
        self.tools.insert(tool.metadata.name.clone(), tool);
    }

    /// Borrow a tool by name.
    pub fn get_tool(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// List metadata for registered tools, sorted by name.
    pub fn list_tools(&self) -> Vec<&ToolMetadata> {
        let mut tools: Vec<&ToolMetadata> = self.tools.values().map(|t| &t.metadata).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Tool definitions advertised to the model, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list_tools()
            .into_iter()
            .map(ToolMetadata::to_definition)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Invoke a named tool with its argument payload.
    pub async fn invoke(
        &self,
        tool_name: &str,
        parameters: serde_json::Value,
    ) -> Result<serde_json::Value, Box<dyn Error + Send + Sync>> {
        let tool = self
            .tools
            .get(tool_name)
            .ok_or_else(|| ToolError::NotFound(tool_name.to_string()))?;

        tool.execute(parameters).await
    }
}
