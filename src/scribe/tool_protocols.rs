//! Closure backed [`ToolProtocol`] implementation.
//!
//! [`CustomToolProtocol`] lets callers register plain Rust functions (sync or async) as
//! named tools. The binary registers its writing tools through
//! [`WriterProtocol`](crate::tools::WriterProtocol); this protocol is the quick way to
//! add ad-hoc tools and is what the test suite uses to script failing or slow tools.
//!
//! ```ignore
//! let protocol = Arc::new(CustomToolProtocol::new());
//! protocol.register_tool(metadata, Arc::new(|args| Ok(args))).await;
//! registry.add_protocol(protocol).await?;
//! ```

use crate::tool_protocol::{ToolError, ToolMetadata, ToolProtocol};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result type returned by registered tool functions.
pub type ToolOutput = Result<JsonValue, Box<dyn Error + Send + Sync>>;

/// Synchronous tool function.
pub type ToolFunction = Arc<dyn Fn(JsonValue) -> ToolOutput + Send + Sync>;

/// Asynchronous tool function.
pub type AsyncToolFunction =
    Arc<dyn Fn(JsonValue) -> Pin<Box<dyn Future<Output = ToolOutput> + Send>> + Send + Sync>;

/// Custom function-calling tool adapter
///
/// # Example
///
/// ```rust
/// use scribe::tool_protocols::CustomToolProtocol;
/// use scribe::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let adapter = CustomToolProtocol::new();
///     adapter.register_tool(
///         ToolMetadata::new("add", "Adds two numbers")
///             .with_parameter(ToolParameter::new("a", ToolParameterType::Number).required())
///             .with_parameter(ToolParameter::new("b", ToolParameterType::Number).required()),
///         Arc::new(|params| {
///             let a = params["a"].as_f64().unwrap_or(0.0);
///             let b = params["b"].as_f64().unwrap_or(0.0);
///             Ok(serde_json::json!({"result": a + b}))
///         }),
///     ).await;
/// }
/// ```
pub struct CustomToolProtocol {
    tools: Arc<RwLock<HashMap<String, ToolMetadata>>>,
    sync_functions: Arc<RwLock<HashMap<String, ToolFunction>>>,
    async_functions: Arc<RwLock<HashMap<String, AsyncToolFunction>>>,
}

impl CustomToolProtocol {
    /// Create an empty adapter ready to accept new tool registrations.
    pub fn new() -> Self {
        Self {
            tools: Arc::new(RwLock::new(HashMap::new())),
            sync_functions: Arc::new(RwLock::new(HashMap::new())),
            async_functions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a synchronous tool function.
    ///
    /// Subsequent calls will overwrite any existing tool with the same name.
    pub async fn register_tool(&self, metadata: ToolMetadata, function: ToolFunction) {
        let name = metadata.name.clone();
        self.tools.write().await.insert(name.clone(), metadata);
        self.async_functions.write().await.remove(&name);
        self.sync_functions.write().await.insert(name, function);
    }

    /// Register an asynchronous tool function.
    pub async fn register_async_tool(&self, metadata: ToolMetadata, function: AsyncToolFunction) {
        let name = metadata.name.clone();
        self.tools.write().await.insert(name.clone(), metadata);
        self.sync_functions.write().await.remove(&name);
        self.async_functions.write().await.insert(name, function);
    }

    /// Remove a tool from the adapter.
    pub async fn unregister_tool(&self, name: &str) {
        self.tools.write().await.remove(name);
        self.sync_functions.write().await.remove(name);
        self.async_functions.write().await.remove(name);
    }
}

impl Default for CustomToolProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolProtocol for CustomToolProtocol {
    async fn execute(&self, tool_name: &str, parameters: JsonValue) -> ToolOutput {
        // Clone the handle out so the lock is not held across the tool's own await.
        let async_func = self.async_functions.read().await.get(tool_name).cloned();
        if let Some(func) = async_func {
            return func(parameters).await;
        }

        let sync_func = self.sync_functions.read().await.get(tool_name).cloned();
        if let Some(func) = sync_func {
            return func(parameters);
        }

        Err(Box::new(ToolError::NotFound(tool_name.to_string())))
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        let tools = self.tools.read().await;
        Ok(tools.values().cloned().collect())
    }

    fn protocol_name(&self) -> &str {
        "custom"
    }
}
