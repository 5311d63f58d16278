//! Executes tool calls against the [`ToolRegistry`] and turns every outcome, including
//! failures and panics, into a [`ToolResult`] bound to the call that asked for it.
//!
//! The dispatcher never returns an error: the orchestrator relies on getting back
//! exactly one result per call so the conversation stays answerable.

use crate::conversation::{FailureKind, ToolCall, ToolResult};
use crate::tool_protocol::ToolRegistry;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Runs [`ToolCall`]s one at a time against a shared, read-only registry.
#[derive(Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute one call.
    ///
    /// Checks run in this order: the tool must be registered, the arguments must parse
    /// as JSON, and they must satisfy the tool's declared parameters. Only then is the
    /// tool executed; an error or a panic during execution becomes `ExecutionError`.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolResult {
        let tool = match self.registry.get_tool(&call.name) {
            Some(tool) => tool,
            None => {
                log::warn!("ToolDispatcher::dispatch(...): unknown tool '{}'", call.name);
                return ToolResult::failure(
                    &call.id,
                    &call.name,
                    FailureKind::UnknownTool,
                    format!("Tool '{}' is not available", call.name),
                );
            }
        };

        let arguments = match call.parse_arguments() {
            Ok(arguments) => arguments,
            Err(err) => {
                return ToolResult::failure(
                    &call.id,
                    &call.name,
                    FailureKind::InvalidArguments,
                    format!("Arguments are not valid JSON: {}", err),
                );
            }
        };

        if let Err(reason) = tool.metadata().validate_arguments(&arguments) {
            return ToolResult::failure(
                &call.id,
                &call.name,
                FailureKind::InvalidArguments,
                reason,
            );
        }

        log::debug!(
            "ToolDispatcher::dispatch(...): executing '{}' (call {})",
            call.name,
            call.id
        );

        match AssertUnwindSafe(tool.execute(arguments)).catch_unwind().await {
            Ok(Ok(payload)) => ToolResult::success(&call.id, &call.name, payload),
            Ok(Err(err)) => {
                log::warn!(
                    "ToolDispatcher::dispatch(...): '{}' failed: {}",
                    call.name,
                    err
                );
                ToolResult::failure(
                    &call.id,
                    &call.name,
                    FailureKind::ExecutionError,
                    err.to_string(),
                )
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log::error!(
                    "ToolDispatcher::dispatch(...): '{}' panicked: {}",
                    call.name,
                    message
                );
                ToolResult::failure(
                    &call.id,
                    &call.name,
                    FailureKind::ExecutionError,
                    format!("Tool '{}' panicked: {}", call.name, message),
                )
            }
        }
    }

    /// Execute calls sequentially, returning one result per call in the same order.
    pub async fn dispatch_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.dispatch(call).await);
        }
        results
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType};
    use crate::tool_protocols::CustomToolProtocol;
    use serde_json::json;
    use std::error::Error;

    async fn dispatcher() -> ToolDispatcher {
        let protocol = Arc::new(CustomToolProtocol::new());
        protocol
            .register_tool(
                ToolMetadata::new("shout", "Uppercase text").with_parameter(
                    ToolParameter::new("text", ToolParameterType::String).required(),
                ),
                Arc::new(|args| Ok(json!(args["text"].as_str().unwrap_or("").to_uppercase()))),
            )
            .await;
        protocol
            .register_tool(
                ToolMetadata::new("broken", "Always fails"),
                Arc::new(|_| {
                    Err(Box::new(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
                        as Box<dyn Error + Send + Sync>)
                }),
            )
            .await;
        protocol
            .register_tool(
                ToolMetadata::new("explode", "Panics"),
                Arc::new(|_| panic!("boom")),
            )
            .await;

        let mut registry = ToolRegistry::empty();
        registry.add_protocol(protocol).await.unwrap();
        ToolDispatcher::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_success() {
        let d = dispatcher().await;
        let result = d.dispatch(&ToolCall::new("c1", "shout", r#"{"text":"hi"}"#)).await;
        assert!(result.is_success());
        assert_eq!(result.call_id, "c1");
        assert_eq!(result.to_content(), "HI");
    }

    #[tokio::test]
    async fn test_failure_kinds() {
        let d = dispatcher().await;

        let unknown = d.dispatch(&ToolCall::new("c1", "missing", "{}")).await;
        assert_eq!(unknown.failure_kind(), Some(FailureKind::UnknownTool));

        let bad_json = d.dispatch(&ToolCall::new("c2", "shout", "{not json")).await;
        assert_eq!(bad_json.failure_kind(), Some(FailureKind::InvalidArguments));

        let missing_param = d.dispatch(&ToolCall::new("c3", "shout", "{}")).await;
        assert_eq!(missing_param.failure_kind(), Some(FailureKind::InvalidArguments));

        let failed = d.dispatch(&ToolCall::new("c4", "broken", "")).await;
        assert_eq!(failed.failure_kind(), Some(FailureKind::ExecutionError));
        assert!(failed.to_content().contains("disk full"));

        let panicked = d.dispatch(&ToolCall::new("c5", "explode", "{}")).await;
        assert_eq!(panicked.failure_kind(), Some(FailureKind::ExecutionError));
        assert!(panicked.to_content().contains("boom"));
    }

    #[tokio::test]
    async fn test_dispatch_all_preserves_order() {
        let d = dispatcher().await;
        let calls = vec![
            ToolCall::new("a", "explode", "{}"),
            ToolCall::new("b", "shout", r#"{"text":"x"}"#),
            ToolCall::new("c", "missing", "{}"),
        ];
        let results = d.dispatch_all(&calls).await;
        let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(results[1].is_success());
    }
}
