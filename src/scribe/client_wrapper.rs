use crate::scribe::conversation::{Message, ToolCall};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use tokio::sync::Mutex;

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    /// Add another call's usage to this running total.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// A tool advertised to the model: name, description and JSON-schema parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema object describing the argument payload.
    pub parameters: serde_json::Value,
}

/// A model reply, decoded once at the gateway boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelReply {
    /// The model answered without requesting any tool.
    FinalAnswer {
        text: String,
        reasoning: Option<String>,
    },
    /// The model asked for one or more tool invocations, in order.
    ToolRequests {
        /// Optional text the model emitted alongside its calls.
        text: Option<String>,
        reasoning: Option<String>,
        calls: Vec<ToolCall>,
    },
}

impl ModelReply {
    /// Tool calls requested by this reply (empty for a final answer).
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            ModelReply::FinalAnswer { .. } => &[],
            ModelReply::ToolRequests { calls, .. } => calls,
        }
    }

    /// Turn the reply into the assistant message recorded in the session.
    pub fn to_message(&self) -> Message {
        match self {
            ModelReply::FinalAnswer { text, reasoning } => Message::Assistant {
                content: Some(text.clone()),
                reasoning: reasoning.clone(),
                tool_calls: Vec::new(),
            },
            ModelReply::ToolRequests {
                text,
                reasoning,
                calls,
            } => Message::Assistant {
                content: text.clone(),
                reasoning: reasoning.clone(),
                tool_calls: calls.clone(),
            },
        }
    }
}

/// Unrecoverable failures at the model backend boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The backend could not be reached (DNS, connect, timeout, broken body).
    Unreachable(String),
    /// The backend refused our credentials.
    Authentication(String),
    /// The backend answered with a non-success status.
    Rejected { status: u16, body: String },
    /// The reply could not be decoded into a final answer or tool requests.
    MalformedReply(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Unreachable(msg) => write!(f, "Model backend unreachable: {}", msg),
            GatewayError::Authentication(msg) => write!(f, "Authentication failed: {}", msg),
            GatewayError::Rejected { status, body } => {
                write!(f, "Request rejected with status {}: {}", status, body)
            }
            GatewayError::MalformedReply(msg) => write!(f, "Malformed model reply: {}", msg),
        }
    }
}

impl Error for GatewayError {}

/// A ClientWrapper is the Model Gateway: it wraps a specific cloud LLM service and
/// turns the running conversation into exactly one decoded [`ModelReply`].
/// It does not keep track of the conversation itself; the
/// [`SessionOrchestrator`](crate::orchestrator::SessionOrchestrator) owns the
/// [`Session`](crate::conversation::Session) and hands the full history in on every call.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Model identifier sent with every request.
    fn model_name(&self) -> &str;

    /// Send the full conversation to the LLM and decode its reply.
    /// - `messages`: the ordered session, system prompt first.
    /// - `tools`: definitions the model may call, `None` to disable tool use.
    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ModelReply, GatewayError>;

    /// Hook to retrieve usage from the *last* send_message() call.
    /// Default impl reads `usage_slot()` so wrappers only need to expose the slot.
    async fn get_last_usage(&self) -> Option<TokenUsage> {
        match self.usage_slot() {
            Some(slot) => slot.lock().await.clone(),
            None => None,
        }
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        // ClientWrapper implementations supporting TokenUsage tracking should return a Mutex<Option<TokenUsage>> by overriding this method.
        None
    }
}
