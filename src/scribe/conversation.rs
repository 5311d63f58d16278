//! Conversation data model shared by every layer of the session.
//!
//! A [`Session`] is the append-only log of [`Message`]s exchanged with the model for
//! one run. Assistant turns may request tools through [`ToolCall`]s; each call is
//! answered by exactly one [`ToolResult`] carrying either a JSON payload or a typed
//! [`FailureKind`].
//!
//! ```rust
//! use scribe::conversation::{Instruction, Message, Session, ToolCall, ToolResult};
//!
//! let mut session = Session::default();
//! session.push(Message::user(Instruction::from_text("Write two haiku").text()));
//! session.push(Message::assistant_with_calls(
//!     None,
//!     None,
//!     vec![ToolCall::new("call_1", "create_project", r#"{"project_name":"haiku"}"#)],
//! ));
//! assert_eq!(session.unresolved_tool_calls(), vec!["call_1"]);
//!
//! session.push(Message::ToolResult(ToolResult::success(
//!     "call_1",
//!     "create_project",
//!     serde_json::json!({"project": "haiku"}),
//! )));
//! assert!(session.unresolved_tool_calls().is_empty());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The user's request for one session, kept as the ordered lines it was captured as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    lines: Vec<String>,
}

impl Instruction {
    /// Build an instruction from already captured lines.
    pub fn from_lines(lines: Vec<String>) -> Self {
        Self { lines }
    }

    /// Wrap a complete instruction string. Splitting on `\n` keeps the text verbatim.
    pub fn from_text(text: &str) -> Self {
        Self {
            lines: text.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The instruction as a single string, lines joined with `\n`.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// `true` when no line carries anything but whitespace.
    pub fn is_blank(&self) -> bool {
        self.lines.iter().all(|line| line.trim().is_empty())
    }

    /// `true` when the whole instruction is one of the interactive quit words.
    pub fn is_quit_request(&self) -> bool {
        let text = self.text();
        matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "quit" | "exit" | "q"
        )
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// A model-issued request to run a named tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned identifier, unique within the session.
    pub id: String,
    /// Name of the tool in the registry.
    pub name: String,
    /// Argument payload as JSON text, exactly as the model produced it.
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse the argument payload. An empty payload is read as an empty object.
    pub fn parse_arguments(&self) -> Result<serde_json::Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.arguments)
    }
}

/// Why a tool call could not produce a success payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No tool with the requested name is registered.
    UnknownTool,
    /// The argument payload does not satisfy the tool's declared parameters.
    InvalidArguments,
    /// The tool ran and reported an error (or panicked).
    ExecutionError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::UnknownTool => write!(f, "unknown tool"),
            FailureKind::InvalidArguments => write!(f, "invalid arguments"),
            FailureKind::ExecutionError => write!(f, "execution error"),
        }
    }
}

/// Outcome of a single tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { payload: serde_json::Value },
    Failure { kind: FailureKind, message: String },
}

/// The response bound to exactly one [`ToolCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Identifier of the call this result answers.
    pub call_id: String,
    /// Name of the tool that was requested (echoed back to the provider).
    pub tool_name: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn success(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Success { payload },
        }
    }

    pub fn failure(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            outcome: ToolOutcome::Failure {
                kind,
                message: message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Text handed back to the model as the tool message content.
    ///
    /// String payloads are sent as-is; other payloads as compact JSON. Failures are
    /// wrapped as `{"error": {"kind": ..., "message": ...}}`.
    pub fn to_content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { payload } => match payload {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            },
            ToolOutcome::Failure { kind, message } => serde_json::json!({
                "error": { "kind": kind, "message": message }
            })
            .to_string(),
        }
    }
}

/// One turn of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Steering prompt placed ahead of the conversation.
    System { content: String },
    /// Text written by the human user.
    User { content: String },
    /// A model turn: optional text, optional provider reasoning, zero or more tool calls.
    Assistant {
        content: Option<String>,
        reasoning: Option<String>,
        tool_calls: Vec<ToolCall>,
    },
    /// The answer to one tool call.
    ToolResult(ToolResult),
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            reasoning: None,
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_with_calls(
        content: Option<String>,
        reasoning: Option<String>,
        tool_calls: Vec<ToolCall>,
    ) -> Self {
        Message::Assistant {
            content,
            reasoning,
            tool_calls,
        }
    }

    /// Tool calls carried by an assistant turn; empty for every other variant.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self {
            Message::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }
}

/// The ordered, append-only conversation for one run.
#[derive(Debug, Clone, Default)]
pub struct Session {
    messages: Vec<Message>,
}

impl Session {
    /// Append a message. There is no way to remove or reorder entries.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// `true` when any tool call in the session already uses `id`.
    pub fn contains_call_id(&self, id: &str) -> bool {
        self.messages
            .iter()
            .flat_map(|message| message.tool_calls())
            .any(|call| call.id == id)
    }

    /// Identifiers of tool calls that do not have exactly one result, in issuing order.
    ///
    /// An empty vector means the conversation may be sent back to the model.
    pub fn unresolved_tool_calls(&self) -> Vec<&str> {
        let mut answered: HashMap<&str, usize> = HashMap::new();
        for message in &self.messages {
            if let Message::ToolResult(result) = message {
                *answered.entry(result.call_id.as_str()).or_insert(0) += 1;
            }
        }

        self.messages
            .iter()
            .flat_map(|message| message.tool_calls())
            .filter(|call| answered.get(call.id.as_str()).copied().unwrap_or(0) != 1)
            .map(|call| call.id.as_str())
            .collect()
    }

    /// All tool results in the order they were appended.
    pub fn tool_results(&self) -> impl Iterator<Item = &ToolResult> {
        self.messages.iter().filter_map(|message| match message {
            Message::ToolResult(result) => Some(result),
            _ => None,
        })
    }
}
