//! Wire format and transport shared by the OpenAI-compatible clients.
//!
//! The Chat Completions payloads are modelled with plain serde structs so that the
//! conversation can be encoded (including `tool_calls`, `tool_call_id` and
//! provider `reasoning_content`) and replies decoded once into a
//! [`ModelReply`]. HTTP clients are pooled per base URL:
//! - `pool_idle_timeout`: keeps idle connections alive for 90 seconds
//! - `tcp_keepalive`: sends keepalive packets every 60 seconds
//! - `timeout`: long-form generations can take minutes, so requests get 15 minutes

use crate::client_wrapper::{GatewayError, ModelReply, TokenUsage, ToolDefinition};
use crate::scribe::conversation::{Message, ToolCall};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    /// Global HTTP client pool, one client per base URL.
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create a shared HTTP client for the given base URL.
pub fn get_shared_http_client(base_url: &str) -> reqwest::Client {
    let mut pool = HTTP_CLIENT_POOL
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());

    if let Some(client) = pool.get(base_url) {
        return client.clone();
    }

    let client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(900))
        .build()
        .unwrap_or_else(|err| {
            log::warn!(
                "scribe::clients::common::get_shared_http_client(...): falling back to default client: {}",
                err
            );
            reqwest::Client::new()
        });

    pool.insert(base_url.to_string(), client.clone());
    client
}

/// Request body for `POST {base_url}/chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WireMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default = "function_type")]
    pub call_type: String,
    pub function: WireFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionCall {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: WireFunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct WireFunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: WireMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

fn function_type() -> String {
    "function".to_string()
}

/// Encode the session into Chat Completions messages.
pub fn encode_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|message| match message {
            Message::System { content } => WireMessage {
                role: "system".to_owned(),
                content: Some(content.clone()),
                ..WireMessage::default()
            },
            Message::User { content } => WireMessage {
                role: "user".to_owned(),
                content: Some(content.clone()),
                ..WireMessage::default()
            },
            Message::Assistant {
                content,
                reasoning,
                tool_calls,
            } => WireMessage {
                role: "assistant".to_owned(),
                content: content.clone(),
                reasoning_content: reasoning.clone(),
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        tool_calls
                            .iter()
                            .map(|call| WireToolCall {
                                id: Some(call.id.clone()),
                                call_type: function_type(),
                                function: WireFunctionCall {
                                    name: Some(call.name.clone()),
                                    arguments: Some(call.arguments.clone()),
                                },
                            })
                            .collect(),
                    )
                },
                ..WireMessage::default()
            },
            Message::ToolResult(result) => WireMessage {
                role: "tool".to_owned(),
                content: Some(result.to_content()),
                tool_call_id: Some(result.call_id.clone()),
                name: Some(result.tool_name.clone()),
                ..WireMessage::default()
            },
        })
        .collect()
}

/// Encode tool definitions into the `tools` array.
pub fn encode_tools(tools: &[ToolDefinition]) -> Vec<WireTool> {
    tools
        .iter()
        .map(|tool| WireTool {
            tool_type: function_type(),
            function: WireFunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        })
        .collect()
}

/// Decode a Chat Completions response body into a [`ModelReply`] plus reported usage.
pub fn decode_chat_response(
    body: &str,
) -> Result<(ModelReply, Option<TokenUsage>), GatewayError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| GatewayError::MalformedReply(format!("undecodable body: {}", e)))?;

    let usage = response.usage.as_ref().map(|u| TokenUsage {
        input_tokens: u.prompt_tokens as usize,
        output_tokens: u.completion_tokens as usize,
        total_tokens: u.total_tokens as usize,
    });

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::MalformedReply("reply has no choices".to_string()))?;
    if log::log_enabled!(log::Level::Debug) {
        log::debug!(
            "scribe::clients::common::decode_chat_response(...): finish_reason={:?}",
            choice.finish_reason
        );
    }

    let message = choice.message;
    let text = message.content.filter(|c| !c.is_empty());
    let reasoning = message.reasoning_content.filter(|r| !r.is_empty());
    let wire_calls = message.tool_calls.unwrap_or_default();

    if wire_calls.is_empty() {
        return Ok((
            ModelReply::FinalAnswer {
                text: text.unwrap_or_default(),
                reasoning,
            },
            usage,
        ));
    }

    let mut seen = HashSet::new();
    let mut calls = Vec::with_capacity(wire_calls.len());
    for (index, wire_call) in wire_calls.into_iter().enumerate() {
        let id = wire_call
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                GatewayError::MalformedReply(format!("tool call #{} has no id", index))
            })?;
        let name = wire_call
            .function
            .name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                GatewayError::MalformedReply(format!("tool call '{}' has no function name", id))
            })?;
        if !seen.insert(id.clone()) {
            return Err(GatewayError::MalformedReply(format!(
                "tool call id '{}' appears more than once",
                id
            )));
        }
        calls.push(ToolCall {
            id,
            name,
            arguments: wire_call.function.arguments.unwrap_or_default(),
        });
    }

    Ok((
        ModelReply::ToolRequests {
            text,
            reasoning,
            calls,
        },
        usage,
    ))
}

/// Map a non-success HTTP status into a [`GatewayError`].
pub fn status_to_error(status: u16, body: String) -> GatewayError {
    match status {
        401 | 403 => GatewayError::Authentication(format!("status {}: {}", status, body)),
        _ => GatewayError::Rejected { status, body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scribe::conversation::{FailureKind, ToolResult};

    #[test]
    fn test_decode_final_answer_with_usage() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "All done."}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let (reply, usage) = decode_chat_response(body).unwrap();
        assert_eq!(
            reply,
            ModelReply::FinalAnswer {
                text: "All done.".to_string(),
                reasoning: None
            }
        );
        assert_eq!(usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_decode_tool_requests_in_order() {
        let body = r#"{"choices": [{"message": {
            "role": "assistant",
            "content": "",
            "reasoning_content": "plan first",
            "tool_calls": [
                {"id": "call_1", "type": "function", "function": {"name": "create_project", "arguments": "{\"project_name\":\"x\"}"}},
                {"id": "call_2", "type": "function", "function": {"name": "write_file", "arguments": "{}"}}
            ]
        }}]}"#;
        let (reply, usage) = decode_chat_response(body).unwrap();
        assert!(usage.is_none());
        match reply {
            ModelReply::ToolRequests {
                text,
                reasoning,
                calls,
            } => {
                assert!(text.is_none());
                assert_eq!(reasoning.as_deref(), Some("plan first"));
                let ids: Vec<_> = calls.iter().map(|c| c.id.as_str()).collect();
                assert_eq!(ids, vec!["call_1", "call_2"]);
                assert_eq!(calls[0].arguments, "{\"project_name\":\"x\"}");
            }
            other => panic!("expected tool requests, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_unusable_replies() {
        assert!(matches!(
            decode_chat_response("not json"),
            Err(GatewayError::MalformedReply(_))
        ));
        assert!(matches!(
            decode_chat_response(r#"{"choices": []}"#),
            Err(GatewayError::MalformedReply(_))
        ));
        let missing_id = r#"{"choices": [{"message": {"role": "assistant",
            "tool_calls": [{"type": "function", "function": {"name": "write_file", "arguments": "{}"}}]}}]}"#;
        assert!(matches!(
            decode_chat_response(missing_id),
            Err(GatewayError::MalformedReply(_))
        ));
        let duplicate = r#"{"choices": [{"message": {"role": "assistant", "tool_calls": [
            {"id": "a", "type": "function", "function": {"name": "t", "arguments": "{}"}},
            {"id": "a", "type": "function", "function": {"name": "t", "arguments": "{}"}}
        ]}}]}"#;
        assert!(matches!(
            decode_chat_response(duplicate),
            Err(GatewayError::MalformedReply(_))
        ));
    }

    #[test]
    fn test_encode_tool_round() {
        let messages = vec![
            Message::system("sys"),
            Message::user("hi"),
            Message::assistant_with_calls(
                None,
                Some("thinking".to_string()),
                vec![ToolCall::new("c1", "write_file", "{}")],
            ),
            Message::ToolResult(ToolResult::failure(
                "c1",
                "write_file",
                FailureKind::InvalidArguments,
                "missing filename",
            )),
        ];
        let wire = serde_json::to_value(encode_messages(&messages)).unwrap();
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["reasoning_content"], "thinking");
        assert_eq!(wire[2]["tool_calls"][0]["id"], "c1");
        assert_eq!(wire[2]["tool_calls"][0]["type"], "function");
        assert_eq!(wire[3]["role"], "tool");
        assert_eq!(wire[3]["tool_call_id"], "c1");
        assert_eq!(wire[3]["name"], "write_file");
        assert!(wire[1].get("tool_calls").is_none());
    }

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_to_error(401, "bad key".into()),
            GatewayError::Authentication(_)
        ));
        assert_eq!(
            status_to_error(429, "slow down".into()),
            GatewayError::Rejected {
                status: 429,
                body: "slow down".into()
            }
        );
    }
}
