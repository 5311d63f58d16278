//! The `OpenAIClient` struct implements `ClientWrapper` for any OpenAI-compatible
//! Chat Completions endpoint with native tool calling, capturing both the decoded
//! reply and the token usage reported for it.
//!
//! # Key Features
//!
//! - **send_message(...)**: posts the whole session plus tool definitions and returns a
//!   [`ModelReply`]: either a final answer or an ordered list of tool calls.
//! - **Automatic Usage Capture**: stores the latest `TokenUsage` internally.
//! - **Typed failures**: transport, authentication, rejection and decoding problems all
//!   surface as [`GatewayError`].
//!
//! # Example
//!
//! ```rust,no_run
//! use scribe::clients::openai::OpenAIClient;
//! use scribe::client_wrapper::ClientWrapper;
//! use scribe::conversation::Message;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = std::env::var("OPENAI_API_KEY")?;
//!     let client = OpenAIClient::new_with_model_string(&key, "gpt-4.1-mini");
//!     let reply = client
//!         .send_message(&[Message::user("Say hello in one word.")], None)
//!         .await?;
//!     println!("{:?}", reply);
//!     if let Some(usage) = client.get_last_usage().await {
//!         println!("total tokens: {}", usage.total_tokens);
//!     }
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::client_wrapper::{ClientWrapper, GatewayError, ModelReply, TokenUsage, ToolDefinition};
use crate::clients::common::{
    decode_chat_response, encode_messages, encode_tools, get_shared_http_client,
    status_to_error, ChatRequest,
};
use crate::scribe::conversation::Message;

/// Base URL of the public OpenAI API.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Client wrapper for OpenAI-compatible Chat Completions APIs.
///
/// Holds the selected model, sampling settings and a [`TokenUsage`] slot so callers can
/// inspect how many tokens each request consumed.
pub struct OpenAIClient {
    /// Pooled HTTP client for `base_url`.
    http: reqwest::Client,
    secret_key: String,
    /// Base URL without the trailing `/chat/completions`.
    base_url: String,
    /// Model name that will be injected into each request.
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    /// Storage for the token usage returned by the most recent request.
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    /// Construct a client for the public OpenAI API with an explicit model name.
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, OPENAI_BASE_URL)
    }

    /// Construct a client targeting a custom OpenAI compatible base URL.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        OpenAIClient {
            http: get_shared_http_client(&base_url),
            secret_key: secret_key.to_string(),
            base_url,
            model: model_name.to_string(),
            temperature: None,
            max_tokens: None,
            token_usage: Mutex::new(None),
        }
    }

    /// Sampling temperature sent with every request.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Upper bound on completion tokens per request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ModelReply, GatewayError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: encode_messages(messages),
            tools: tools
                .filter(|tools| !tools.is_empty())
                .map(|tools| encode_tools(&tools)),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.secret_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| {
                log::error!(
                    "OpenAIClient::send_message(...): request to {} failed: {}",
                    self.base_url,
                    err
                );
                GatewayError::Unreachable(err.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| GatewayError::Unreachable(format!("reading body: {}", err)))?;

        if !status.is_success() {
            if log::log_enabled!(log::Level::Error) {
                log::error!(
                    "OpenAIClient::send_message(...): API Error {}: {}",
                    status.as_u16(),
                    body
                );
            }
            return Err(status_to_error(status.as_u16(), body));
        }

        let (reply, usage) = decode_chat_response(&body)?;
        *self.token_usage.lock().await = usage;
        Ok(reply)
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = OpenAIClient::new_with_base_url("key", "gpt-4o", "http://localhost:8080/v1/");
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
        assert_eq!(client.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(client.model_name(), "gpt-4o");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_gateway_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = OpenAIClient::new_with_base_url("key", "m", "http://127.0.0.1:9/v1");
        let result = client.send_message(&[Message::user("hi")], None).await;
        assert!(matches!(result, Err(GatewayError::Unreachable(_))));
        assert!(client.get_last_usage().await.is_none());
    }
}
