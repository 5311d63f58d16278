//! Moonshot (Kimi) client wrapper built on the OpenAI-compatible transport.
//!
//! Kimi's thinking models return `reasoning_content` next to the visible reply and
//! expect it back on replayed assistant turns; the shared wire format keeps it, so the
//! wrapper only has to pick the right base URL and model.
//!
//! # Example
//!
//! ```rust,no_run
//! use scribe::client_wrapper::ClientWrapper;
//! use scribe::clients::moonshot::{MoonshotClient, Model};
//! use scribe::conversation::Message;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let key = std::env::var("MOONSHOT_API_KEY")?;
//!     let client = MoonshotClient::new_with_model_enum(&key, Model::KimiK2Thinking);
//!     let reply = client.send_message(&[Message::user("Hello")], None).await?;
//!     println!("{:?}", reply);
//!     Ok(())
//! }
//! ```

use crate::client_wrapper::{ClientWrapper, GatewayError, ModelReply, TokenUsage, ToolDefinition};
use crate::clients::openai::OpenAIClient;
use crate::scribe::conversation::Message;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Default Moonshot API endpoint.
pub const MOONSHOT_BASE_URL: &str = "https://api.moonshot.ai/v1";

/// Client wrapper for Moonshot's API routed through the OpenAI compatible surface.
pub struct MoonshotClient {
    /// Delegated client that handles the HTTP interactions.
    delegate_client: OpenAIClient,
    /// Exposed model name.
    model: String,
}

/// Kimi models with tool calling support.
pub enum Model {
    /// `kimi-k2-thinking`: long-horizon reasoning model used for writing sessions.
    KimiK2Thinking,
    /// `kimi-k2-turbo-preview`: faster, non-thinking K2 tier.
    KimiK2TurboPreview,
    /// `kimi-k2-0905-preview`: K2 instruct snapshot.
    KimiK20905Preview,
}

/// Convert a [`Model`] variant into its public string identifier.
pub fn model_to_string(model: Model) -> String {
    match model {
        Model::KimiK2Thinking => "kimi-k2-thinking".to_string(),
        Model::KimiK2TurboPreview => "kimi-k2-turbo-preview".to_string(),
        Model::KimiK20905Preview => "kimi-k2-0905-preview".to_string(),
    }
}

impl MoonshotClient {
    /// Create a client from an API key and strongly typed model variant.
    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_str(secret_key, &model_to_string(model))
    }

    /// Create a client from an API key and explicit model string.
    pub fn new_with_model_str(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, MOONSHOT_BASE_URL)
    }

    /// Create a client pointing at a custom Moonshot-compatible base URL.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        MoonshotClient {
            delegate_client: OpenAIClient::new_with_base_url(secret_key, model_name, base_url),
            model: model_name.to_string(),
        }
    }

    /// Sampling temperature forwarded to the delegate.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.delegate_client = self.delegate_client.with_temperature(temperature);
        self
    }

    /// Completion token cap forwarded to the delegate.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.delegate_client = self.delegate_client.with_max_tokens(max_tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        self.delegate_client.base_url()
    }
}

#[async_trait]
impl ClientWrapper for MoonshotClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ModelReply, GatewayError> {
        self.delegate_client.send_message(messages, tools).await
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        self.delegate_client.usage_slot()
    }
}
