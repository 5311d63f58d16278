//! # Scribe
//!
//! Scribe is an autonomous writing agent. From one instruction it runs a multi-turn
//! session with a tool-calling language model (Moonshot's Kimi models by default, or
//! any OpenAI-compatible endpoint) and saves the resulting chapters, stories or
//! articles as files.
//!
//! The crate is layered the same way a session flows:
//!
//! * **Input**: [`input::InputCollector`] turns a command-line string or a multi-line
//!   interactive entry into an [`conversation::Instruction`].
//! * **Model Gateway**: the [`ClientWrapper`] trait, implemented by
//!   [`clients::openai::OpenAIClient`] and [`clients::moonshot::MoonshotClient`], sends the
//!   conversation and decodes the reply into a [`client_wrapper::ModelReply`].
//! * **Tools**: [`tool_protocol::ToolRegistry`] holds named tools with argument schemas;
//!   [`tools::WriterProtocol`] provides the writing tools and
//!   [`tool_protocols::CustomToolProtocol`] wraps plain Rust closures.
//! * **Dispatch**: [`dispatcher::ToolDispatcher`] runs one call and always returns a
//!   [`conversation::ToolResult`], even when the tool fails or panics.
//! * **Orchestration**: [`SessionOrchestrator`] loops between the model and the tools until
//!   the model answers without requesting any tool.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scribe::clients::moonshot::MoonshotClient;
//! use scribe::conversation::Instruction;
//! use scribe::tool_protocol::ToolRegistry;
//! use scribe::tools::WriterProtocol;
//! use scribe::SessionOrchestrator;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     scribe::init_logger();
//!
//!     let client = Arc::new(MoonshotClient::new_with_model_str(
//!         &std::env::var("MOONSHOT_API_KEY")?,
//!         "kimi-k2-thinking",
//!     ));
//!
//!     let mut registry = ToolRegistry::empty();
//!     registry.add_protocol(Arc::new(WriterProtocol::new("output"))).await?;
//!
//!     let mut orchestrator = SessionOrchestrator::new(client, Arc::new(registry))
//!         .with_system_prompt(scribe::config::DEFAULT_SYSTEM_PROMPT);
//!     let report = orchestrator
//!         .run(Instruction::from_text("Write a short story about a lighthouse"))
//!         .await?;
//!
//!     println!("{}", report.final_answer);
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Output is controlled through `RUST_LOG`, e.g. `RUST_LOG=scribe=debug`.
///
/// ```rust
/// scribe::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `scribe` module.
pub mod scribe;

// Re-exporting key items for easier external access.
pub use scribe::client_wrapper;
pub use scribe::client_wrapper::{ClientWrapper, GatewayError, ModelReply, TokenUsage};
pub use scribe::clients;
pub use scribe::config;
pub use scribe::config::ScribeConfig;
pub use scribe::conversation;
pub use scribe::conversation::{Instruction, Message, Session, ToolCall, ToolResult};
pub use scribe::dispatcher;
pub use scribe::event;
pub use scribe::event::{EventHandler, SessionEvent};
pub use scribe::input;
pub use scribe::orchestrator;
pub use scribe::orchestrator::{SessionError, SessionReport, SessionState};
pub use scribe::tool_protocol;
pub use scribe::tool_protocols;
pub use scribe::tools;
pub use scribe::SessionOrchestrator;
