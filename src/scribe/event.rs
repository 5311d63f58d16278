//! Session event system.
//!
//! Implement [`EventHandler`] to follow a writing session as it runs: model
//! round-trips, state transitions and every tool invocation with its outcome. The
//! binary's console reporter is one such handler; tests use handlers that record what
//! they see.
//!
//! # Event Flow (a session with one tool round)
//!
//! ```text
//! SessionStarted
//!   └─ ModelCallStarted { iteration: 1 }
//!   └─ ModelCallCompleted { iteration: 1, tool_calls: 2 }
//!   └─ StateChanged { AwaitingModelReply -> DispatchingTools }
//!       ├─ ToolCallStarted / ToolCallCompleted (call 1)
//!       └─ ToolCallStarted / ToolCallCompleted (call 2)
//!   └─ StateChanged { DispatchingTools -> AwaitingModelReply }
//!   └─ ModelCallStarted { iteration: 2 }
//!   └─ ModelCallCompleted { iteration: 2, tool_calls: 0 }
//!   └─ StateChanged { AwaitingModelReply -> Done }
//! SessionCompleted
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use scribe::event::{EventHandler, SessionEvent};
//! use async_trait::async_trait;
//!
//! struct Logger;
//!
//! #[async_trait]
//! impl EventHandler for Logger {
//!     async fn on_session_event(&self, event: &SessionEvent) {
//!         if let SessionEvent::ToolCallCompleted { tool_name, success, .. } = event {
//!             println!("{} -> {}", tool_name, if *success { "ok" } else { "failed" });
//!         }
//!     }
//! }
//! ```

use crate::client_wrapper::TokenUsage;
use crate::orchestrator::SessionState;
use async_trait::async_trait;

/// Something that happened inside a [`SessionOrchestrator`](crate::orchestrator::SessionOrchestrator) run.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The instruction was appended and the first request is about to go out.
    SessionStarted {
        session_id: String,
        model: String,
        /// First ~120 characters of the instruction.
        instruction_preview: String,
        tool_count: usize,
    },

    /// Fired before each gateway request. Iterations are 1-based.
    ModelCallStarted {
        iteration: usize,
        message_count: usize,
    },

    /// Fired after a reply was decoded.
    ModelCallCompleted {
        iteration: usize,
        /// Number of tool calls the reply requested; zero for a final answer.
        tool_calls: usize,
        tokens_used: Option<TokenUsage>,
        /// Length of the reasoning text the provider returned, if any.
        reasoning_length: usize,
    },

    /// The orchestrator moved between states.
    StateChanged { from: SessionState, to: SessionState },

    ToolCallStarted {
        iteration: usize,
        call_id: String,
        tool_name: String,
        arguments: String,
    },

    ToolCallCompleted {
        iteration: usize,
        call_id: String,
        tool_name: String,
        success: bool,
        /// Failure message when `success` is false.
        error: Option<String>,
    },

    /// The model produced its final answer.
    SessionCompleted {
        session_id: String,
        iterations: usize,
        tool_calls_made: usize,
        tokens_used: Option<TokenUsage>,
        response_length: usize,
    },

    /// The run stopped on a gateway error or an exhausted iteration budget.
    SessionFailed {
        session_id: String,
        iterations: usize,
        error: String,
    },
}

/// Receiver for [`SessionEvent`]s.
///
/// The default implementation is a no-op, so a handler only overrides what it needs.
/// Handlers are shared as `Arc<dyn EventHandler>`.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_session_event(&self, _event: &SessionEvent) {}
}
