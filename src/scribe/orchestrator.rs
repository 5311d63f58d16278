//! The session loop: send the conversation, run whatever tools the model asks for,
//! feed the results back, repeat until the model gives a final answer.
//!
//! ```text
//!                 reply with tool calls
//!  AwaitingModelReply ─────────────────────▶ DispatchingTools
//!        │   ▲                                     │
//!        │   └──────── all results appended ───────┘
//!        │
//!        ├── reply without tool calls ──▶ Done
//!        └── gateway error / budget ────▶ Failed
//! ```
//!
//! Every tool call receives exactly one result, in issuing order, before the
//! conversation goes back to the model. Tool failures are answered with failure
//! results and never end the session; only gateway errors (and an exhausted iteration
//! budget, when one is configured) do.
//!
//! # Example
//!
//! ```rust,no_run
//! use scribe::clients::moonshot::MoonshotClient;
//! use scribe::conversation::Instruction;
//! use scribe::orchestrator::SessionOrchestrator;
//! use scribe::tool_protocol::ToolRegistry;
//! use scribe::tools::WriterProtocol;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let client = Arc::new(MoonshotClient::new_with_model_str("sk-...", "kimi-k2-thinking"));
//!     let mut registry = ToolRegistry::empty();
//!     registry.add_protocol(Arc::new(WriterProtocol::new("output"))).await?;
//!
//!     let mut orchestrator = SessionOrchestrator::new(client, Arc::new(registry))
//!         .with_max_iterations(Some(300));
//!     let report = orchestrator
//!         .run(Instruction::from_text("Write three short poems about rain"))
//!         .await?;
//!     println!("{}", report.final_answer);
//!     Ok(())
//! }
//! ```

use crate::client_wrapper::{ClientWrapper, GatewayError, ModelReply, TokenUsage};
use crate::conversation::{Instruction, Message, Session};
use crate::dispatcher::ToolDispatcher;
use crate::event::{EventHandler, SessionEvent};
use crate::tool_protocol::ToolRegistry;
use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Where the orchestrator is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    AwaitingModelReply,
    DispatchingTools,
    Done,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingModelReply => "awaiting_model_reply",
            SessionState::DispatchingTools => "dispatching_tools",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a session ended without a final answer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The model backend failed; the session cannot continue.
    Gateway(GatewayError),
    /// The configured number of model calls was used up. All tool calls issued so far
    /// have been answered.
    BudgetExhausted { iterations: usize },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Gateway(err) => write!(f, "{}", err),
            SessionError::BudgetExhausted { iterations } => {
                write!(f, "Iteration budget exhausted after {} model calls", iterations)
            }
        }
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::Gateway(err) => Some(err),
            SessionError::BudgetExhausted { .. } => None,
        }
    }
}

impl From<GatewayError> for SessionError {
    fn from(err: GatewayError) -> Self {
        SessionError::Gateway(err)
    }
}

/// Summary of a session that reached `Done`.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session_id: String,
    /// Text of the model's final reply.
    pub final_answer: String,
    /// Provider reasoning attached to the final reply, if any.
    pub reasoning: Option<String>,
    /// Number of model calls made.
    pub iterations: usize,
    pub tool_calls_made: usize,
    /// Usage summed over every call, `None` when the backend never reported any.
    pub tokens_used: Option<TokenUsage>,
}

/// Drives one writing session from instruction to final answer.
pub struct SessionOrchestrator {
    client: Arc<dyn ClientWrapper>,
    dispatcher: ToolDispatcher,
    system_prompt: Option<String>,
    max_iterations: Option<usize>,
    event_handler: Option<Arc<dyn EventHandler>>,
    session: Session,
    state: SessionState,
    transitions: Vec<(SessionState, SessionState)>,
}

impl SessionOrchestrator {
    /// Orchestrator with no system prompt, no event handler and no iteration bound.
    pub fn new(client: Arc<dyn ClientWrapper>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            dispatcher: ToolDispatcher::new(registry),
            system_prompt: None,
            max_iterations: None,
            event_handler: None,
            session: Session::default(),
            state: SessionState::AwaitingModelReply,
            transitions: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Cap the number of model calls. `None` removes the cap.
    pub fn with_max_iterations(mut self, max_iterations: Option<usize>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// The conversation so far.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state change of the last run, in order.
    pub fn transitions(&self) -> &[(SessionState, SessionState)] {
        &self.transitions
    }

    async fn emit(&self, event: SessionEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_session_event(&event).await;
        }
    }

    async fn transition(&mut self, to: SessionState) {
        let from = self.state;
        self.state = to;
        self.transitions.push((from, to));
        log::debug!("SessionOrchestrator: {} -> {}", from, to);
        self.emit(SessionEvent::StateChanged { from, to }).await;
    }

    async fn fail(
        &mut self,
        session_id: &str,
        iterations: usize,
        error: SessionError,
    ) -> SessionError {
        log::error!("SessionOrchestrator::run(...): session {} failed: {}", session_id, error);
        self.transition(SessionState::Failed).await;
        self.emit(SessionEvent::SessionFailed {
            session_id: session_id.to_string(),
            iterations,
            error: error.to_string(),
        })
        .await;
        error
    }

    /// Run a fresh session for `instruction` until the model produces a final answer.
    ///
    /// Any conversation from a previous run is discarded.
    pub async fn run(&mut self, instruction: Instruction) -> Result<SessionReport, SessionError> {
        let session_id = uuid::Uuid::new_v4().to_string();
        self.session = Session::default();
        self.transitions.clear();

        if let Some(prompt) = &self.system_prompt {
            self.session.push(Message::system(prompt.clone()));
        }
        let text = instruction.text();
        self.session.push(Message::user(text.clone()));
        self.state = SessionState::AwaitingModelReply;

        let definitions = self.dispatcher.registry().definitions();
        log::info!(
            "SessionOrchestrator::run(...): session {} started with {} tools on {}",
            session_id,
            definitions.len(),
            self.client.model_name()
        );
        self.emit(SessionEvent::SessionStarted {
            session_id: session_id.clone(),
            model: self.client.model_name().to_string(),
            instruction_preview: text.chars().take(120).collect(),
            tool_count: definitions.len(),
        })
        .await;

        let mut iterations = 0usize;
        let mut tool_calls_made = 0usize;
        let mut tokens_used: Option<TokenUsage> = None;

        loop {
            if let Some(max) = self.max_iterations {
                if iterations >= max {
                    log::warn!(
                        "SessionOrchestrator::run(...): iteration budget of {} reached",
                        max
                    );
                    let err = SessionError::BudgetExhausted { iterations };
                    return Err(self.fail(&session_id, iterations, err).await);
                }
            }

            debug_assert!(
                self.session.unresolved_tool_calls().is_empty(),
                "conversation sent with unanswered tool calls"
            );

            iterations += 1;
            self.emit(SessionEvent::ModelCallStarted {
                iteration: iterations,
                message_count: self.session.len(),
            })
            .await;

            let tools = if definitions.is_empty() {
                None
            } else {
                Some(definitions.clone())
            };
            let reply = match self.client.send_message(self.session.messages(), tools).await {
                Ok(reply) => reply,
                Err(err) => {
                    return Err(self.fail(&session_id, iterations, err.into()).await);
                }
            };

            if let Err(err) = self.check_call_ids(&reply) {
                return Err(self.fail(&session_id, iterations, err.into()).await);
            }

            let usage = self.client.get_last_usage().await;
            if let Some(usage) = &usage {
                tokens_used
                    .get_or_insert_with(TokenUsage::default)
                    .accumulate(usage);
            }

            let reasoning_length = match &reply {
                ModelReply::FinalAnswer { reasoning, .. }
                | ModelReply::ToolRequests { reasoning, .. } => {
                    reasoning.as_ref().map(|r| r.len()).unwrap_or(0)
                }
            };
            self.emit(SessionEvent::ModelCallCompleted {
                iteration: iterations,
                tool_calls: reply.tool_calls().len(),
                tokens_used: usage,
                reasoning_length,
            })
            .await;

            self.session.push(reply.to_message());

            let calls = match reply {
                ModelReply::FinalAnswer { text, reasoning } => {
                    self.transition(SessionState::Done).await;
                    log::info!(
                        "SessionOrchestrator::run(...): session {} done after {} model calls and {} tool calls",
                        session_id,
                        iterations,
                        tool_calls_made
                    );
                    self.emit(SessionEvent::SessionCompleted {
                        session_id: session_id.clone(),
                        iterations,
                        tool_calls_made,
                        tokens_used: tokens_used.clone(),
                        response_length: text.len(),
                    })
                    .await;
                    return Ok(SessionReport {
                        session_id,
                        final_answer: text,
                        reasoning,
                        iterations,
                        tool_calls_made,
                        tokens_used,
                    });
                }
                ModelReply::ToolRequests { calls, .. } => calls,
            };

            self.transition(SessionState::DispatchingTools).await;
            for call in &calls {
                self.emit(SessionEvent::ToolCallStarted {
                    iteration: iterations,
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    arguments: call.arguments.clone(),
                })
                .await;

                let result = self.dispatcher.dispatch(call).await;

                self.emit(SessionEvent::ToolCallCompleted {
                    iteration: iterations,
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    success: result.is_success(),
                    error: if result.is_success() {
                        None
                    } else {
                        Some(result.to_content())
                    },
                })
                .await;
                self.session.push(Message::ToolResult(result));
                tool_calls_made += 1;
            }
            self.transition(SessionState::AwaitingModelReply).await;
        }
    }

    /// Reject replies whose call identifiers cannot be answered one-to-one.
    fn check_call_ids(&self, reply: &ModelReply) -> Result<(), GatewayError> {
        if let ModelReply::ToolRequests { calls, .. } = reply {
            if calls.is_empty() {
                return Err(GatewayError::MalformedReply(
                    "tool request without any tool calls".to_string(),
                ));
            }
            let mut seen = HashSet::new();
            for call in calls {
                if !seen.insert(call.id.as_str()) || self.session.contains_call_id(&call.id) {
                    return Err(GatewayError::MalformedReply(format!(
                        "duplicate tool call id '{}'",
                        call.id
                    )));
                }
            }
        }
        Ok(())
    }
}
