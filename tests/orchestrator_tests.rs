use async_trait::async_trait;
use scribe::client_wrapper::{ClientWrapper, GatewayError, ModelReply, TokenUsage, ToolDefinition};
use scribe::conversation::{FailureKind, Instruction, Message, ToolCall};
use scribe::event::{EventHandler, SessionEvent};
use scribe::orchestrator::{SessionError, SessionOrchestrator, SessionState};
use scribe::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry};
use scribe::tool_protocols::CustomToolProtocol;
use serde_json::json;
use std::collections::VecDeque;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

/// Replays a fixed list of replies and records every conversation it was sent.
struct ScriptedClient {
    replies: StdMutex<VecDeque<Result<ModelReply, GatewayError>>>,
    /// Returned once the script runs out.
    fallback: Option<ModelReply>,
    requests: StdMutex<Vec<Vec<Message>>>,
    tools_seen: StdMutex<Vec<usize>>,
    usage: Mutex<Option<TokenUsage>>,
    usage_per_call: Option<TokenUsage>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<ModelReply, GatewayError>>) -> Self {
        Self {
            replies: StdMutex::new(replies.into()),
            fallback: None,
            requests: StdMutex::new(Vec::new()),
            tools_seen: StdMutex::new(Vec::new()),
            usage: Mutex::new(None),
            usage_per_call: None,
        }
    }

    fn repeating(reply: ModelReply) -> Self {
        let mut client = Self::new(Vec::new());
        client.fallback = Some(reply);
        client
    }

    fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage_per_call = Some(usage);
        self
    }

    fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClientWrapper for ScriptedClient {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn send_message(
        &self,
        messages: &[Message],
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ModelReply, GatewayError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.tools_seen
            .lock()
            .unwrap()
            .push(tools.map(|t| t.len()).unwrap_or(0));

        let next = self.replies.lock().unwrap().pop_front();
        let reply = match next {
            Some(reply) => reply,
            None => match &self.fallback {
                Some(reply) => Ok(reply.clone()),
                None => Err(GatewayError::MalformedReply("script exhausted".into())),
            },
        };
        *self.usage.lock().await = self.usage_per_call.clone();
        reply
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.usage)
    }
}

#[derive(Default)]
struct RecordingHandler {
    events: StdMutex<Vec<SessionEvent>>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_session_event(&self, event: &SessionEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

fn final_answer(text: &str) -> ModelReply {
    ModelReply::FinalAnswer {
        text: text.to_string(),
        reasoning: None,
    }
}

fn tool_requests(calls: Vec<ToolCall>) -> ModelReply {
    ModelReply::ToolRequests {
        text: None,
        reasoning: Some("thinking".to_string()),
        calls,
    }
}

/// Registry with `echo` (ok), `fail` (error), `explode` (panic) and `count` (counts calls).
async fn test_registry(counter: Arc<AtomicUsize>) -> Arc<ToolRegistry> {
    let protocol = Arc::new(CustomToolProtocol::new());
    protocol
        .register_tool(
            ToolMetadata::new("echo", "Echo text").with_parameter(
                ToolParameter::new("text", ToolParameterType::String).required(),
            ),
            Arc::new(|args| Ok(args["text"].clone())),
        )
        .await;
    protocol
        .register_tool(
            ToolMetadata::new("fail", "Always fails"),
            Arc::new(|_| Err("storage unavailable".into())),
        )
        .await;
    protocol
        .register_tool(
            ToolMetadata::new("explode", "Panics"),
            Arc::new(|_| panic!("tool blew up")),
        )
        .await;
    protocol
        .register_tool(
            ToolMetadata::new("count", "Counts invocations"),
            Arc::new(move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok(json!({ "count": n }))
            }),
        )
        .await;

    let mut registry = ToolRegistry::empty();
    registry.add_protocol(protocol).await.unwrap();
    Arc::new(registry)
}

fn instruction() -> Instruction {
    Instruction::from_lines(vec!["Write article A".into(), "Write article B".into()])
}

#[tokio::test]
async fn test_final_answer_without_tools_goes_straight_to_done() {
    let counter = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(ScriptedClient::new(vec![Ok(final_answer("All done"))]));
    let mut orchestrator =
        SessionOrchestrator::new(client.clone(), test_registry(counter.clone()).await)
            .with_system_prompt("You write.");

    let report = orchestrator.run(instruction()).await.unwrap();

    assert_eq!(report.final_answer, "All done");
    assert_eq!(report.iterations, 1);
    assert_eq!(report.tool_calls_made, 0);
    assert_eq!(orchestrator.state(), SessionState::Done);
    assert_eq!(
        orchestrator.transitions(),
        &[(SessionState::AwaitingModelReply, SessionState::Done)]
    );
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0][0], Message::system("You write."));
    assert_eq!(
        requests[0][1],
        Message::user("Write article A\nWrite article B")
    );
    assert_eq!(*client.tools_seen.lock().unwrap(), vec![4]);
}

#[tokio::test]
async fn test_every_tool_call_gets_one_result_in_order() {
    let counter = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(ScriptedClient::new(vec![
        Ok(tool_requests(vec![
            ToolCall::new("call_1", "echo", r#"{"text":"hello"}"#),
            ToolCall::new("call_2", "fail", "{}"),
            ToolCall::new("call_3", "no_such_tool", "{}"),
            ToolCall::new("call_4", "echo", r#"{"text": 42}"#),
            ToolCall::new("call_5", "explode", "{}"),
            ToolCall::new("call_6", "count", "{}"),
        ])),
        Ok(final_answer("Finished")),
    ]));
    let mut orchestrator = SessionOrchestrator::new(client.clone(), test_registry(counter).await);

    let report = orchestrator.run(instruction()).await.unwrap();
    assert_eq!(report.iterations, 2);
    assert_eq!(report.tool_calls_made, 6);

    let requests = client.requests();
    let second = &requests[1];
    let results: Vec<_> = second
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult(r) => Some(r.clone()),
            _ => None,
        })
        .collect();
    let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
    assert_eq!(
        ids,
        vec!["call_1", "call_2", "call_3", "call_4", "call_5", "call_6"]
    );

    assert!(results[0].is_success());
    assert_eq!(results[0].to_content(), "hello");
    assert_eq!(results[1].failure_kind(), Some(FailureKind::ExecutionError));
    assert!(results[1].to_content().contains("storage unavailable"));
    assert_eq!(results[2].failure_kind(), Some(FailureKind::UnknownTool));
    assert_eq!(results[3].failure_kind(), Some(FailureKind::InvalidArguments));
    assert_eq!(results[4].failure_kind(), Some(FailureKind::ExecutionError));
    assert!(results[5].is_success());

    // The assistant turn is recorded, with its reasoning, ahead of its results.
    match &second[1] {
        Message::Assistant {
            reasoning,
            tool_calls,
            ..
        } => {
            assert_eq!(reasoning.as_deref(), Some("thinking"));
            assert_eq!(tool_calls.len(), 6);
        }
        other => panic!("expected assistant turn, got {:?}", other),
    }

    assert!(orchestrator.session().unresolved_tool_calls().is_empty());
    assert_eq!(
        orchestrator.transitions(),
        &[
            (SessionState::AwaitingModelReply, SessionState::DispatchingTools),
            (SessionState::DispatchingTools, SessionState::AwaitingModelReply),
            (SessionState::AwaitingModelReply, SessionState::Done),
        ]
    );
}

#[tokio::test]
async fn test_unreachable_gateway_fails_without_dispatch() {
    let counter = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(ScriptedClient::new(vec![
        Err(GatewayError::Unreachable("connection refused".into())),
        Ok(tool_requests(vec![ToolCall::new("c1", "count", "{}")])),
    ]));
    let mut orchestrator =
        SessionOrchestrator::new(client.clone(), test_registry(counter.clone()).await);

    let err = orchestrator.run(instruction()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Gateway(GatewayError::Unreachable(_))
    ));
    assert!(err.source().is_some());
    assert_eq!(orchestrator.state(), SessionState::Failed);
    assert_eq!(
        orchestrator.transitions(),
        &[(SessionState::AwaitingModelReply, SessionState::Failed)]
    );
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert_eq!(client.requests().len(), 1);
    assert_eq!(orchestrator.session().len(), 1);
}

#[tokio::test]
async fn test_gateway_error_after_tool_round_keeps_results() {
    let counter = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(ScriptedClient::new(vec![
        Ok(tool_requests(vec![ToolCall::new("c1", "count", "{}")])),
        Err(GatewayError::Authentication("invalid key".into())),
    ]));
    let mut orchestrator =
        SessionOrchestrator::new(client.clone(), test_registry(counter.clone()).await);

    let err = orchestrator.run(instruction()).await.unwrap_err();
    assert_eq!(
        err,
        SessionError::Gateway(GatewayError::Authentication("invalid key".into()))
    );
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(orchestrator.session().unresolved_tool_calls().is_empty());
    assert_eq!(orchestrator.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_budget_is_checked_between_rounds() {
    let counter = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(ScriptedClient::new(vec![
        Ok(tool_requests(vec![
            ToolCall::new("r1_a", "count", "{}"),
            ToolCall::new("r1_b", "count", "{}"),
        ])),
        Ok(tool_requests(vec![ToolCall::new("r2_a", "count", "{}")])),
        Ok(final_answer("never reached")),
    ]));
    let mut orchestrator =
        SessionOrchestrator::new(client.clone(), test_registry(counter.clone()).await)
            .with_max_iterations(Some(2));

    let err = orchestrator.run(instruction()).await.unwrap_err();

    assert_eq!(err, SessionError::BudgetExhausted { iterations: 2 });
    assert_eq!(client.requests().len(), 2);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    assert!(orchestrator.session().unresolved_tool_calls().is_empty());
    assert_eq!(orchestrator.state(), SessionState::Failed);
}

#[tokio::test]
async fn test_unbounded_by_default() {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut replies = Vec::new();
    for round in 0..25 {
        replies.push(Ok(tool_requests(vec![ToolCall::new(
            format!("call_{}", round),
            "count",
            "{}",
        )])));
    }
    replies.push(Ok(final_answer("done")));
    let client = Arc::new(ScriptedClient::new(replies));
    let mut orchestrator =
        SessionOrchestrator::new(client, test_registry(counter.clone()).await);

    let report = orchestrator.run(instruction()).await.unwrap();
    assert_eq!(report.iterations, 26);
    assert_eq!(counter.load(Ordering::SeqCst), 25);
}

#[tokio::test]
async fn test_repeated_call_id_is_malformed() {
    let counter = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(ScriptedClient::repeating(tool_requests(vec![
        ToolCall::new("same_id", "count", "{}"),
    ])));
    let mut orchestrator =
        SessionOrchestrator::new(client.clone(), test_registry(counter.clone()).await);

    let err = orchestrator.run(instruction()).await.unwrap_err();

    assert!(matches!(
        err,
        SessionError::Gateway(GatewayError::MalformedReply(_))
    ));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    // The offending reply is not recorded, so the session stays answerable.
    assert!(orchestrator.session().unresolved_tool_calls().is_empty());
    assert_eq!(client.requests().len(), 2);
}

#[tokio::test]
async fn test_duplicate_ids_within_one_reply_are_malformed() {
    let counter = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(ScriptedClient::new(vec![Ok(tool_requests(vec![
        ToolCall::new("dup", "count", "{}"),
        ToolCall::new("dup", "count", "{}"),
    ]))]));
    let mut orchestrator = SessionOrchestrator::new(client, test_registry(counter.clone()).await);

    let err = orchestrator.run(instruction()).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Gateway(GatewayError::MalformedReply(_))
    ));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_usage_and_events() {
    let counter = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(
        ScriptedClient::new(vec![
            Ok(tool_requests(vec![ToolCall::new("c1", "fail", "{}")])),
            Ok(final_answer("ok")),
        ])
        .with_usage(TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        }),
    );
    let handler = Arc::new(RecordingHandler::default());
    let mut orchestrator = SessionOrchestrator::new(client, test_registry(counter).await)
        .with_event_handler(handler.clone());

    let report = orchestrator.run(instruction()).await.unwrap();
    assert_eq!(
        report.tokens_used,
        Some(TokenUsage {
            input_tokens: 20,
            output_tokens: 10,
            total_tokens: 30,
        })
    );
    assert!(!report.session_id.is_empty());

    let events = handler.events.lock().unwrap();
    let names: Vec<&str> = events
        .iter()
        .map(|e| match e {
            SessionEvent::SessionStarted { .. } => "started",
            SessionEvent::ModelCallStarted { .. } => "call",
            SessionEvent::ModelCallCompleted { .. } => "reply",
            SessionEvent::StateChanged { .. } => "state",
            SessionEvent::ToolCallStarted { .. } => "tool",
            SessionEvent::ToolCallCompleted { .. } => "tool_done",
            SessionEvent::SessionCompleted { .. } => "completed",
            SessionEvent::SessionFailed { .. } => "failed",
        })
        .collect();
    assert_eq!(
        names,
        vec![
            "started", "call", "reply", "state", "tool", "tool_done", "state", "call", "reply",
            "state", "completed"
        ]
    );

    let failed_tool = events.iter().find_map(|e| match e {
        SessionEvent::ToolCallCompleted { success, error, .. } => Some((*success, error.clone())),
        _ => None,
    });
    let (success, error) = failed_tool.unwrap();
    assert!(!success);
    assert!(error.unwrap().contains("storage unavailable"));
}

#[tokio::test]
async fn test_run_starts_a_fresh_session() {
    let counter = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(ScriptedClient::new(vec![
        Ok(final_answer("first")),
        Ok(final_answer("second")),
    ]));
    let mut orchestrator = SessionOrchestrator::new(client, test_registry(counter).await);

    orchestrator.run(Instruction::from_text("one")).await.unwrap();
    let report = orchestrator.run(Instruction::from_text("two")).await.unwrap();

    assert_eq!(report.final_answer, "second");
    assert_eq!(orchestrator.session().len(), 2);
    assert_eq!(orchestrator.session().messages()[0], Message::user("two"));
    assert_eq!(orchestrator.transitions().len(), 1);
}

