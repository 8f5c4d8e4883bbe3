//! Streaming response driver.
//!
//! Given an agent, a trigger message, and a roster snapshot, the driver
//! produces one finished message, handling an internal bounded loop of
//! tool invocations. Every content delta is persisted through the message
//! repository before the next stream event is requested, so observers see
//! partial content grow live. A stream failure marks the message `Error`
//! and is not retried here; a tool failure is captured per call and never
//! aborts its siblings or the turn.

use std::sync::Arc;

use chrono::Utc;
use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, warn};

use colloquy_types::agent::{AgentProfile, Author};
use colloquy_types::discussion::Discussion;
use colloquy_types::error::{RepositoryError, ToolError};
use colloquy_types::event::DiscussionEvent;
use colloquy_types::llm::{CompletionRequest, LlmError, StreamEvent};
use colloquy_types::message::{
    Message, MessageId, MessagePatch, MessageStatus, Segment, ToolCall, ToolResultMessage,
    ToolResultStatus,
};

use crate::event::EventBus;
use crate::llm::CompletionProvider;
use crate::mention::MentionGate;
use crate::repository::MessageRepository;
use crate::tool::BoxToolExecutor;
use crate::turn::prompt::PromptBuilder;

/// Errors that abort a streaming turn.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("completion stream failed: {0}")]
    Stream(#[from] LlmError),

    #[error("turn cancelled")]
    Cancelled,

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Outcome of one model turn inside the round loop.
struct StreamOutcome {
    message: Message,
    tool_calls: Vec<ToolCall>,
}

/// Drives one streaming response for a speaking agent.
pub struct TurnDriver<R> {
    provider: Arc<dyn CompletionProvider>,
    tools: Option<Arc<BoxToolExecutor>>,
    repo: Arc<R>,
    bus: EventBus,
    gate: MentionGate,
}

impl<R: MessageRepository> TurnDriver<R> {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        tools: Option<Arc<BoxToolExecutor>>,
        repo: Arc<R>,
        bus: EventBus,
        gate: MentionGate,
    ) -> Self {
        Self {
            provider,
            tools,
            repo,
            bus,
            gate,
        }
    }

    /// Produce one finished message for `agent` in response to `trigger`.
    ///
    /// `roster` is the member-profile snapshot taken by the caller at the
    /// start of the turn; it is not re-read here. `cancel` aborts the turn:
    /// the in-flight message is marked `Error` and `TurnError::Cancelled`
    /// is returned.
    pub async fn drive(
        &self,
        agent: &AgentProfile,
        trigger: &Message,
        discussion: &Discussion,
        roster: &[AgentProfile],
        cancel: CancellationToken,
    ) -> Result<Message, TurnError> {
        let settings = &discussion.settings;
        let executor = self
            .tools
            .as_deref()
            .filter(|_| settings.tool_access.allows(agent.role));
        let tool_specs = executor.map(|t| t.specs()).unwrap_or_default();

        let history = self.repo.list(&discussion.id).await?;
        let others: Vec<AgentProfile> = roster
            .iter()
            .filter(|p| p.id != agent.id)
            .cloned()
            .collect();
        let system = PromptBuilder::system_prompt(agent, &others, settings);
        let mut turns = PromptBuilder::conversation_turns(agent, roster, &history, trigger);

        let span = info_span!(
            "turn.drive",
            gen_ai.system = self.provider.name(),
            gen_ai.request.temperature = settings.temperature,
            gen_ai.request.stream = true,
            agent_id = %agent.id,
            discussion_id = %discussion.id,
        );

        async {
            let max_rounds = settings.max_tool_rounds.max(1);
            let mut round: u8 = 1;

            loop {
                let request = CompletionRequest {
                    system: Some(system.clone()),
                    turns: turns.clone(),
                    temperature: Some(settings.temperature),
                    tools: tool_specs.clone(),
                };

                let created = self.open_message(discussion, agent).await?;
                let outcome = self.stream_turn(created, roster, request, &cancel).await?;

                let calls = outcome.tool_calls;
                if calls.is_empty() {
                    return Ok(outcome.message);
                }
                let Some(executor) = executor else {
                    return Ok(outcome.message);
                };
                if round >= max_rounds {
                    debug!(
                        round,
                        leftover_calls = calls.len(),
                        "tool round limit reached, returning message with uninterpreted calls"
                    );
                    return Ok(outcome.message);
                }

                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    let result = self
                        .execute_call(&outcome.message, call, executor, round)
                        .await?;
                    results.push(result);
                }

                turns.push(PromptBuilder::assistant_tool_turn(
                    &outcome.message.content,
                    &calls,
                ));
                for result in &results {
                    turns.push(PromptBuilder::tool_result_turn(result));
                }

                round += 1;
            }
        }
        .instrument(span)
        .await
    }

    /// Create the pending message record for one model turn.
    async fn open_message(
        &self,
        discussion: &Discussion,
        agent: &AgentProfile,
    ) -> Result<Message, TurnError> {
        let message = Message::pending(discussion.id, Author::Agent { id: agent.id });
        let message = self.repo.create(&message).await?;
        self.bus.publish(DiscussionEvent::MessageCreated {
            discussion_id: discussion.id,
            message_id: message.id,
        });
        Ok(message)
    }

    /// Run one model turn to completion, persisting deltas as they arrive.
    async fn stream_turn(
        &self,
        created: Message,
        roster: &[AgentProfile],
        request: CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<StreamOutcome, TurnError> {
        let mut stream = self.provider.stream(request);

        let mut message = self
            .repo
            .update(
                &created.id,
                &MessagePatch {
                    status: Some(MessageStatus::Streaming),
                    ..Default::default()
                },
            )
            .await?;

        let mut content = String::new();
        let mut calls: Vec<ToolCall> = Vec::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.fail_message(&message, &content).await?;
                    return Err(TurnError::Cancelled);
                }
                next = stream.next() => next,
            };

            match next {
                None => break,
                Some(Ok(StreamEvent::TextDelta { text })) => {
                    content.push_str(&text);
                    // Persist the partial before requesting the next event.
                    message = self
                        .repo
                        .update(
                            &message.id,
                            &MessagePatch {
                                content: Some(content.clone()),
                                ..Default::default()
                            },
                        )
                        .await?;
                    self.bus.publish(DiscussionEvent::MessageTextDelta {
                        message_id: message.id,
                        text,
                    });
                    self.gate
                        .observe(message.id, &message.author, &content, true, roster);
                }
                Some(Ok(StreamEvent::ToolCalls { calls: requested })) => {
                    calls = requested;
                }
                Some(Ok(StreamEvent::Done)) => break,
                Some(Err(error)) => {
                    self.fail_message(&message, &content).await?;
                    warn!(error = %error, "completion stream failed");
                    return Err(TurnError::Stream(error));
                }
            }
        }

        let segments = build_segments(&content, &calls);
        let message = self
            .repo
            .update(
                &message.id,
                &MessagePatch {
                    content: Some(content.clone()),
                    status: Some(MessageStatus::Completed),
                    segments: Some(segments),
                    tool_calls: Some(calls.clone()),
                },
            )
            .await?;
        self.gate
            .observe(message.id, &message.author, &content, false, roster);
        self.bus.publish(DiscussionEvent::MessageCompleted {
            message_id: message.id,
            status: MessageStatus::Completed,
        });

        Ok(StreamOutcome {
            message,
            tool_calls: calls,
        })
    }

    /// Mark the in-flight message `Error`, keeping whatever content arrived.
    async fn fail_message(&self, message: &Message, content: &str) -> Result<(), TurnError> {
        self.repo
            .update(
                &message.id,
                &MessagePatch {
                    content: Some(content.to_string()),
                    status: Some(MessageStatus::Error),
                    ..Default::default()
                },
            )
            .await?;
        self.bus.publish(DiscussionEvent::MessageCompleted {
            message_id: message.id,
            status: MessageStatus::Error,
        });
        Ok(())
    }

    /// Execute a single tool call and persist its result.
    ///
    /// A failing call becomes an error-status result record; it does not
    /// abort the other calls in the same round.
    async fn execute_call(
        &self,
        origin: &Message,
        call: &ToolCall,
        executor: &BoxToolExecutor,
        round: u8,
    ) -> Result<ToolResultMessage, TurnError> {
        self.bus.publish(DiscussionEvent::ToolCallStarted {
            message_id: origin.id,
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            round,
        });

        let started_at = Utc::now();
        let outcome = match serde_json::from_str::<serde_json::Value>(&call.arguments) {
            Ok(args) => executor.execute(&call.name, &args).await,
            Err(error) => Err(ToolError::InvalidArguments {
                tool: call.name.clone(),
                message: error.to_string(),
            }),
        };
        let ended_at = Utc::now();

        let result = match outcome {
            Ok(value) => ToolResultMessage {
                id: MessageId::new(),
                origin_message_id: origin.id,
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                status: ToolResultStatus::Success,
                result: Some(value),
                error: None,
                started_at,
                ended_at,
            },
            Err(error) => {
                warn!(tool = %call.name, error = %error, "tool execution failed");
                ToolResultMessage {
                    id: MessageId::new(),
                    origin_message_id: origin.id,
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    status: ToolResultStatus::Error,
                    result: None,
                    error: Some(error.to_string()),
                    started_at,
                    ended_at,
                }
            }
        };

        let result = self.repo.create_tool_result(&result).await?;
        self.bus.publish(DiscussionEvent::ToolCallFinished {
            message_id: origin.id,
            tool_call_id: call.id.clone(),
            success: result.status == ToolResultStatus::Success,
        });
        Ok(result)
    }
}

/// Build display segments for a completed model turn: the text body (when
/// present) followed by one segment per captured tool call.
fn build_segments(content: &str, calls: &[ToolCall]) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(1 + calls.len());
    if !content.is_empty() {
        segments.push(Segment::Text {
            text: content.to_string(),
        });
    }
    for call in calls {
        segments.push(Segment::ToolCall { call: call.clone() });
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use colloquy_types::agent::AgentRole;
    use colloquy_types::discussion::ToolAccess;
    use colloquy_types::llm::ToolSpec;

    use crate::testing::{
        MemoryMessages, ScriptedProvider, discussion_with, member_profile, text_events,
        tool_call, tool_events,
    };
    use crate::tool::ToolRegistry;

    fn driver_with(
        provider: ScriptedProvider,
        tools: Option<ToolRegistry>,
        repo: Arc<MemoryMessages>,
    ) -> TurnDriver<MemoryMessages> {
        let bus = EventBus::new(64);
        let (gate, _rx) = MentionGate::new(bus.clone());
        TurnDriver::new(
            Arc::new(provider),
            tools.map(|t| Arc::new(BoxToolExecutor::new(t))),
            repo,
            bus,
            gate,
        )
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(
            ToolSpec {
                name: "echo".to_string(),
                description: "returns its arguments".to_string(),
                parameters: json!({"type": "object"}),
            },
            |args| async move { Ok(args) },
        );
        registry
    }

    #[tokio::test]
    async fn content_only_turn_completes_in_one_round() {
        let repo = MemoryMessages::new();
        let discussion = discussion_with(ToolAccess::All, 3);
        let agent = member_profile("Alice", AgentRole::Participant);
        let trigger = Message::user_text(discussion.id, "hello");
        repo.seed(trigger.clone());

        let provider = ScriptedProvider::new(vec![text_events(&["Hi ", "there!"])]);
        let driver = driver_with(provider, Some(echo_registry()), Arc::clone(&repo));

        let message = driver
            .drive(
                &agent,
                &trigger,
                &discussion,
                &[agent.clone()],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(message.status, MessageStatus::Completed);
        assert_eq!(message.content, "Hi there!");
        assert!(message.tool_calls.is_empty());
        assert_eq!(
            message.segments,
            Some(vec![Segment::Text {
                text: "Hi there!".to_string()
            }])
        );

        // pending -> streaming -> completed, in order, never backward
        assert_eq!(
            repo.status_history(&message.id),
            vec![
                MessageStatus::Pending,
                MessageStatus::Streaming,
                MessageStatus::Completed
            ]
        );

        // The persisted record matches what the driver returned.
        let stored = repo.get(&message.id).await.unwrap().unwrap();
        assert_eq!(stored, message);
    }

    #[tokio::test]
    async fn partial_content_is_persisted_per_delta() {
        let repo = MemoryMessages::new();
        let discussion = discussion_with(ToolAccess::Disabled, 3);
        let agent = member_profile("Alice", AgentRole::Participant);
        let trigger = Message::user_text(discussion.id, "hello");
        repo.seed(trigger.clone());

        let provider = ScriptedProvider::new(vec![text_events(&["a", "b", "c"])]);
        let driver = driver_with(provider, None, Arc::clone(&repo));

        let message = driver
            .drive(
                &agent,
                &trigger,
                &discussion,
                &[agent.clone()],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(repo.content_history(&message.id), vec!["a", "ab", "abc", "abc"]);
    }

    #[tokio::test]
    async fn tool_loop_runs_exactly_max_rounds() {
        let repo = MemoryMessages::new();
        let discussion = discussion_with(ToolAccess::All, 3);
        let agent = member_profile("Alice", AgentRole::Participant);
        let trigger = Message::user_text(discussion.id, "dig in");
        repo.seed(trigger.clone());

        // Every model turn requests one tool call; the driver must stop
        // after exactly max_tool_rounds model turns.
        let provider = ScriptedProvider::new(vec![
            tool_events(&["checking"], vec![tool_call("c1", "echo", r#"{"n":1}"#)]),
            tool_events(&[], vec![tool_call("c2", "echo", r#"{"n":2}"#)]),
            tool_events(&["done"], vec![tool_call("c3", "echo", r#"{"n":3}"#)]),
            // A fourth turn would be a bug.
            text_events(&["never reached"]),
        ]);
        let call_log = provider.calls();
        let driver = driver_with(provider, Some(echo_registry()), Arc::clone(&repo));

        let message = driver
            .drive(
                &agent,
                &trigger,
                &discussion,
                &[agent.clone()],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(call_log.lock().unwrap().len(), 3);
        assert_eq!(message.status, MessageStatus::Completed);
        // The final message keeps its uninterpreted call.
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].id, "c3");
        // Tool results were recorded only for the executed rounds.
        let results = repo.tool_results();
        let executed: Vec<&str> = results.iter().map(|r| r.tool_call_id.as_str()).collect();
        assert_eq!(executed, vec!["c1", "c2"]);
    }

    #[tokio::test]
    async fn tool_results_feed_next_round_prompt() {
        let repo = MemoryMessages::new();
        let discussion = discussion_with(ToolAccess::All, 3);
        let agent = member_profile("Alice", AgentRole::Participant);
        let trigger = Message::user_text(discussion.id, "look this up");
        repo.seed(trigger.clone());

        let provider = ScriptedProvider::new(vec![
            tool_events(&["Let me check."], vec![tool_call("c1", "echo", r#"{"q":"x"}"#)]),
            text_events(&["Found it."]),
        ]);
        let call_log = provider.calls();
        let driver = driver_with(provider, Some(echo_registry()), Arc::clone(&repo));

        driver
            .drive(
                &agent,
                &trigger,
                &discussion,
                &[agent.clone()],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let calls = call_log.lock().unwrap();
        assert_eq!(calls.len(), 2);
        // Second request carries the assistant tool-call turn and the result.
        let second = &calls[1];
        let rendered: Vec<&str> = second.turns.iter().map(|t| t.content.as_str()).collect();
        assert!(rendered.iter().any(|c| c.contains("[tool call c1: echo")));
        assert!(rendered.iter().any(|c| c.contains(r#"{"q":"x"}"#)));
    }

    #[tokio::test]
    async fn failing_tool_is_captured_without_aborting_siblings() {
        let repo = MemoryMessages::new();
        let discussion = discussion_with(ToolAccess::All, 3);
        let agent = member_profile("Alice", AgentRole::Participant);
        let trigger = Message::user_text(discussion.id, "run both");
        repo.seed(trigger.clone());

        let mut registry = echo_registry();
        registry.register(
            ToolSpec {
                name: "explode".to_string(),
                description: "always fails".to_string(),
                parameters: json!({"type": "object"}),
            },
            |_args| async move {
                Err(ToolError::Execution {
                    tool: "explode".to_string(),
                    message: "boom".to_string(),
                })
            },
        );

        let provider = ScriptedProvider::new(vec![
            tool_events(
                &[],
                vec![
                    tool_call("c1", "explode", "{}"),
                    tool_call("c2", "echo", r#"{"ok":true}"#),
                ],
            ),
            text_events(&["recovered"]),
        ]);
        let driver = driver_with(provider, Some(registry), Arc::clone(&repo));

        let message = driver
            .drive(
                &agent,
                &trigger,
                &discussion,
                &[agent.clone()],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(message.status, MessageStatus::Completed);
        assert_eq!(message.content, "recovered");

        let results = repo.tool_results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, ToolResultStatus::Error);
        assert_eq!(results[0].error.as_deref(), Some("tool 'explode' failed: boom"));
        assert_eq!(results[1].status, ToolResultStatus::Success);
        assert_eq!(results[1].result, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn invalid_call_arguments_become_error_result() {
        let repo = MemoryMessages::new();
        let discussion = discussion_with(ToolAccess::All, 3);
        let agent = member_profile("Alice", AgentRole::Participant);
        let trigger = Message::user_text(discussion.id, "go");
        repo.seed(trigger.clone());

        let provider = ScriptedProvider::new(vec![
            tool_events(&[], vec![tool_call("c1", "echo", "not json")]),
            text_events(&["moving on"]),
        ]);
        let driver = driver_with(provider, Some(echo_registry()), Arc::clone(&repo));

        driver
            .drive(
                &agent,
                &trigger,
                &discussion,
                &[agent.clone()],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let results = repo.tool_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ToolResultStatus::Error);
    }

    #[tokio::test]
    async fn tool_calls_ignored_when_permission_disabled() {
        let repo = MemoryMessages::new();
        let discussion = discussion_with(ToolAccess::Disabled, 3);
        let agent = member_profile("Alice", AgentRole::Participant);
        let trigger = Message::user_text(discussion.id, "try tools");
        repo.seed(trigger.clone());

        let provider = ScriptedProvider::new(vec![tool_events(
            &["I would call a tool"],
            vec![tool_call("c1", "echo", "{}")],
        )]);
        let call_log = provider.calls();
        let driver = driver_with(provider, Some(echo_registry()), Arc::clone(&repo));

        let message = driver
            .drive(
                &agent,
                &trigger,
                &discussion,
                &[agent.clone()],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        // One model turn, no tools offered, no execution; the call stays
        // recorded on the message.
        assert_eq!(call_log.lock().unwrap().len(), 1);
        assert!(call_log.lock().unwrap()[0].tools.is_empty());
        assert_eq!(message.tool_calls.len(), 1);
        assert!(repo.tool_results().is_empty());
    }

    #[tokio::test]
    async fn moderator_only_access_blocks_participants() {
        let repo = MemoryMessages::new();
        let discussion = discussion_with(ToolAccess::ModeratorOnly, 3);
        let agent = member_profile("Alice", AgentRole::Participant);
        let trigger = Message::user_text(discussion.id, "hi");
        repo.seed(trigger.clone());

        let provider = ScriptedProvider::new(vec![text_events(&["plain answer"])]);
        let call_log = provider.calls();
        let driver = driver_with(provider, Some(echo_registry()), Arc::clone(&repo));

        driver
            .drive(
                &agent,
                &trigger,
                &discussion,
                &[agent.clone()],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(call_log.lock().unwrap()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn stream_error_marks_message_error() {
        let repo = MemoryMessages::new();
        let discussion = discussion_with(ToolAccess::All, 3);
        let agent = member_profile("Alice", AgentRole::Participant);
        let trigger = Message::user_text(discussion.id, "hello");
        repo.seed(trigger.clone());

        let provider = ScriptedProvider::new(vec![vec![
            Ok(StreamEvent::TextDelta {
                text: "par".to_string(),
            }),
            Err(LlmError::Stream("connection reset".to_string())),
        ]]);
        let driver = driver_with(provider, None, Arc::clone(&repo));

        let error = driver
            .drive(
                &agent,
                &trigger,
                &discussion,
                &[agent.clone()],
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, TurnError::Stream(_)));

        let errored = repo
            .all()
            .into_iter()
            .find(|m| m.status == MessageStatus::Error)
            .expect("an error message");
        // Partial content survives on the error-status message.
        assert_eq!(errored.content, "par");
        assert_eq!(
            repo.status_history(&errored.id),
            vec![
                MessageStatus::Pending,
                MessageStatus::Streaming,
                MessageStatus::Error
            ]
        );
    }

    #[tokio::test]
    async fn cancellation_marks_message_error() {
        let repo = MemoryMessages::new();
        let discussion = discussion_with(ToolAccess::All, 3);
        let agent = member_profile("Alice", AgentRole::Participant);
        let trigger = Message::user_text(discussion.id, "hello");
        repo.seed(trigger.clone());

        let cancel = CancellationToken::new();
        cancel.cancel();

        let provider = ScriptedProvider::new(vec![text_events(&["never seen"])]);
        let driver = driver_with(provider, None, Arc::clone(&repo));

        let error = driver
            .drive(&agent, &trigger, &discussion, &[agent.clone()], cancel)
            .await
            .unwrap_err();
        assert!(matches!(error, TurnError::Cancelled));

        let errored = repo
            .all()
            .into_iter()
            .find(|m| m.author == Author::Agent { id: agent.id })
            .expect("the opened message");
        assert_eq!(errored.status, MessageStatus::Error);
    }
}
