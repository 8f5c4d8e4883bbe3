//! Shared test doubles: in-memory repositories, a scripted completion
//! provider, and fixture builders used across the crate's unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_stream::stream;
use chrono::Utc;

use colloquy_types::agent::{AgentProfile, AgentRole, Member};
use colloquy_types::discussion::{Discussion, DiscussionId, ToolAccess};
use colloquy_types::error::RepositoryError;
use colloquy_types::llm::{CompletionRequest, LlmError, StreamEvent};
use colloquy_types::message::{
    Message, MessageId, MessagePatch, MessageStatus, ToolCall, ToolResultMessage,
};

use crate::llm::{CompletionProvider, EventStream};
use crate::repository::{DirectoryRepository, MessageRepository};

// ---------------------------------------------------------------------------
// In-memory message repository
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MessagesInner {
    messages: Vec<Message>,
    tool_results: Vec<ToolResultMessage>,
    status_log: HashMap<MessageId, Vec<MessageStatus>>,
    content_log: HashMap<MessageId, Vec<String>>,
}

/// In-memory message store that records every status and content update a
/// message passes through, for asserting the forward-only lifecycle and
/// delta-by-delta persistence.
#[derive(Default)]
pub struct MemoryMessages {
    inner: Mutex<MessagesInner>,
}

impl MemoryMessages {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert a pre-existing message without driver involvement.
    pub fn seed(&self, message: Message) {
        self.inner.lock().unwrap().messages.push(message);
    }

    pub fn all(&self) -> Vec<Message> {
        self.inner.lock().unwrap().messages.clone()
    }

    pub fn tool_results(&self) -> Vec<ToolResultMessage> {
        self.inner.lock().unwrap().tool_results.clone()
    }

    /// Every status the message has held, in order (creation included).
    pub fn status_history(&self, id: &MessageId) -> Vec<MessageStatus> {
        self.inner
            .lock()
            .unwrap()
            .status_log
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Every content value persisted for the message, in order.
    pub fn content_history(&self, id: &MessageId) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .content_log
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

impl MessageRepository for MemoryMessages {
    async fn create(&self, message: &Message) -> Result<Message, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .status_log
            .entry(message.id)
            .or_default()
            .push(message.status);
        inner.messages.push(message.clone());
        Ok(message.clone())
    }

    async fn update(&self, id: &MessageId, patch: &MessagePatch) -> Result<Message, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let snapshot = {
            let message = inner
                .messages
                .iter_mut()
                .find(|m| m.id == *id)
                .ok_or(RepositoryError::NotFound)?;
            if let Some(status) = patch.status {
                if !message.status.can_transition_to(status) {
                    return Err(RepositoryError::Conflict(format!(
                        "illegal status transition {} -> {}",
                        message.status, status
                    )));
                }
                message.status = status;
            }
            if let Some(content) = &patch.content {
                message.content = content.clone();
            }
            if let Some(segments) = &patch.segments {
                message.segments = Some(segments.clone());
            }
            if let Some(tool_calls) = &patch.tool_calls {
                message.tool_calls = tool_calls.clone();
            }
            message.updated_at = Utc::now();
            message.clone()
        };
        if let Some(status) = patch.status {
            inner.status_log.entry(*id).or_default().push(status);
        }
        if let Some(content) = &patch.content {
            inner.content_log.entry(*id).or_default().push(content.clone());
        }
        Ok(snapshot)
    }

    async fn get(&self, id: &MessageId) -> Result<Option<Message>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .find(|m| m.id == *id)
            .cloned())
    }

    async fn list(&self, discussion_id: &DiscussionId) -> Result<Vec<Message>, RepositoryError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|m| m.discussion_id == *discussion_id)
            .cloned()
            .collect())
    }

    async fn create_tool_result(
        &self,
        result: &ToolResultMessage,
    ) -> Result<ToolResultMessage, RepositoryError> {
        self.inner.lock().unwrap().tool_results.push(result.clone());
        Ok(result.clone())
    }

    async fn list_tool_results(
        &self,
        discussion_id: &DiscussionId,
    ) -> Result<Vec<ToolResultMessage>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        let origin_ids: Vec<MessageId> = inner
            .messages
            .iter()
            .filter(|m| m.discussion_id == *discussion_id)
            .map(|m| m.id)
            .collect();
        Ok(inner
            .tool_results
            .iter()
            .filter(|r| origin_ids.contains(&r.origin_message_id))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// In-memory directory
// ---------------------------------------------------------------------------

/// In-memory discussion/member/agent directory.
#[derive(Default)]
pub struct MemoryDirectory {
    discussion: Mutex<Option<Discussion>>,
    members: Mutex<Vec<Member>>,
    agents: Mutex<Vec<AgentProfile>>,
}

impl MemoryDirectory {
    pub fn set_discussion(&self, discussion: Discussion) {
        *self.discussion.lock().unwrap() = Some(discussion);
    }

    pub fn set_members(&self, members: Vec<Member>) {
        *self.members.lock().unwrap() = members;
    }

    pub fn set_agents(&self, agents: Vec<AgentProfile>) {
        *self.agents.lock().unwrap() = agents;
    }
}

impl DirectoryRepository for MemoryDirectory {
    async fn discussion(&self, id: &DiscussionId) -> Result<Option<Discussion>, RepositoryError> {
        Ok(self
            .discussion
            .lock()
            .unwrap()
            .clone()
            .filter(|d| d.id == *id))
    }

    async fn members(&self, _discussion_id: &DiscussionId) -> Result<Vec<Member>, RepositoryError> {
        Ok(self.members.lock().unwrap().clone())
    }

    async fn agents(&self) -> Result<Vec<AgentProfile>, RepositoryError> {
        Ok(self.agents.lock().unwrap().clone())
    }
}

// ---------------------------------------------------------------------------
// Scripted completion provider
// ---------------------------------------------------------------------------

/// Completion provider replaying scripted event sequences, one per call.
///
/// Requests are recorded for inspection. When the script runs dry, the
/// stream yields a provider error, which fails the turn.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Vec<Result<StreamEvent, LlmError>>>>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Vec<Result<StreamEvent, LlmError>>>) -> Self {
        Self {
            script: Mutex::new(turns.into()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle to the recorded requests.
    pub fn calls(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.calls)
    }
}

impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        self.calls.lock().unwrap().push(request);
        let events = self.script.lock().unwrap().pop_front().unwrap_or_else(|| {
            vec![Err(LlmError::Provider {
                message: "script exhausted".to_string(),
            })]
        });
        Box::pin(stream! {
            for event in events {
                yield event;
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

/// A member-eligible profile with the given display name.
pub fn member_profile(name: &str, role: AgentRole) -> AgentProfile {
    AgentProfile::new(name, role)
}

/// A discussion with the given tool access and round bound.
pub fn discussion_with(tool_access: ToolAccess, max_tool_rounds: u8) -> Discussion {
    let mut discussion = Discussion::new("test discussion");
    discussion.settings.tool_access = tool_access;
    discussion.settings.max_tool_rounds = max_tool_rounds;
    discussion
}

/// A content-only model turn: one delta per chunk, then `Done`.
pub fn text_events(chunks: &[&str]) -> Vec<Result<StreamEvent, LlmError>> {
    let mut events: Vec<Result<StreamEvent, LlmError>> = chunks
        .iter()
        .map(|chunk| {
            Ok(StreamEvent::TextDelta {
                text: (*chunk).to_string(),
            })
        })
        .collect();
    events.push(Ok(StreamEvent::Done));
    events
}

/// A model turn that ends in tool calls after optional content chunks.
pub fn tool_events(
    chunks: &[&str],
    calls: Vec<ToolCall>,
) -> Vec<Result<StreamEvent, LlmError>> {
    let mut events: Vec<Result<StreamEvent, LlmError>> = chunks
        .iter()
        .map(|chunk| {
            Ok(StreamEvent::TextDelta {
                text: (*chunk).to_string(),
            })
        })
        .collect();
    events.push(Ok(StreamEvent::ToolCalls { calls }));
    events.push(Ok(StreamEvent::Done));
    events
}

/// A tool call with JSON-encoded arguments.
pub fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: arguments.to_string(),
    }
}
