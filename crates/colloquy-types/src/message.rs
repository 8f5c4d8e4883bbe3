//! Message, segment, and tool call/result types for Colloquy.
//!
//! Messages are mutable while streaming and frozen once they reach a
//! terminal status. Tool results are separate records tied to exactly one
//! call inside exactly one origin message; the reorganizer folds them back
//! into display units.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::agent::Author;
use crate::discussion::DiscussionId;

/// Unique identifier for a message, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Create a new MessageId using UUID v7 (time-sortable, guaranteed ordering).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a MessageId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Media kind of a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Video,
}

impl Default for MessageKind {
    fn default() -> Self {
        MessageKind::Text
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::Image => write!(f, "image"),
            MessageKind::Audio => write!(f, "audio"),
            MessageKind::Video => write!(f, "video"),
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "audio" => Ok(MessageKind::Audio),
            "video" => Ok(MessageKind::Video),
            other => Err(format!("invalid message kind: '{other}'")),
        }
    }
}

/// Lifecycle status of a message.
///
/// Transitions only move forward: `Pending -> Streaming -> {Completed, Error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Pending,
    Streaming,
    Completed,
    Error,
}

impl MessageStatus {
    /// Whether a transition to `next` is allowed. Terminal states admit no
    /// further change and status never moves backward.
    pub fn can_transition_to(&self, next: MessageStatus) -> bool {
        matches!(
            (self, next),
            (MessageStatus::Pending, MessageStatus::Streaming)
                | (MessageStatus::Streaming, MessageStatus::Completed)
                | (MessageStatus::Streaming, MessageStatus::Error)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageStatus::Completed | MessageStatus::Error)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageStatus::Pending => write!(f, "pending"),
            MessageStatus::Streaming => write!(f, "streaming"),
            MessageStatus::Completed => write!(f, "completed"),
            MessageStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(MessageStatus::Pending),
            "streaming" => Ok(MessageStatus::Streaming),
            "completed" => Ok(MessageStatus::Completed),
            "error" => Ok(MessageStatus::Error),
            other => Err(format!("invalid message status: '{other}'")),
        }
    }
}

/// A tool invocation requested by the model stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, referenced by the matching tool result.
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object, parsed only at execution time.
    pub arguments: String,
}

/// Outcome of one executed tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultStatus {
    Success,
    Error,
}

impl fmt::Display for ToolResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolResultStatus::Success => write!(f, "success"),
            ToolResultStatus::Error => write!(f, "error"),
        }
    }
}

/// Record of one tool execution.
///
/// Always produced in response to exactly one tool call inside exactly one
/// origin message; `tool_call_id` matches an entry in the origin message's
/// recorded `tool_calls`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultMessage {
    pub id: MessageId,
    pub origin_message_id: MessageId,
    pub tool_call_id: String,
    pub tool_name: String,
    pub status: ToolResultStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

/// An ordered atomic unit of displayable message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Segment {
    Text { text: String },
    ToolCall { call: ToolCall },
}

/// A message within a discussion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub discussion_id: DiscussionId,
    pub author: Author,
    pub kind: MessageKind,
    pub content: String,
    /// Ordered rich segments; `None` for plain-text-only messages.
    pub segments: Option<Vec<Segment>>,
    pub reply_to: Option<MessageId>,
    pub status: MessageStatus,
    /// Tool calls captured from the model stream for this message.
    pub tool_calls: Vec<ToolCall>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Create an empty pending text message, ready for the streaming driver.
    pub fn pending(discussion_id: DiscussionId, author: Author) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            discussion_id,
            author,
            kind: MessageKind::Text,
            content: String::new(),
            segments: None,
            reply_to: None,
            status: MessageStatus::Pending,
            tool_calls: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a completed text message from the human participant.
    pub fn user_text(discussion_id: DiscussionId, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: MessageId::new(),
            discussion_id,
            author: Author::User,
            kind: MessageKind::Text,
            content: content.into(),
            segments: None,
            reply_to: None,
            status: MessageStatus::Completed,
            tool_calls: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update applied through `MessageRepository::update`.
///
/// Absent fields are left untouched; the repository stamps `updated_at`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePatch {
    pub content: Option<String>,
    pub status: Option<MessageStatus>,
    pub segments: Option<Vec<Segment>>,
    pub tool_calls: Option<Vec<ToolCall>>,
}
