//! Event types for the Colloquy discussion event bus.
//!
//! `DiscussionEvent` is the unified event type broadcast during turn
//! execution. All variants are Clone + Send + Sync for use with tokio
//! broadcast channels; observers (UI, logging) consume them without
//! polling.

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::discussion::{DiscussionId, SpeakReason};
use crate::message::{MessageId, MessageStatus};

/// Events emitted during discussion orchestration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiscussionEvent {
    /// The selector granted the next turn to an agent.
    SpeakerSelected {
        discussion_id: DiscussionId,
        agent_id: AgentId,
        reason: SpeakReason,
        priority: u8,
    },

    /// A streaming turn has started for an agent.
    TurnStarted {
        discussion_id: DiscussionId,
        agent_id: AgentId,
        trigger_message_id: MessageId,
    },

    /// The turn produced a final message.
    TurnCompleted {
        discussion_id: DiscussionId,
        agent_id: AgentId,
        message_id: MessageId,
    },

    /// The turn failed; the partial message carries `Error` status.
    TurnFailed {
        discussion_id: DiscussionId,
        agent_id: AgentId,
        error: String,
    },

    /// A new message record was created.
    MessageCreated {
        discussion_id: DiscussionId,
        message_id: MessageId,
    },

    /// A streaming content delta was appended to a message.
    MessageTextDelta { message_id: MessageId, text: String },

    /// A message reached a terminal status.
    MessageCompleted {
        message_id: MessageId,
        status: MessageStatus,
    },

    /// A tool call began executing.
    ToolCallStarted {
        message_id: MessageId,
        tool_call_id: String,
        tool_name: String,
        round: u8,
    },

    /// A tool call finished, successfully or not.
    ToolCallFinished {
        message_id: MessageId,
        tool_call_id: String,
        success: bool,
    },

    /// A debounced mention resolved and committed, exactly once per
    /// (message, target) pair.
    MentionCommitted {
        message_id: MessageId,
        target: AgentId,
    },

    /// The scheduler activated turn-taking for a discussion.
    DiscussionActivated { discussion_id: DiscussionId },

    /// The scheduler suspended turn-taking; history stays intact.
    DiscussionPaused { discussion_id: DiscussionId },
}
