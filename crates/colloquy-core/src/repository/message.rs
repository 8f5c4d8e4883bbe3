//! MessageRepository trait definition.
//!
//! Persistence port for discussion messages and tool results. The driver
//! persists every streaming delta through `update` before requesting the
//! next event, so implementations see partial content grow monotonically.
//! Uses native async fn in traits (RPITIT).

use colloquy_types::discussion::DiscussionId;
use colloquy_types::error::RepositoryError;
use colloquy_types::message::{Message, MessageId, MessagePatch, ToolResultMessage};

/// Repository trait for message and tool-result persistence.
///
/// Implementations live in the host application (SQLite, in-memory, ...).
/// `update` must reject status changes that violate the forward-only
/// lifecycle (`Pending -> Streaming -> {Completed, Error}`).
pub trait MessageRepository: Send + Sync {
    /// Persist a new message.
    fn create(
        &self,
        message: &Message,
    ) -> impl std::future::Future<Output = Result<Message, RepositoryError>> + Send;

    /// Apply a partial update to an existing message, returning the new state.
    fn update(
        &self,
        id: &MessageId,
        patch: &MessagePatch,
    ) -> impl std::future::Future<Output = Result<Message, RepositoryError>> + Send;

    /// Get a message by its unique ID.
    fn get(
        &self,
        id: &MessageId,
    ) -> impl std::future::Future<Output = Result<Option<Message>, RepositoryError>> + Send;

    /// Messages of a discussion in chronological order.
    fn list(
        &self,
        discussion_id: &DiscussionId,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;

    /// Persist a tool execution result.
    fn create_tool_result(
        &self,
        result: &ToolResultMessage,
    ) -> impl std::future::Future<Output = Result<ToolResultMessage, RepositoryError>> + Send;

    /// Tool results whose origin messages belong to a discussion, in
    /// creation order.
    fn list_tool_results(
        &self,
        discussion_id: &DiscussionId,
    ) -> impl std::future::Future<Output = Result<Vec<ToolResultMessage>, RepositoryError>> + Send;
}
