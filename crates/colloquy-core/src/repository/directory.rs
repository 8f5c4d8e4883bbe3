//! DirectoryRepository trait definition.
//!
//! Read-only port over the externally owned discussion record, its member
//! roster, and the agent catalog. The scheduler snapshots these at the
//! start of every turn and never re-reads them mid-turn.

use colloquy_types::agent::{AgentProfile, Member};
use colloquy_types::discussion::{Discussion, DiscussionId};
use colloquy_types::error::RepositoryError;

/// Repository trait for discussion, membership, and agent lookups.
pub trait DirectoryRepository: Send + Sync {
    /// Get a discussion by its unique ID.
    fn discussion(
        &self,
        id: &DiscussionId,
    ) -> impl std::future::Future<Output = Result<Option<Discussion>, RepositoryError>> + Send;

    /// Members of a discussion in list order (rotation order).
    fn members(
        &self,
        discussion_id: &DiscussionId,
    ) -> impl std::future::Future<Output = Result<Vec<Member>, RepositoryError>> + Send;

    /// The full agent catalog.
    fn agents(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<AgentProfile>, RepositoryError>> + Send;
}
