//! Persistence and catalog ports implemented by the host application.
//!
//! - `MessageRepository`: message and tool-result storage
//! - `DirectoryRepository`: the externally owned discussion record, member
//!   roster, and agent catalog

pub mod directory;
pub mod message;

pub use directory::DirectoryRepository;
pub use message::MessageRepository;
