//! Shared domain types for Colloquy.
//!
//! This crate contains the core domain types used across the Colloquy
//! discussion-orchestration core: agents and members, discussions,
//! messages with their segments and tool calls, LLM request/stream shapes,
//! and the discussion event vocabulary.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod agent;
pub mod discussion;
pub mod error;
pub mod event;
pub mod llm;
pub mod message;
