//! Tool execution capability.
//!
//! `ToolExecutor` is the port the turn driver calls into;
//! `BoxToolExecutor` erases it for runtime dispatch; `ToolRegistry` is the
//! default in-process implementation dispatching by tool name.

pub mod executor;
pub mod registry;

pub use executor::{BoxToolExecutor, ToolExecutor, ToolExecutorDyn};
pub use registry::ToolRegistry;
