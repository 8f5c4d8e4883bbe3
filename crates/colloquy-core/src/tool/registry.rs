//! In-process tool registry.
//!
//! The default `ToolExecutor` implementation: tools register a spec and an
//! async handler, and calls are dispatched by name. Registration order is
//! preserved in `specs()` so the model sees a stable tool list.

use std::future::Future;
use std::pin::Pin;

use tracing::debug;

use colloquy_types::error::ToolError;
use colloquy_types::llm::ToolSpec;

use super::executor::ToolExecutor;

type ToolHandler = Box<
    dyn Fn(
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send>>
        + Send
        + Sync,
>;

struct RegisteredTool {
    spec: ToolSpec,
    handler: ToolHandler,
}

/// Name-indexed collection of callable tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its spec name. A later registration with the
    /// same name replaces the earlier one.
    pub fn register<F, Fut>(&mut self, spec: ToolSpec, handler: F)
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
    {
        self.tools.retain(|t| t.spec.name != spec.name);
        debug!(tool = %spec.name, "tool registered");
        self.tools.push(RegisteredTool {
            spec,
            handler: Box::new(move |args| Box::pin(handler(args))),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl ToolExecutor for ToolRegistry {
    fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec.clone()).collect()
    }

    async fn execute(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.spec.name == name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        (tool.handler)(args.clone()).await
    }
}
