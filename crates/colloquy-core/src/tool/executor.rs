//! ToolExecutor port with an object-safe dynamic dispatch wrapper.
//!
//! Follows the blanket-impl pattern:
//! 1. Define an object-safe `ToolExecutorDyn` trait with boxed futures
//! 2. Blanket-impl `ToolExecutorDyn` for all `T: ToolExecutor`
//! 3. `BoxToolExecutor` wraps `Box<dyn ToolExecutorDyn>` and delegates

use std::future::Future;
use std::pin::Pin;

use colloquy_types::error::ToolError;
use colloquy_types::llm::ToolSpec;

/// Trait for tool execution backends.
///
/// Uses native async fn in traits (RPITIT). A failing call is reported
/// through `ToolError`; the driver records it as a per-call error result
/// and continues with sibling calls.
pub trait ToolExecutor: Send + Sync {
    /// Specs of every callable tool, offered to the model when permitted.
    fn specs(&self) -> Vec<ToolSpec>;

    /// Execute a tool by name with parsed JSON arguments.
    fn execute(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> impl Future<Output = Result<serde_json::Value, ToolError>> + Send;
}

/// Object-safe version of [`ToolExecutor`] with boxed futures.
///
/// This trait exists solely to enable dynamic dispatch; a blanket
/// implementation is provided for all types implementing `ToolExecutor`.
pub trait ToolExecutorDyn: Send + Sync {
    fn specs(&self) -> Vec<ToolSpec>;

    fn execute_boxed<'a>(
        &'a self,
        name: &'a str,
        args: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + 'a>>;
}

/// Blanket implementation: any `ToolExecutor` automatically implements `ToolExecutorDyn`.
impl<T: ToolExecutor> ToolExecutorDyn for T {
    fn specs(&self) -> Vec<ToolSpec> {
        ToolExecutor::specs(self)
    }

    fn execute_boxed<'a>(
        &'a self,
        name: &'a str,
        args: &'a serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send + 'a>> {
        Box::pin(self.execute(name, args))
    }
}

/// Type-erased tool executor for runtime dispatch.
///
/// Since `ToolExecutor` uses RPITIT, it cannot be used as a trait object
/// directly. `BoxToolExecutor` provides equivalent methods that delegate
/// to the inner `ToolExecutorDyn` trait object.
pub struct BoxToolExecutor {
    inner: Box<dyn ToolExecutorDyn + Send + Sync>,
}

impl BoxToolExecutor {
    /// Wrap a concrete `ToolExecutor` in a type-erased box.
    pub fn new<T: ToolExecutor + 'static>(executor: T) -> Self {
        Self {
            inner: Box::new(executor),
        }
    }

    /// Specs of every callable tool.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.inner.specs()
    }

    /// Execute a tool by name with parsed JSON arguments.
    pub async fn execute(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        self.inner.execute_boxed(name, args).await
    }
}
