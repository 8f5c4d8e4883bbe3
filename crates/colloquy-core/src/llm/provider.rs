//! CompletionProvider trait definition.
//!
//! The chat-completion capability consumed by the turn driver:
//! `stream(request)` yields text deltas and tool-call events, terminating
//! normally or with an error. The trait is object-safe (the stream is
//! boxed), so implementations are held behind `Arc<dyn CompletionProvider>`
//! for runtime dispatch.

use std::pin::Pin;

use futures_util::Stream;

use colloquy_types::llm::{CompletionRequest, LlmError, StreamEvent};

/// A boxed stream of completion events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for chat-completion backends.
///
/// Implementations live in the host application (Anthropic, OpenAI, local
/// models, ...). A model turn ends either content-only or with one
/// `ToolCalls` event carrying the complete call set.
pub trait CompletionProvider: Send + Sync {
    /// Human-readable provider name (e.g., "anthropic", "openai").
    fn name(&self) -> &str;

    /// Open a streaming completion for `request`.
    fn stream(&self, request: CompletionRequest) -> EventStream;
}
