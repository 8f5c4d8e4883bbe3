//! Chat-completion capability port.
//!
//! `CompletionProvider` is the narrow contract the host's provider adapter
//! implements; the core never sees a wire format.

pub mod provider;

pub use provider::{CompletionProvider, EventStream};
