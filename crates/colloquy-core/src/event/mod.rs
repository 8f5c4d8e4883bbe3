//! Event bus for discussion orchestration.
//!
//! Provides an `EventBus` that distributes `DiscussionEvent` messages to
//! all subscribers via a `tokio::sync::broadcast` channel.

pub mod bus;

pub use bus::EventBus;
