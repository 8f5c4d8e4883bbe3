//! Mention detection and debounced commit.
//!
//! `scanner` is the pure text-analysis half: it finds `@name` tokens in a
//! (possibly partial) message body and resolves them against the current
//! members. `gate` adds the streaming debounce that commits each
//! (message, target) pair exactly once over the message's lifetime.

pub mod gate;
pub mod scanner;

pub use gate::{FINAL_DEBOUNCE, MentionCommit, MentionGate, STREAMING_DEBOUNCE};
pub use scanner::scan_mentions;
