//! Turn scheduling: the next-speaker policy and the discussion state machine.
//!
//! `selector` is a pure function choosing the next speaker for a trigger
//! message; `control` is the re-entrant state machine that owns the turn
//! chain, the concurrency guard, and the pause/activate lifecycle.

pub mod control;
pub mod selector;

pub use control::{ControlError, ControlPhase, DiscussionControl};
pub use selector::{SpeakRequest, next_speaker};
