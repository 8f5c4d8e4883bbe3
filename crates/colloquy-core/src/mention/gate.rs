//! Debounced exactly-once mention commits.
//!
//! While a message streams, its text keeps changing under the scanner: a
//! target resolved from a partial ("@Bob" on the way to "@Bobby") must not
//! fire immediately. The gate therefore schedules a debounce timer per
//! (message, target) pair and only commits a pair that survives the window
//! unchanged. Pairs that disappear from the latest scan are cancelled, and
//! a committed pair never fires again for the same message.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use tracing::debug;

use colloquy_types::agent::{AgentId, AgentProfile, Author};
use colloquy_types::event::DiscussionEvent;
use colloquy_types::message::MessageId;

use crate::event::EventBus;
use crate::mention::scanner::scan_mentions;

/// Debounce window applied while the message is still streaming.
pub const STREAMING_DEBOUNCE: Duration = Duration::from_millis(500);

/// Debounce window applied once the message text is final.
pub const FINAL_DEBOUNCE: Duration = Duration::from_millis(100);

/// A committed mention, delivered to the host through the commit channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MentionCommit {
    pub message_id: MessageId,
    pub target: AgentId,
}

struct GateInner {
    /// Latest debounce generation per pending (message, target) pair. A
    /// timer only commits when its generation is still the pair's latest.
    pending: DashMap<(MessageId, AgentId), u64>,
    /// Pairs that have already committed for their message's lifetime.
    committed: DashSet<(MessageId, AgentId)>,
    generation: AtomicU64,
    commits: mpsc::UnboundedSender<MentionCommit>,
    bus: EventBus,
}

impl GateInner {
    fn commit_if_current(&self, key: (MessageId, AgentId), generation: u64) {
        if self
            .pending
            .remove_if(&key, |_, current| *current == generation)
            .is_none()
        {
            return;
        }
        if !self.committed.insert(key) {
            return;
        }
        let (message_id, target) = key;
        debug!(message_id = %message_id, target = %target, "mention committed");
        self.bus.publish(DiscussionEvent::MentionCommitted {
            message_id,
            target,
        });
        let _ = self.commits.send(MentionCommit { message_id, target });
    }
}

/// Debounce gate over mention scans of one discussion's messages.
///
/// Cloneable and shareable; the turn driver feeds it streaming partials
/// and the control feeds it final user messages.
#[derive(Clone)]
pub struct MentionGate {
    inner: Arc<GateInner>,
}

impl MentionGate {
    /// Create a gate publishing `MentionCommitted` events to `bus`.
    /// Returns the gate and the receiving end of the commit channel.
    pub fn new(bus: EventBus) -> (Self, mpsc::UnboundedReceiver<MentionCommit>) {
        let (commits, rx) = mpsc::unbounded_channel();
        let gate = Self {
            inner: Arc::new(GateInner {
                pending: DashMap::new(),
                committed: DashSet::new(),
                generation: AtomicU64::new(0),
                commits,
                bus,
            }),
        };
        (gate, rx)
    }

    /// Re-scan the latest text of a message and reschedule debounce timers.
    ///
    /// Pairs present in the scan get a fresh timer, replacing any pending
    /// one; pending pairs for this message that are absent from the scan
    /// are cancelled. Already committed pairs are ignored.
    pub fn observe(
        &self,
        message_id: MessageId,
        author: &Author,
        text: &str,
        is_streaming: bool,
        candidates: &[AgentProfile],
    ) {
        let targets = scan_mentions(text, author, candidates);

        self.inner
            .pending
            .retain(|(mid, target), _| *mid != message_id || targets.contains(target));

        let delay = if is_streaming {
            STREAMING_DEBOUNCE
        } else {
            FINAL_DEBOUNCE
        };

        for target in targets {
            let key = (message_id, target);
            if self.inner.committed.contains(&key) {
                continue;
            }
            let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
            self.inner.pending.insert(key, generation);

            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                inner.commit_if_current(key, generation);
            });
        }
    }

    /// Whether the (message, target) pair has already committed.
    pub fn is_committed(&self, message_id: &MessageId, target: &AgentId) -> bool {
        self.inner.committed.contains(&(*message_id, *target))
    }

    /// Drop all pending and committed state for a message.
    pub fn forget(&self, message_id: &MessageId) {
        self.inner.pending.retain(|(mid, _), _| mid != message_id);
        self.inner.committed.retain(|(mid, _)| mid != message_id);
    }
}

impl std::fmt::Debug for MentionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MentionGate")
            .field("pending", &self.inner.pending.len())
            .field("committed", &self.inner.committed.len())
            .finish()
    }
}
