//! Discussion control state machine.
//!
//! The entry point for every produced message and the exit point that
//! triggers the next turn. Holds the current discussion, guards against
//! concurrent turns, and runs the turn chain until the selector yields no
//! speaker and the pending queue is drained.
//!
//! Concurrency contract: a second `on_message` arriving while a turn is in
//! flight is queued FIFO; the running chain keeps following the
//! just-produced final message and takes queued messages as the next
//! trigger when the chain would otherwise end. There is never more than
//! one driver running against the discussion.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use colloquy_types::agent::{AgentId, AgentProfile, Member};
use colloquy_types::discussion::DiscussionId;
use colloquy_types::error::RepositoryError;
use colloquy_types::event::DiscussionEvent;
use colloquy_types::message::Message;

use crate::event::EventBus;
use crate::mention::MentionGate;
use crate::mention::scanner::scan_mentions;
use crate::repository::{DirectoryRepository, MessageRepository};
use crate::scheduler::selector::{member_profiles, next_speaker};
use crate::turn::driver::{TurnDriver, TurnError};

/// Scheduling state of the control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPhase {
    /// No current discussion.
    Idle,
    /// Accepting new turns.
    Active,
    /// Turns suspended; history intact.
    Paused,
}

/// Errors from control operations.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("no current discussion")]
    NoCurrentDiscussion,

    #[error("discussion not found")]
    DiscussionNotFound,

    #[error("agent '{0}' not in catalog")]
    UnknownAgent(AgentId),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Turn(#[from] TurnError),
}

struct ControlState {
    phase: ControlPhase,
    current: Option<DiscussionId>,
    queue: VecDeque<Message>,
    turn_in_flight: bool,
    cancel: Option<CancellationToken>,
}

/// The discussion scheduler.
///
/// Constructed once at the composition root and shared (`Arc`) with every
/// caller; there is no module-level singleton.
pub struct DiscussionControl<R, D> {
    messages: Arc<R>,
    directory: Arc<D>,
    driver: TurnDriver<R>,
    gate: MentionGate,
    bus: EventBus,
    state: Mutex<ControlState>,
}

impl<R: MessageRepository, D: DirectoryRepository> DiscussionControl<R, D> {
    pub fn new(
        messages: Arc<R>,
        directory: Arc<D>,
        driver: TurnDriver<R>,
        gate: MentionGate,
        bus: EventBus,
    ) -> Self {
        Self {
            messages,
            directory,
            driver,
            gate,
            bus,
            state: Mutex::new(ControlState {
                phase: ControlPhase::Idle,
                current: None,
                queue: VecDeque::new(),
                turn_in_flight: false,
                cancel: None,
            }),
        }
    }

    pub async fn phase(&self) -> ControlPhase {
        self.state.lock().await.phase
    }

    pub async fn current_discussion(&self) -> Option<DiscussionId> {
        self.state.lock().await.current
    }

    /// Switch the scheduler to another discussion (or none).
    ///
    /// Cancels any in-flight turn, clears the pending queue, then
    /// re-evaluates eligibility for the new discussion. Returns the
    /// resulting phase.
    pub async fn set_current_discussion(
        &self,
        id: Option<DiscussionId>,
    ) -> Result<ControlPhase, ControlError> {
        {
            let mut state = self.state.lock().await;
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
            }
            state.queue.clear();
            state.current = id;
            state.phase = ControlPhase::Idle;
        }

        match id {
            None => Ok(ControlPhase::Idle),
            Some(_) => {
                let phase = if self.start_if_eligible().await? {
                    ControlPhase::Active
                } else {
                    let mut state = self.state.lock().await;
                    state.phase = ControlPhase::Paused;
                    ControlPhase::Paused
                };
                Ok(phase)
            }
        }
    }

    /// Suspend turn scheduling unconditionally. Queued triggers stay
    /// recorded but are not processed until reactivation.
    pub async fn pause(&self) {
        let mut state = self.state.lock().await;
        if state.phase != ControlPhase::Active {
            return;
        }
        state.phase = ControlPhase::Paused;
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        if let Some(id) = state.current {
            self.bus
                .publish(DiscussionEvent::DiscussionPaused { discussion_id: id });
            info!(discussion = %id, "discussion paused");
        }
    }

    /// Activate scheduling when the discussion can actually produce a
    /// turn: at least one auto-reply member, or a resolvable mention in
    /// the latest persisted message. Returns whether activation happened.
    pub async fn start_if_eligible(&self) -> Result<bool, ControlError> {
        let current = self
            .state
            .lock()
            .await
            .current
            .ok_or(ControlError::NoCurrentDiscussion)?;

        let members = self.directory.members(&current).await?;
        let agents = self.directory.agents().await?;

        let eligible = members.iter().any(|m| m.auto_reply)
            || self.latest_has_mention(&current, &members, &agents).await?;

        if eligible {
            let mut state = self.state.lock().await;
            state.phase = ControlPhase::Active;
            self.bus.publish(DiscussionEvent::DiscussionActivated {
                discussion_id: current,
            });
            info!(discussion = %current, "discussion activated");
        } else {
            debug!(discussion = %current, "discussion not eligible for activation");
        }
        Ok(eligible)
    }

    async fn latest_has_mention(
        &self,
        discussion_id: &DiscussionId,
        members: &[Member],
        agents: &[AgentProfile],
    ) -> Result<bool, ControlError> {
        let history = self.messages.list(discussion_id).await?;
        let Some(latest) = history.last() else {
            return Ok(false);
        };
        let candidates = member_profiles(members, agents);
        Ok(!scan_mentions(&latest.content, &latest.author, &candidates).is_empty())
    }

    /// Handle a newly persisted message.
    ///
    /// Returns immediately when the scheduler is not active or the message
    /// belongs to another discussion (the message stays recorded, no turn
    /// is scheduled). Queues the message when a turn is already in flight;
    /// otherwise runs the turn chain to quiescence.
    pub async fn on_message(&self, message: Message) -> Result<(), ControlError> {
        {
            let mut state = self.state.lock().await;
            let Some(current) = state.current else {
                return Ok(());
            };
            if message.discussion_id != current {
                return Ok(());
            }
            if state.phase != ControlPhase::Active {
                debug!(message_id = %message.id, "scheduler not active, message recorded without a turn");
                return Ok(());
            }
            if state.turn_in_flight {
                debug!(message_id = %message.id, "turn in flight, queueing trigger");
                state.queue.push_back(message);
                return Ok(());
            }
            state.turn_in_flight = true;
        }

        let result = self.run_chain(message).await;
        self.state.lock().await.turn_in_flight = false;
        result
    }

    /// Run turns until the selector yields no speaker and the queue is
    /// empty, or the scheduler leaves the `Active` phase.
    async fn run_chain(&self, first_trigger: Message) -> Result<(), ControlError> {
        let mut trigger = first_trigger;

        loop {
            let current = {
                let state = self.state.lock().await;
                if state.phase != ControlPhase::Active {
                    break;
                }
                match state.current {
                    Some(id) if id == trigger.discussion_id => id,
                    _ => break,
                }
            };

            // Roster snapshot: read once per turn, never re-read mid-turn.
            let discussion = self
                .directory
                .discussion(&current)
                .await?
                .ok_or(ControlError::DiscussionNotFound)?;
            let members = self.directory.members(&current).await?;
            let agents = self.directory.agents().await?;

            // Surface mention commits for final user messages.
            if trigger.author.is_user() {
                let candidates = member_profiles(&members, &agents);
                self.gate
                    .observe(trigger.id, &trigger.author, &trigger.content, false, &candidates);
            }

            let Some(request) = next_speaker(&trigger, &members, &agents) else {
                match self.pop_queued().await {
                    Some(queued) => {
                        trigger = queued;
                        continue;
                    }
                    None => break,
                }
            };
            self.bus.publish(DiscussionEvent::SpeakerSelected {
                discussion_id: current,
                agent_id: request.agent_id,
                reason: request.reason,
                priority: request.priority,
            });

            let agent = agents
                .iter()
                .find(|a| a.id == request.agent_id)
                .cloned()
                .ok_or(ControlError::UnknownAgent(request.agent_id))?;

            if discussion.settings.turn_interval_ms > 0 {
                tokio::time::sleep(Duration::from_millis(discussion.settings.turn_interval_ms))
                    .await;
                if self.state.lock().await.phase != ControlPhase::Active {
                    break;
                }
            }

            let roster = member_profiles(&members, &agents);
            let cancel = CancellationToken::new();
            self.state.lock().await.cancel = Some(cancel.clone());
            self.bus.publish(DiscussionEvent::TurnStarted {
                discussion_id: current,
                agent_id: agent.id,
                trigger_message_id: trigger.id,
            });

            let outcome = self
                .driver
                .drive(&agent, &trigger, &discussion, &roster, cancel)
                .await;
            self.state.lock().await.cancel = None;

            match outcome {
                Ok(final_message) => {
                    self.bus.publish(DiscussionEvent::TurnCompleted {
                        discussion_id: current,
                        agent_id: agent.id,
                        message_id: final_message.id,
                    });
                    trigger = final_message;
                }
                Err(TurnError::Cancelled) => {
                    debug!(discussion = %current, "turn cancelled, ending chain");
                    break;
                }
                Err(error) => {
                    self.bus.publish(DiscussionEvent::TurnFailed {
                        discussion_id: current,
                        agent_id: agent.id,
                        error: error.to_string(),
                    });
                    warn!(error = %error, "turn failed, ending chain");
                    let dropped = {
                        let mut state = self.state.lock().await;
                        let dropped = state.queue.len();
                        state.queue.clear();
                        dropped
                    };
                    if dropped > 0 {
                        debug!(dropped, "dropped queued triggers after turn failure");
                    }
                    return Err(error.into());
                }
            }
        }

        Ok(())
    }

    async fn pop_queued(&self) -> Option<Message> {
        self.state.lock().await.queue.pop_front()
    }
}
