//! Next-speaker selection policy.
//!
//! A pure function of (triggering message, member list, agent catalog).
//! Mentions strictly dominate rotation; rotation is by member list
//! position, not recency. No speaker is selected -- and the scheduling
//! cycle terminates -- when no rule matches.

use chrono::{DateTime, Utc};

use colloquy_types::agent::{AgentId, AgentProfile, AgentRole, Author, Member};
use colloquy_types::discussion::SpeakReason;
use colloquy_types::message::{Message, MessageId, MessageKind};

use crate::mention::scanner::scan_mentions;

/// An ephemeral request for an agent to take the next turn.
///
/// Never persisted; granting it means the control invokes the turn driver
/// for the agent. Lower `priority` outranks higher when requests compete.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakRequest {
    pub agent_id: AgentId,
    /// The message that prompted this request.
    pub trigger: MessageId,
    pub reason: SpeakReason,
    pub priority: u8,
    pub requested_at: DateTime<Utc>,
}

impl SpeakRequest {
    fn new(agent_id: AgentId, trigger: &Message, reason: SpeakReason) -> Self {
        let priority = match reason {
            SpeakReason::Mention => 0,
            SpeakReason::AutoReply => 1,
            SpeakReason::ModeratorFallback => 2,
            SpeakReason::ListOrder => 3,
        };
        Self {
            agent_id,
            trigger: trigger.id,
            reason,
            priority,
            requested_at: Utc::now(),
        }
    }
}

/// Profiles of the discussion's members, preserving member list order.
pub fn member_profiles(members: &[Member], agents: &[AgentProfile]) -> Vec<AgentProfile> {
    members
        .iter()
        .filter_map(|m| agents.iter().find(|a| a.id == m.agent_id).cloned())
        .collect()
}

/// Select the next speaker for `trigger`, or `None` to end the cycle.
///
/// Policy, in priority order:
/// 1. A resolved mention of a current member speaks next.
/// 2. User trigger: first auto-reply member, else a moderator member,
///    else the first member in list order.
/// 3. Agent trigger: first auto-reply member other than the trigger's
///    author.
pub fn next_speaker(
    trigger: &Message,
    members: &[Member],
    agents: &[AgentProfile],
) -> Option<SpeakRequest> {
    if members.is_empty() {
        return None;
    }

    if trigger.kind == MessageKind::Text {
        let candidates = member_profiles(members, agents);
        if let Some(target) = scan_mentions(&trigger.content, &trigger.author, &candidates)
            .into_iter()
            .next()
        {
            return Some(SpeakRequest::new(target, trigger, SpeakReason::Mention));
        }
    }

    match trigger.author {
        Author::User => {
            if let Some(member) = members.iter().find(|m| m.auto_reply) {
                return Some(SpeakRequest::new(
                    member.agent_id,
                    trigger,
                    SpeakReason::AutoReply,
                ));
            }
            if let Some(member) = members.iter().find(|m| {
                agents
                    .iter()
                    .any(|a| a.id == m.agent_id && a.role == AgentRole::Moderator)
            }) {
                return Some(SpeakRequest::new(
                    member.agent_id,
                    trigger,
                    SpeakReason::ModeratorFallback,
                ));
            }
            members
                .first()
                .map(|m| SpeakRequest::new(m.agent_id, trigger, SpeakReason::ListOrder))
        }
        Author::Agent { id } => members
            .iter()
            .find(|m| m.auto_reply && m.agent_id != id)
            .map(|m| SpeakRequest::new(m.agent_id, trigger, SpeakReason::AutoReply)),
    }
}
