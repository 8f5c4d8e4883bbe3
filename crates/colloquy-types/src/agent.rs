//! Agent, membership, and authorship types for Colloquy.
//!
//! An agent profile is an externally owned persona definition; a member
//! pairs an agent with the current discussion and carries its rotation
//! eligibility. `Author` identifies who produced a message.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

/// Unique identifier for an agent, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Create a new AgentId using UUID v7 (time-sortable, guaranteed ordering).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create an AgentId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AgentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Conversational role of an agent within a discussion.
///
/// - Moderator: steers the conversation; fallback speaker for user
///   messages when no auto-reply member exists
/// - Participant: a regular contributor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Moderator,
    Participant,
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentRole::Moderator => write!(f, "moderator"),
            AgentRole::Participant => write!(f, "participant"),
        }
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "moderator" => Ok(AgentRole::Moderator),
            "participant" => Ok(AgentRole::Participant),
            other => Err(format!("invalid agent role: '{other}'")),
        }
    }
}

impl Default for AgentRole {
    fn default() -> Self {
        AgentRole::Participant
    }
}

/// An agent persona as defined by the host application.
///
/// Profiles are immutable for the duration of a turn; the directory port
/// is the source of truth. The free-text persona fields feed the prompt
/// builder; an empty string means unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    /// URL-safe lowercase handle ("research-lead"); preferred mention target.
    pub slug: Option<String>,
    /// Display name shown in transcripts and matched by mentions.
    pub name: String,
    pub role: AgentRole,
    pub personality: String,
    pub expertise: String,
    pub bias: String,
    pub response_style: String,
    /// Standing instruction appended to the agent's system prompt.
    pub directive: Option<String>,
}

impl AgentProfile {
    /// Create a profile with the given display name and role; persona
    /// fields start empty.
    pub fn new(name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            id: AgentId::new(),
            slug: None,
            name: name.into(),
            role,
            personality: String::new(),
            expertise: String::new(),
            bias: String::new(),
            response_style: String::new(),
            directive: None,
        }
    }
}

/// Membership of an agent in the current discussion.
///
/// Lifecycle is bound to the discussion; the host adds and removes
/// members through its own storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub agent_id: AgentId,
    /// Whether the agent participates in automatic rotation without being
    /// explicitly mentioned.
    pub auto_reply: bool,
}

/// Who produced a message: the human participant or one of the agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Author {
    User,
    Agent { id: AgentId },
}

impl Author {
    /// The agent id when the author is an agent.
    pub fn agent_id(&self) -> Option<AgentId> {
        match self {
            Author::User => None,
            Author::Agent { id } => Some(*id),
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Author::User)
    }
}
