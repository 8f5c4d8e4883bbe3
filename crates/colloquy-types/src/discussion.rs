//! Discussion and scheduling types for Colloquy.
//!
//! A discussion is the unit of scheduling: exactly one discussion is
//! "current" at a time. Its settings carry the tunables that the turn
//! driver and scheduler read at the start of every turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::fmt;
use std::str::FromStr;

use crate::agent::AgentRole;

/// Unique identifier for a discussion, wrapping a UUID v7 (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DiscussionId(pub Uuid);

impl DiscussionId {
    /// Create a new DiscussionId using UUID v7 (time-sortable, guaranteed ordering).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create a DiscussionId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for DiscussionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DiscussionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DiscussionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status of a discussion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscussionStatus {
    Active,
    Paused,
    Completed,
}

impl fmt::Display for DiscussionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscussionStatus::Active => write!(f, "active"),
            DiscussionStatus::Paused => write!(f, "paused"),
            DiscussionStatus::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for DiscussionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(DiscussionStatus::Active),
            "paused" => Ok(DiscussionStatus::Paused),
            "completed" => Ok(DiscussionStatus::Completed),
            other => Err(format!("invalid discussion status: '{other}'")),
        }
    }
}

impl Default for DiscussionStatus {
    fn default() -> Self {
        DiscussionStatus::Active
    }
}

/// Which agent roles may call tools during their turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolAccess {
    Disabled,
    ModeratorOnly,
    All,
}

impl ToolAccess {
    /// Whether an agent with `role` is permitted to use tools.
    pub fn allows(&self, role: AgentRole) -> bool {
        match self {
            ToolAccess::Disabled => false,
            ToolAccess::ModeratorOnly => role == AgentRole::Moderator,
            ToolAccess::All => true,
        }
    }
}

impl Default for ToolAccess {
    fn default() -> Self {
        ToolAccess::All
    }
}

/// How strongly the moderator steers the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStyle {
    Flexible,
    Strict,
}

impl fmt::Display for ModerationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModerationStyle::Flexible => write!(f, "flexible"),
            ModerationStyle::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for ModerationStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "flexible" => Ok(ModerationStyle::Flexible),
            "strict" => Ok(ModerationStyle::Strict),
            other => Err(format!("invalid moderation style: '{other}'")),
        }
    }
}

impl Default for ModerationStyle {
    fn default() -> Self {
        ModerationStyle::Flexible
    }
}

/// Tunables owned by the discussion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionSettings {
    /// Maximum model turns inside one logical response (the tool loop bound).
    pub max_tool_rounds: u8,
    pub temperature: f64,
    /// Pause inserted between automatic turns, in milliseconds.
    pub turn_interval_ms: u64,
    pub moderation_style: ModerationStyle,
    /// Whether agents are encouraged to openly disagree with each other.
    pub allow_conflict: bool,
    pub tool_access: ToolAccess,
}

impl Default for DiscussionSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: 3,
            temperature: 0.7,
            turn_interval_ms: 0,
            moderation_style: ModerationStyle::Flexible,
            allow_conflict: true,
            tool_access: ToolAccess::All,
        }
    }
}

/// A group discussion: the unit of scheduling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discussion {
    pub id: DiscussionId,
    pub title: String,
    pub status: DiscussionStatus,
    pub settings: DiscussionSettings,
    /// Cache of the latest message, maintained by the host for list views.
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_message_preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Discussion {
    /// Create an active discussion with default settings.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: DiscussionId::new(),
            title: title.into(),
            status: DiscussionStatus::Active,
            settings: DiscussionSettings::default(),
            last_message_at: None,
            last_message_preview: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Why a speaker was granted the next turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakReason {
    /// Explicitly addressed with an `@` mention.
    Mention,
    /// Next auto-reply member in rotation.
    AutoReply,
    /// No auto-reply member; a moderator answers the user.
    ModeratorFallback,
    /// Last resort for user messages: first member in list order.
    ListOrder,
}

impl fmt::Display for SpeakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeakReason::Mention => write!(f, "mention"),
            SpeakReason::AutoReply => write!(f, "auto_reply"),
            SpeakReason::ModeratorFallback => write!(f, "moderator_fallback"),
            SpeakReason::ListOrder => write!(f, "list_order"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discussion_status_roundtrip() {
        for status in [
            DiscussionStatus::Active,
            DiscussionStatus::Paused,
            DiscussionStatus::Completed,
        ] {
            let s = status.to_string();
            let parsed: DiscussionStatus = s.parse().unwrap();
            assert_eq!(status, parsed);
        }
    }

    #[test]
    fn test_tool_access_allows() {
        assert!(!ToolAccess::Disabled.allows(AgentRole::Moderator));
        assert!(!ToolAccess::Disabled.allows(AgentRole::Participant));
        assert!(ToolAccess::ModeratorOnly.allows(AgentRole::Moderator));
        assert!(!ToolAccess::ModeratorOnly.allows(AgentRole::Participant));
        assert!(ToolAccess::All.allows(AgentRole::Participant));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = DiscussionSettings::default();
        assert_eq!(settings.max_tool_rounds, 3);
        assert!((settings.temperature - 0.7).abs() < f64::EPSILON);
        assert_eq!(settings.turn_interval_ms, 0);
        assert_eq!(settings.tool_access, ToolAccess::All);
        assert!(settings.allow_conflict);
    }

    #[test]
    fn test_discussion_new() {
        let discussion = Discussion::new("Model safety");
        assert_eq!(discussion.title, "Model safety");
        assert_eq!(discussion.status, DiscussionStatus::Active);
        assert!(discussion.last_message_at.is_none());
    }

    #[test]
    fn test_speak_reason_serde() {
        let json = serde_json::to_string(&SpeakReason::ModeratorFallback).unwrap();
        assert_eq!(json, "\"moderator_fallback\"");
    }
}
