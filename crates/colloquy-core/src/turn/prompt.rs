//! Prompt assembly for a speaking agent.
//!
//! Builds a provider-agnostic system prompt and ordered role-tagged turns
//! from the agent persona, the other members, the discussion settings, and
//! the persisted history. XML tags delineate sections so the model can
//! tell persona, participants, and ground rules apart.

use colloquy_types::agent::{AgentProfile, Author};
use colloquy_types::discussion::{DiscussionSettings, ModerationStyle};
use colloquy_types::llm::{ChatRole, ChatTurn};
use colloquy_types::message::{Message, MessageStatus, ToolCall, ToolResultMessage, ToolResultStatus};

/// Builds the system prompt and conversation turns for one model call.
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build the system prompt for `agent`.
    ///
    /// Layout:
    /// ```text
    /// <persona>Name / Role / Handle</persona>
    /// <personality>...</personality>        (skipped when empty)
    /// <expertise>...</expertise>
    /// <bias>...</bias>
    /// <response_style>...</response_style>
    /// <directive>...</directive>
    /// <participants>other members</participants>
    /// <ground_rules>moderation + conflict stance</ground_rules>
    /// <instructions>behavioral guidelines</instructions>
    /// ```
    pub fn system_prompt(
        agent: &AgentProfile,
        others: &[AgentProfile],
        settings: &DiscussionSettings,
    ) -> String {
        let mut sections = Vec::with_capacity(9);

        let mut persona = format!("Name: {}\nRole: {}", agent.name, agent.role);
        if let Some(slug) = &agent.slug {
            persona.push_str(&format!("\nHandle: @{slug}"));
        }
        sections.push(format!("<persona>\n{persona}\n</persona>"));

        for (tag, text) in [
            ("personality", &agent.personality),
            ("expertise", &agent.expertise),
            ("bias", &agent.bias),
            ("response_style", &agent.response_style),
        ] {
            if !text.trim().is_empty() {
                sections.push(format!("<{tag}>\n{}\n</{tag}>", text.trim()));
            }
        }

        if let Some(directive) = agent.directive.as_deref() {
            if !directive.trim().is_empty() {
                sections.push(format!("<directive>\n{}\n</directive>", directive.trim()));
            }
        }

        if !others.is_empty() {
            let lines: Vec<String> = others
                .iter()
                .map(|p| {
                    let handle = p
                        .slug
                        .as_deref()
                        .map(|s| format!(", @{s}"))
                        .unwrap_or_default();
                    format!("- {} ({}{handle})", p.name, p.role)
                })
                .collect();
            sections.push(format!(
                "<participants>\nOther participants in this discussion:\n{}\n</participants>",
                lines.join("\n")
            ));
        }

        let moderation_line = match settings.moderation_style {
            ModerationStyle::Strict => "Follow the moderator's direction closely.",
            ModerationStyle::Flexible => {
                "The moderator guides loosely; speak when you have something to add."
            }
        };
        let conflict_line = if settings.allow_conflict {
            "Disagreement is welcome when grounded in your expertise."
        } else {
            "Keep the discussion consensus-oriented; avoid open conflict."
        };
        sections.push(format!(
            "<ground_rules>\n{moderation_line}\n{conflict_line}\n</ground_rules>"
        ));

        sections.push(format!(
            "<instructions>\n\
            You are {} in a group discussion. Stay in character.\n\
            Address another participant directly with @name when you want them to answer next.\n\
            Do not speak for other participants.\n\
            </instructions>",
            agent.name
        ));

        sections.join("\n\n")
    }

    /// Map the persisted history into role-tagged turns from `agent`'s
    /// point of view: its own completed messages become `Assistant` turns,
    /// everyone else's become named `User` turns. The trigger is always
    /// the final turn.
    pub fn conversation_turns(
        agent: &AgentProfile,
        roster: &[AgentProfile],
        history: &[Message],
        trigger: &Message,
    ) -> Vec<ChatTurn> {
        let mut turns = Vec::with_capacity(history.len() + 1);
        for message in history {
            if message.status != MessageStatus::Completed || message.id == trigger.id {
                continue;
            }
            turns.push(Self::turn_for(agent, roster, message));
        }
        turns.push(Self::turn_for(agent, roster, trigger));
        turns
    }

    fn turn_for(agent: &AgentProfile, roster: &[AgentProfile], message: &Message) -> ChatTurn {
        match message.author {
            Author::Agent { id } if id == agent.id => {
                ChatTurn::new(ChatRole::Assistant, message.content.clone())
            }
            Author::Agent { id } => {
                let name = roster
                    .iter()
                    .find(|p| p.id == id)
                    .map(|p| p.name.as_str())
                    .unwrap_or("Former participant");
                ChatTurn::new(ChatRole::User, format!("{name}: {}", message.content))
            }
            Author::User => ChatTurn::new(ChatRole::User, format!("User: {}", message.content)),
        }
    }

    /// Render the assistant's tool-call turn fed back between rounds.
    pub fn assistant_tool_turn(content: &str, calls: &[ToolCall]) -> ChatTurn {
        let mut body = String::new();
        if !content.trim().is_empty() {
            body.push_str(content.trim());
            body.push_str("\n\n");
        }
        for call in calls {
            body.push_str(&format!(
                "[tool call {}: {}({})]\n",
                call.id, call.name, call.arguments
            ));
        }
        ChatTurn::new(ChatRole::Assistant, body.trim_end().to_string())
    }

    /// Render one tool result as a `Tool` turn.
    pub fn tool_result_turn(result: &ToolResultMessage) -> ChatTurn {
        let body = match result.status {
            ToolResultStatus::Success => {
                let payload = result
                    .result
                    .as_ref()
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "null".to_string());
                format!("[{} ({}) -> {payload}]", result.tool_name, result.tool_call_id)
            }
            ToolResultStatus::Error => {
                let error = result.error.as_deref().unwrap_or("unknown error");
                format!(
                    "[{} ({}) failed: {error}]",
                    result.tool_name, result.tool_call_id
                )
            }
        };
        ChatTurn::new(ChatRole::Tool, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use colloquy_types::agent::AgentRole;
    use colloquy_types::discussion::DiscussionId;
    use colloquy_types::message::MessageId;

    fn agent(name: &str) -> AgentProfile {
        AgentProfile::new(name, AgentRole::Participant)
    }

    #[test]
    fn system_prompt_skips_empty_sections() {
        let speaker = agent("Alice");
        let prompt = PromptBuilder::system_prompt(&speaker, &[], &DiscussionSettings::default());

        assert!(prompt.contains("<persona>"));
        assert!(prompt.contains("Name: Alice"));
        assert!(!prompt.contains("<personality>"));
        assert!(!prompt.contains("<participants>"));
        assert!(prompt.contains("<ground_rules>"));
        assert!(prompt.contains("<instructions>"));
    }

    #[test]
    fn system_prompt_includes_persona_fields() {
        let mut speaker = agent("Alice");
        speaker.slug = Some("alice".to_string());
        speaker.personality = "Dry, skeptical".to_string();
        speaker.expertise = "Distributed systems".to_string();
        speaker.directive = Some("Always cite sources.".to_string());

        let bob = agent("Bob");
        let prompt =
            PromptBuilder::system_prompt(&speaker, &[bob], &DiscussionSettings::default());

        assert!(prompt.contains("Handle: @alice"));
        assert!(prompt.contains("<personality>\nDry, skeptical\n</personality>"));
        assert!(prompt.contains("<expertise>\nDistributed systems\n</expertise>"));
        assert!(prompt.contains("<directive>\nAlways cite sources.\n</directive>"));
        assert!(prompt.contains("- Bob (participant)"));
    }

    #[test]
    fn system_prompt_reflects_conflict_setting() {
        let speaker = agent("Alice");
        let settings = DiscussionSettings {
            allow_conflict: false,
            ..Default::default()
        };
        let prompt = PromptBuilder::system_prompt(&speaker, &[], &settings);
        assert!(prompt.contains("avoid open conflict"));
    }

    #[test]
    fn conversation_turns_tag_roles_by_author() {
        let alice = agent("Alice");
        let bob = agent("Bob");
        let discussion_id = DiscussionId::new();
        let roster = [alice.clone(), bob.clone()];

        let user_msg = Message::user_text(discussion_id, "hello everyone");
        let mut alice_msg = Message::user_text(discussion_id, "hi, Alice here");
        alice_msg.author = Author::Agent { id: alice.id };
        let mut bob_msg = Message::user_text(discussion_id, "Bob chiming in");
        bob_msg.author = Author::Agent { id: bob.id };

        let history = [user_msg.clone(), alice_msg.clone(), bob_msg.clone()];
        let turns = PromptBuilder::conversation_turns(&alice, &roster, &history, &bob_msg);

        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].role, ChatRole::User);
        assert_eq!(turns[0].content, "User: hello everyone");
        assert_eq!(turns[1].role, ChatRole::Assistant);
        assert_eq!(turns[1].content, "hi, Alice here");
        // Trigger comes last, named after its author.
        assert_eq!(turns[2].role, ChatRole::User);
        assert_eq!(turns[2].content, "Bob: Bob chiming in");
    }

    #[test]
    fn conversation_turns_skip_non_completed() {
        let alice = agent("Alice");
        let discussion_id = DiscussionId::new();
        let trigger = Message::user_text(discussion_id, "go");

        let mut streaming = Message::user_text(discussion_id, "partial");
        streaming.status = MessageStatus::Streaming;
        let mut errored = Message::user_text(discussion_id, "broken");
        errored.status = MessageStatus::Error;

        let history = [streaming, errored, trigger.clone()];
        let turns = PromptBuilder::conversation_turns(&alice, &[alice.clone()], &history, &trigger);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "User: go");
    }

    #[test]
    fn assistant_tool_turn_lists_calls() {
        let calls = [ToolCall {
            id: "c1".to_string(),
            name: "search".to_string(),
            arguments: r#"{"q":"rust"}"#.to_string(),
        }];
        let turn = PromptBuilder::assistant_tool_turn("Let me check.", &calls);
        assert_eq!(turn.role, ChatRole::Assistant);
        assert!(turn.content.starts_with("Let me check."));
        assert!(turn.content.contains(r#"[tool call c1: search({"q":"rust"})]"#));
    }

    #[test]
    fn tool_result_turns_render_success_and_error() {
        let now = Utc::now();
        let base = ToolResultMessage {
            id: MessageId::new(),
            origin_message_id: MessageId::new(),
            tool_call_id: "c1".to_string(),
            tool_name: "search".to_string(),
            status: ToolResultStatus::Success,
            result: Some(serde_json::json!({"hits": 3})),
            error: None,
            started_at: now,
            ended_at: now,
        };
        let turn = PromptBuilder::tool_result_turn(&base);
        assert_eq!(turn.role, ChatRole::Tool);
        assert!(turn.content.contains(r#"{"hits":3}"#));

        let failed = ToolResultMessage {
            status: ToolResultStatus::Error,
            result: None,
            error: Some("timeout".to_string()),
            ..base
        };
        let turn = PromptBuilder::tool_result_turn(&failed);
        assert!(turn.content.contains("failed: timeout"));
    }
}
