//! Pure mention scanning over (possibly partial) message text.
//!
//! A mention token is the marker character followed by a name phrase
//! bounded by whitespace or common punctuation. Resolution per match:
//! exact slug match on the leading word, else case-insensitive
//! longest-prefix match against a candidate's display name where the
//! character immediately following the name is a boundary. A mention of
//! the message's own author never resolves.

use colloquy_types::agent::{AgentId, AgentProfile, Author};

/// Marker character that introduces a mention token.
pub const MENTION_MARKER: char = '@';

/// Longest name phrase considered after the marker.
const MAX_PHRASE_CHARS: usize = 80;

/// Scan `text` for mentions and resolve them against `candidates`.
///
/// `candidates` must be the profiles of the discussion's current members;
/// names outside the roster are silently ignored. Duplicate targets are
/// deduplicated, keeping first occurrence order.
pub fn scan_mentions(text: &str, author: &Author, candidates: &[AgentProfile]) -> Vec<AgentId> {
    let self_id = author.agent_id();
    let mut found = Vec::new();

    for (idx, c) in text.char_indices() {
        if c != MENTION_MARKER {
            continue;
        }
        let phrase = normalize_phrase(&text[idx + c.len_utf8()..]);
        if phrase.is_empty() {
            continue;
        }
        if let Some(id) = resolve(&phrase, candidates) {
            if Some(id) != self_id && !found.contains(&id) {
                found.push(id);
            }
        }
    }

    found
}

/// Whether `c` terminates a slug word or counts as a name boundary.
fn is_boundary(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            ',' | '.' | ';' | ':' | '!' | '?' | ')' | ']' | '}' | '"' | '\'' | '@'
        )
}

/// Punctuation stripped from the front of a captured phrase.
fn is_wrapping_punct(c: char) -> bool {
    matches!(c, '"' | '\'' | '(' | '[' | '{')
}

/// Normalize the text following a marker: cap the window, strip wrapping
/// punctuation at the front, collapse internal whitespace runs to single
/// spaces.
fn normalize_phrase(after: &str) -> String {
    let mut out = String::new();
    let mut pending_space = false;

    for c in after.chars().take(MAX_PHRASE_CHARS) {
        if out.is_empty() && is_wrapping_punct(c) {
            continue;
        }
        if c.is_whitespace() {
            if !out.is_empty() {
                pending_space = true;
            }
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(c);
    }

    out
}

/// Resolve a normalized phrase to a candidate agent.
fn resolve(phrase: &str, candidates: &[AgentProfile]) -> Option<AgentId> {
    // Exact slug match on the leading word.
    let word_end = phrase
        .find(|c: char| is_boundary(c))
        .unwrap_or(phrase.len());
    let leading = &phrase[..word_end];
    if !leading.is_empty() {
        if let Some(profile) = candidates
            .iter()
            .find(|p| p.slug.as_deref() == Some(leading))
        {
            return Some(profile.id);
        }
    }

    // Case-insensitive longest-prefix match on display names. The name
    // must be followed by a boundary character (or end the phrase), so
    // "@Bobby" never resolves to "Bob".
    let phrase_lower = phrase.to_lowercase();
    let mut best: Option<(usize, AgentId)> = None;
    for profile in candidates {
        let name = profile.name.trim();
        if name.is_empty() {
            continue;
        }
        let name_lower = name.to_lowercase();
        if !phrase_lower.starts_with(&name_lower) {
            continue;
        }
        let bounded = match phrase_lower[name_lower.len()..].chars().next() {
            None => true,
            Some(c) => is_boundary(c),
        };
        if !bounded {
            continue;
        }
        if best.is_none_or(|(len, _)| name_lower.len() > len) {
            best = Some((name_lower.len(), profile.id));
        }
    }

    best.map(|(_, id)| id)
}
