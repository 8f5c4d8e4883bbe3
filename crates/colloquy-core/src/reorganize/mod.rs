//! Display-oriented message reorganization.
//!
//! A two-phase batch transform over a flat chronological message list,
//! invoked by the presentation boundary on demand (not part of the turn
//! loop). Phase 1 folds every tool-result record into its origin message,
//! keyed by tool-call id. Phase 2 greedily coalesces runs of consecutive
//! same-author messages into display units. The transform never mutates
//! its input and is idempotent on already-merged output.

use std::collections::BTreeMap;

use serde::Serialize;

use colloquy_types::message::{Message, Segment, ToolResultMessage};

/// Maximum gap, in seconds, between a unit's first message and a later
/// message for the two to merge.
const MERGE_WINDOW_SECS: i64 = 3 * 60;

/// A display-ready unit: one merged message plus its tool results keyed by
/// tool-call id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayUnit {
    pub message: Message,
    pub tool_results: BTreeMap<String, ToolResultMessage>,
}

/// Reorganize a flat chronological message list into display units.
pub fn reorganize(messages: &[Message], tool_results: &[ToolResultMessage]) -> Vec<DisplayUnit> {
    coalesce(attach_tool_results(messages, tool_results))
}

/// Phase 1: fold each tool result into its origin message, keyed by
/// tool-call id. Results whose origin message is absent are dropped.
pub fn attach_tool_results(
    messages: &[Message],
    tool_results: &[ToolResultMessage],
) -> Vec<DisplayUnit> {
    let mut units: Vec<DisplayUnit> = messages
        .iter()
        .map(|message| DisplayUnit {
            message: message.clone(),
            tool_results: BTreeMap::new(),
        })
        .collect();

    for result in tool_results {
        if let Some(unit) = units
            .iter_mut()
            .find(|u| u.message.id == result.origin_message_id)
        {
            unit.tool_results
                .insert(result.tool_call_id.clone(), result.clone());
        }
    }

    units
}

/// Phase 2: greedily merge runs of consecutive units.
///
/// A unit absorbs the next one when the author matches, the later message
/// is not a reply, and the later timestamp falls within the merge window
/// of the unit's first message.
pub fn coalesce(units: Vec<DisplayUnit>) -> Vec<DisplayUnit> {
    let mut merged: Vec<DisplayUnit> = Vec::with_capacity(units.len());

    for unit in units {
        let absorb = merged.last().is_some_and(|last| can_merge(last, &unit));
        if absorb {
            if let Some(last) = merged.last_mut() {
                merge_into(last, unit);
            }
        } else {
            merged.push(unit);
        }
    }

    merged
}

fn can_merge(unit: &DisplayUnit, next: &DisplayUnit) -> bool {
    unit.message.author == next.message.author
        && next.message.reply_to.is_none()
        && (next.message.created_at - unit.message.created_at).num_seconds() < MERGE_WINDOW_SECS
}

fn merge_into(unit: &mut DisplayUnit, next: DisplayUnit) {
    // Segments concatenate with a synthesized text separator (or the
    // separator is appended to a trailing text segment) so interleaved
    // text/tool segments keep their original order across the boundary.
    if unit.message.segments.is_some() || next.message.segments.is_some() {
        let taken = unit.message.segments.take();
        let mut segments = match taken {
            Some(segments) => segments,
            None => default_segments(&unit.message),
        };
        let next_segments = next
            .message
            .segments
            .clone()
            .unwrap_or_else(|| default_segments(&next.message));
        match segments.last_mut() {
            Some(Segment::Text { text }) => text.push_str("\n\n"),
            _ => segments.push(Segment::Text {
                text: "\n\n".to_string(),
            }),
        }
        segments.extend(next_segments);
        unit.message.segments = Some(segments);
    }

    if !next.message.content.is_empty() {
        if !unit.message.content.is_empty() {
            unit.message.content.push_str("\n\n");
        }
        unit.message.content.push_str(&next.message.content);
    }

    unit.message.tool_calls.extend(next.message.tool_calls);
    unit.message.updated_at = next.message.updated_at;
    unit.tool_results.extend(next.tool_results);
}

fn default_segments(message: &Message) -> Vec<Segment> {
    vec![Segment::Text {
        text: message.content.clone(),
    }]
}
