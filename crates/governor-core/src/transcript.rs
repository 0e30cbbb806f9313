use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One block within a message's content (spec §3). Generalizes the teacher's
/// flatter `ChatMessage::{Assistant{tool_calls}, Tool{tool_call_id}}` shape
/// because condensation (P6/P7) must reason about individual blocks inside
/// one message, not whole messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

impl ContentBlock {
    #[must_use]
    pub fn char_len(&self) -> usize {
        match self {
            ContentBlock::Text { text } => text.len(),
            ContentBlock::ToolUse { input, .. } => input.to_string().len(),
            ContentBlock::ToolResult { content, .. } => content.len(),
        }
    }
}

/// A message's content is either a plain string or a list of tagged blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    #[must_use]
    pub fn char_len(&self) -> usize {
        match self {
            MessageContent::Text(s) => s.len(),
            MessageContent::Blocks(blocks) => blocks.iter().map(ContentBlock::char_len).sum(),
        }
    }

    /// Iterate over `tool_use` blocks, if any.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &serde_json::Value)> {
        let blocks: &[ContentBlock] = match self {
            MessageContent::Blocks(b) => b.as_slice(),
            MessageContent::Text(_) => &[],
        };
        blocks.iter().filter_map(|b| match b {
            ContentBlock::ToolUse { id, name, input } => {
                Some((id.as_str(), name.as_str(), input))
            }
            _ => None,
        })
    }

    /// Iterate over `tool_result` blocks, if any.
    pub fn tool_results(&self) -> impl Iterator<Item = (&str, &str)> {
        let blocks: &[ContentBlock] = match self {
            MessageContent::Blocks(b) => b.as_slice(),
            MessageContent::Text(_) => &[],
        };
        blocks.iter().filter_map(|b| match b {
            ContentBlock::ToolResult { tool_use_id, content } => {
                Some((tool_use_id.as_str(), content.as_str()))
            }
            _ => None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the transcript the Context Compressor condenses (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: MessageContent,
    pub ts: i64,
    #[serde(default)]
    pub is_summary: bool,
    #[serde(default)]
    pub condense_id: Option<Uuid>,
    #[serde(default)]
    pub condense_parent: Option<Uuid>,
}

impl TranscriptMessage {
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>, ts: i64) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            ts,
            is_summary: false,
            condense_id: None,
            condense_parent: None,
        }
    }
}

/// Rough token estimate (~4 chars/token), mirroring
/// `codingbuddy_core::estimate_message_tokens`'s conservative heuristic.
#[must_use]
pub fn estimate_tokens(messages: &[TranscriptMessage]) -> u64 {
    let total_chars: u64 = messages.iter().map(|m| m.content.char_len() as u64).sum();
    total_chars / 4
}
