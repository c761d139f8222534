use crate::llm::{ContentBlock, MessageRole, ProviderMessage};
use std::collections::HashMap;
use std::fmt;

/// One step of an agent run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEntry {
    User(String),
    ToolCall { name: String, arguments: String },
    ToolResult { name: String, output: String, is_error: bool },
    Assistant(String),
}

impl fmt::Display for TranscriptEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(text) => write!(f, "[user] {text}"),
            Self::ToolCall { name, arguments } => write!(f, "[tool_call] {name} {arguments}"),
            Self::ToolResult {
                name,
                output,
                is_error: false,
            } => write!(f, "[tool_result] {name}: {output}"),
            Self::ToolResult {
                name,
                output,
                is_error: true,
            } => write!(f, "[tool_error] {name}: {output}"),
            Self::Assistant(text) => write!(f, "[assistant] {text}"),
        }
    }
}

/// Flat, line-oriented record of what the agent did and concluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new(entries: Vec<TranscriptEntry>) -> Self {
        Self { entries }
    }

    /// Rebuild a transcript from a tool-loop conversation.
    pub fn from_messages(messages: &[ProviderMessage]) -> Self {
        let mut tool_names: HashMap<&str, &str> = HashMap::new();
        let mut entries = Vec::new();

        for message in messages {
            for block in &message.content {
                match block {
                    ContentBlock::Text { text } if text.trim().is_empty() => {}
                    ContentBlock::Text { text } => entries.push(match message.role {
                        MessageRole::User => TranscriptEntry::User(text.clone()),
                        MessageRole::Assistant => TranscriptEntry::Assistant(text.clone()),
                    }),
                    ContentBlock::ToolUse { id, name, input } => {
                        tool_names.insert(id, name);
                        entries.push(TranscriptEntry::ToolCall {
                            name: name.clone(),
                            arguments: input.to_string(),
                        });
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => entries.push(TranscriptEntry::ToolResult {
                        name: tool_names
                            .get(tool_use_id.as_str())
                            .map_or_else(|| tool_use_id.clone(), |name| (*name).to_string()),
                        output: content.clone(),
                        is_error: *is_error,
                    }),
                }
            }
        }

        Self { entries }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Last assistant answer, if the agent produced one.
    pub fn final_answer(&self) -> Option<&str> {
        self.entries.iter().rev().find_map(|entry| match entry {
            TranscriptEntry::Assistant(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Non-empty output lines, in order. Multi-line entries are split.
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .flat_map(|entry| {
                entry
                    .to_string()
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(str::to_owned)
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines().join("\n"))
    }
}
