//! Chat history for the interactive `chat` command.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::providers::ChatMessage;

/// Rough characters-per-token ratio used for history trimming.
const CHARS_PER_TOKEN: usize = 4;

/// Ordered chat history with an optional system prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn new(system_prompt: Option<String>) -> Self {
        Self {
            system_prompt: system_prompt.filter(|s| !s.trim().is_empty()),
            messages: Vec::new(),
        }
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    /// Messages without the system prompt.
    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Messages ready to send, system prompt first.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        self.system_prompt
            .iter()
            .map(|s| ChatMessage::system(s.clone()))
            .chain(self.messages.iter().cloned())
            .collect()
    }

    /// Drops the history but keeps the system prompt.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn estimated_tokens(&self) -> usize {
        let chars: usize = self
            .system_prompt
            .iter()
            .map(String::len)
            .chain(self.messages.iter().map(|m| m.content.len()))
            .sum();
        chars.div_ceil(CHARS_PER_TOKEN)
    }

    /// Drops the oldest messages until the estimate fits `token_limit`.
    ///
    /// The newest message is always kept.
    pub fn truncate_to_limit(&mut self, token_limit: usize) {
        let mut dropped = 0;
        while self.messages.len() > 1 && self.estimated_tokens() > token_limit {
            self.messages.remove(0);
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, token_limit, "trimmed conversation history");
        }
    }

    /// Saves the conversation as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("Failed to serialize conversation")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write conversation to {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read conversation from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse conversation from {}", path.display()))
    }
}
