//! Chat turns as exchanged with the hosted models, and the rolling-history window.
//!

use crate::core::error::ProviderError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A hosted chat-completion endpoint for one vendor and model.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Sends the system prompt and the turn window, returning the reply text.
    async fn chat(&self, system_prompt: &str, messages: &[ChatMessage])
    -> Result<String, ProviderError>;
}

/// The turns forwarded to the model: `history` with the new user message
/// appended, cut to the last `2 * memory_length` entries. The new message is
/// always kept.
pub fn history_window(
    history: &[ChatMessage],
    memory_length: usize,
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut window = history.to_vec();
    window.push(ChatMessage::user(user_message));
    most_recent(&window, (memory_length * 2).max(1))
}

/// The last `limit` messages, in order.
pub fn most_recent(messages: &[ChatMessage], limit: usize) -> Vec<ChatMessage> {
    let start = messages.len().saturating_sub(limit);
    messages[start..].to_vec()
}

/// Joins reply fragments the way they are shown to participants.
pub fn join_fragments<'a>(fragments: impl IntoIterator<Item = &'a str>) -> String {
    fragments
        .into_iter()
        .map(str::trim)
        .filter(|fragment| !fragment.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
