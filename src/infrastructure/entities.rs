//! Database entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt::Display;
use std::str::FromStr;

/// Hosted model vendor a bot talks to. Stored by variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
pub enum ModelVendor {
    OpenAI,
    Anthropic,
}

impl FromStr for ModelVendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ModelVendor::OpenAI),
            "anthropic" => Ok(ModelVendor::Anthropic),
            other => Err(format!("unsupported model type '{other}'")),
        }
    }
}

impl Display for ModelVendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelVendor::OpenAI => f.write_str("OpenAI"),
            ModelVendor::Anthropic => f.write_str("Anthropic"),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Bot {
    pub id: i64,
    pub name: String,
    pub prompt: String,
    pub model_type: ModelVendor,
    pub model_id: String,
    pub initial_utterance: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewBot {
    pub name: String,
    pub prompt: String,
    pub model_type: ModelVendor,
    pub model_id: String,
    pub initial_utterance: Option<String>,
}

/// One participant session. `bot_prompt`, `model_type` and `model_id` are copied
/// from the bot when the conversation starts.
#[derive(Debug, Clone, FromRow)]
pub struct Conversation {
    pub conversation_id: String,
    pub bot_name: String,
    pub participant_id: String,
    pub initial_utterance: Option<String>,
    pub study_name: Option<String>,
    pub user_group: Option<String>,
    pub survey_id: Option<String>,
    pub survey_meta_data: Option<String>,
    pub bot_prompt: String,
    pub model_type: ModelVendor,
    pub model_id: String,
    pub started_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Utterance {
    pub id: i64,
    pub conversation_id: String,
    pub speaker_id: Speaker,
    pub bot_name: Option<String>,
    pub participant_id: Option<String>,
    pub text: String,
    pub audio_file: Option<String>,
    pub is_voice: bool,
    pub created_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUtterance {
    pub conversation_id: String,
    pub speaker_id: Speaker,
    pub bot_name: Option<String>,
    pub participant_id: Option<String>,
    pub text: String,
    pub audio_file: Option<String>,
    pub is_voice: bool,
}

impl NewUtterance {
    pub fn from_participant(conversation_id: &str, participant_id: &str, text: String) -> Self {
        NewUtterance {
            conversation_id: conversation_id.to_owned(),
            speaker_id: Speaker::User,
            bot_name: None,
            participant_id: Some(participant_id.to_owned()),
            text,
            audio_file: None,
            is_voice: false,
        }
    }

    pub fn from_bot(conversation_id: &str, bot_name: &str, text: String) -> Self {
        NewUtterance {
            conversation_id: conversation_id.to_owned(),
            speaker_id: Speaker::Assistant,
            bot_name: Some(bot_name.to_owned()),
            participant_id: None,
            text,
            audio_file: None,
            is_voice: false,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Keystroke {
    pub id: i64,
    pub conversation_id: String,
    pub total_time_on_page: f64,
    pub total_time_away_from_page: f64,
    pub keystroke_count: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewKeystroke {
    pub conversation_id: String,
    pub total_time_on_page: f64,
    pub total_time_away_from_page: f64,
    pub keystroke_count: i64,
    pub timestamp: DateTime<Utc>,
}
