//! Inputs accepted by the services, as they arrive from the HTTP layer.
//!
//! Every field is optional at this level so that absent and blank values are
//! reported as validation errors by the services rather than as decode failures.

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Default, Clone, Deserialize)]
pub struct InitializeConversation {
    pub bot_name: Option<String>,
    pub participant_id: Option<String>,
    /// Survey response id, when the survey platform assigns the id.
    pub conversation_id: Option<String>,
    pub study_name: Option<String>,
    pub user_group: Option<String>,
    pub survey_id: Option<String>,
    pub survey_meta_data: Option<Value>,
    /// Everything else the survey sent along.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ChatTurn {
    pub bot_name: Option<String>,
    pub conversation_id: Option<String>,
    pub participant_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct CreateBot {
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub model_type: Option<String>,
    pub model_id: Option<String>,
    pub initial_utterance: Option<String>,
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct UpdateBot {
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub model_type: Option<String>,
    pub model_id: Option<String>,
    pub initial_utterance: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct KeystrokeReport {
    pub conversation_id: Option<String>,
    pub total_time_on_page: Option<f64>,
    pub total_time_away_from_page: Option<f64>,
    pub keystroke_count: Option<i64>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct VoiceUtteranceUpload {
    pub conversation_id: Option<String>,
    /// Present when the bot spoke.
    pub bot_name: Option<String>,
    pub participant_id: Option<String>,
    /// Transcript of the recording.
    pub text: Option<String>,
    pub audio_base64: Option<String>,
    /// File extension of the recording, e.g. `webm` or `wav`.
    pub audio_format: Option<String>,
}
