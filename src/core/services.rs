//! Implementations for the service the app needs.
//!

use crate::core::assistant::{ChatMessage, history_window};
use crate::core::commands::{ChatTurn, InitializeConversation, VoiceUtteranceUpload};
use crate::core::corpus::{self, Corpus, SentimentAnalyzer, build_corpus};
use crate::core::error::{ServiceError, ServiceResult, is_unique_violation, optional, required};
use crate::core::history::HistoryCache;
use crate::core::traits::{ConversationService, InitializedConversation, ModelGateway, TurnReply};
use crate::infrastructure::entities::{Conversation, NewUtterance, Speaker, Utterance};
use crate::infrastructure::settings::Settings;
use crate::infrastructure::traits::{BotRepository, ConversationRepository};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use di::{Ref, injectable};
use log::{error, info, warn};
use serde_json::Value;
use std::path::Path;
use uuid::Uuid;

const DEFAULT_AUDIO_FORMAT: &str = "webm";

#[injectable(ConversationService)]
pub struct StudyConversationService {
    bots: Ref<dyn BotRepository>,
    conversations: Ref<dyn ConversationRepository>,
    models: Ref<dyn ModelGateway>,
    history: Ref<HistoryCache>,
    settings: Ref<Settings>,
}

/// `{participant}_{UTC timestamp}_{random suffix}`; distinct on every call.
pub fn generate_conversation_id(participant_id: &str, now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{participant_id}_{}_{}",
        now.format("%Y%m%d%H%M%S%6f"),
        &suffix[..8]
    )
}

/// Keeps letters, digits, `-` and `_`, so ids can be used as directory names.
fn path_safe(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn audio_extension(format: Option<String>) -> ServiceResult<String> {
    let format = optional(format)
        .unwrap_or_else(|| DEFAULT_AUDIO_FORMAT.to_owned())
        .trim_start_matches('.')
        .to_ascii_lowercase();

    if format.is_empty() || format.len() > 8 || !format.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ServiceError::validation(format!(
            "'{format}' is not a valid audio format."
        )));
    }
    Ok(format)
}

fn decode_audio(encoded: &str) -> ServiceResult<Vec<u8>> {
    // Browsers hand out data URLs (`data:audio/webm;base64,...`).
    let payload = encoded
        .split_once("base64,")
        .map(|(_, data)| data)
        .unwrap_or(encoded);

    BASE64
        .decode(payload.trim())
        .map_err(|_| ServiceError::validation("'audio_base64' is not valid base64."))
}

impl StudyConversationService {
    async fn require_conversation(&self, conversation_id: &str) -> ServiceResult<Conversation> {
        self.conversations
            .find_conversation(conversation_id)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!(
                    "No conversation found with the id '{conversation_id}'."
                ))
            })
    }

    /// Writes the recording below the media root and returns its relative path.
    async fn store_recording(
        &self,
        conversation_id: &str,
        audio: &[u8],
        extension: &str,
    ) -> ServiceResult<String> {
        let directory = format!("voice/{}", path_safe(conversation_id));
        let file_name = format!("{}.{extension}", Uuid::new_v4());

        let absolute_directory = self.settings.media_root.join(Path::new(&directory));
        tokio::fs::create_dir_all(&absolute_directory).await?;
        tokio::fs::write(absolute_directory.join(&file_name), audio).await?;

        Ok(format!("{directory}/{file_name}"))
    }

    /// Removes a recording whose utterance could not be stored.
    async fn discard_recording(&self, relative: &str) {
        let path = self.settings.media_root.join(relative);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("could not remove orphaned recording {}: {e}", path.display());
        }
    }
}

#[async_trait]
impl ConversationService for StudyConversationService {
    async fn initialize_conversation(
        &self,
        request: InitializeConversation,
    ) -> ServiceResult<InitializedConversation> {
        let bot_name = required(request.bot_name, "bot_name")?;
        let participant_id = required(request.participant_id, "participant_id")?;

        let bot = self
            .bots
            .find_bot_by_name(&bot_name)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format!("No bot found with the name '{bot_name}'."))
            })?;

        let conversation_id = match optional(request.conversation_id) {
            Some(supplied) => {
                if self.conversations.find_conversation(&supplied).await?.is_some() {
                    return Err(ServiceError::validation(format!(
                        "Conversation '{supplied}' already exists."
                    )));
                }
                supplied
            }
            None => generate_conversation_id(&participant_id, Utc::now()),
        };

        let survey_meta_data = match request.survey_meta_data {
            Some(Value::String(raw)) => Some(raw),
            Some(Value::Null) | None if request.extra.is_empty() => None,
            Some(Value::Null) | None => Some(Value::Object(request.extra).to_string()),
            Some(other) => Some(other.to_string()),
        };

        let initial_utterance = optional(bot.initial_utterance.clone());

        let conversation = self
            .conversations
            .create_conversation(Conversation {
                conversation_id: conversation_id.clone(),
                bot_name: bot.name.clone(),
                participant_id,
                initial_utterance: bot.initial_utterance.clone(),
                study_name: optional(request.study_name),
                user_group: optional(request.user_group),
                survey_id: optional(request.survey_id),
                survey_meta_data,
                bot_prompt: bot.prompt.clone(),
                model_type: bot.model_type,
                model_id: bot.model_id.clone(),
                started_time: Utc::now(),
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    ServiceError::validation(format!(
                        "Conversation '{conversation_id}' already exists."
                    ))
                } else {
                    e.into()
                }
            })?;

        if let Some(opening) = &initial_utterance {
            self.conversations
                .create_utterances(vec![NewUtterance::from_bot(
                    &conversation.conversation_id,
                    &bot.name,
                    opening.clone(),
                )])
                .await?;
        }

        info!(
            "conversation {} started with bot {}",
            conversation.conversation_id, conversation.bot_name
        );

        Ok(InitializedConversation {
            conversation,
            initial_utterance,
        })
    }

    async fn chat_turn(&self, request: ChatTurn) -> ServiceResult<TurnReply> {
        let bot_name = required(request.bot_name, "bot_name")?;
        let conversation_id = required(request.conversation_id, "conversation_id")?;
        let participant_id = required(request.participant_id, "participant_id")?;
        let message = required(request.message, "message")?;

        let conversation = self.require_conversation(&conversation_id).await?;
        if conversation.bot_name != bot_name {
            return Err(ServiceError::validation(format!(
                "Conversation '{conversation_id}' belongs to bot '{}'.",
                conversation.bot_name
            )));
        }

        let provider = self
            .models
            .provider(conversation.model_type, &conversation.model_id);

        // Held until the exchange is stored: turns on one conversation are serialized.
        let mut history = self.history.lock(&conversation_id).await;
        let mut messages = history.messages();
        let window = history_window(&messages, self.settings.memory_length, &message);

        let response = provider
            .chat(&conversation.bot_prompt, &window)
            .await
            .map_err(|e| {
                error!(
                    "{} failed for conversation {conversation_id}: {e}",
                    provider.name()
                );
                ServiceError::from(e)
            })?;

        self.conversations
            .create_utterances(vec![
                NewUtterance::from_participant(&conversation_id, &participant_id, message.clone()),
                NewUtterance::from_bot(&conversation_id, &conversation.bot_name, response.clone()),
            ])
            .await?;

        messages.push(ChatMessage::user(message.clone()));
        messages.push(ChatMessage::assistant(response.clone()));
        history.store(&messages);

        Ok(TurnReply {
            conversation_id,
            bot_name: conversation.bot_name,
            message,
            response,
        })
    }

    async fn list_utterances(&self, conversation_id: &str) -> ServiceResult<Vec<Utterance>> {
        self.require_conversation(conversation_id).await?;
        Ok(self.conversations.list_utterances(conversation_id).await?)
    }

    async fn record_voice_utterance(
        &self,
        request: VoiceUtteranceUpload,
    ) -> ServiceResult<Utterance> {
        let conversation_id = required(request.conversation_id, "conversation_id")?;
        let text = optional(request.text);
        let audio = optional(request.audio_base64);
        if text.is_none() && audio.is_none() {
            return Err(ServiceError::validation(
                "Either 'text' or 'audio_base64' is required.",
            ));
        }

        let conversation = self.require_conversation(&conversation_id).await?;
        let bot_name = optional(request.bot_name);
        let speaker = if bot_name.is_some() {
            Speaker::Assistant
        } else {
            Speaker::User
        };

        let audio_file = match audio {
            Some(encoded) => {
                let extension = audio_extension(request.audio_format)?;
                let bytes = decode_audio(&encoded)?;
                Some(
                    self.store_recording(&conversation_id, &bytes, &extension)
                        .await?,
                )
            }
            None => None,
        };

        let participant_id = match speaker {
            Speaker::User => optional(request.participant_id).or(Some(conversation.participant_id)),
            Speaker::Assistant => None,
        };

        let stored = self
            .conversations
            .create_utterances(vec![NewUtterance {
                conversation_id,
                speaker_id: speaker,
                bot_name,
                participant_id,
                text: text.unwrap_or_default(),
                audio_file: audio_file.clone(),
                is_voice: true,
            }])
            .await;

        let mut created = match stored {
            Ok(created) => created,
            Err(e) => {
                if let Some(relative) = &audio_file {
                    self.discard_recording(relative).await;
                }
                return Err(e.into());
            }
        };

        created
            .pop()
            .ok_or_else(|| ServiceError::Internal("voice utterance was not stored".into()))
    }

    async fn export_corpus(&self, conversation_id: &str) -> ServiceResult<Corpus> {
        let conversation = self.require_conversation(conversation_id).await?;
        let utterances = self.conversations.list_utterances(conversation_id).await?;

        Ok(build_corpus(&SentimentAnalyzer, &conversation, &utterances))
    }

    async fn export_corpus_archive(&self, conversation_id: &str) -> ServiceResult<Vec<u8>> {
        let corpus = self.export_corpus(conversation_id).await?;
        Ok(corpus::archive(&corpus, &path_safe(conversation_id))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_generated_ids_embed_participant_and_time() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 5).unwrap();

        let id = generate_conversation_id("p-42", now);

        assert!(id.starts_with("p-42_20250301123005000000_"));
        assert_eq!(id.len(), "p-42_20250301123005000000_".len() + 8);
    }

    #[test]
    fn test_generated_ids_are_distinct_for_the_same_instant() {
        let now = Utc::now();
        assert_ne!(
            generate_conversation_id("p1", now),
            generate_conversation_id("p1", now)
        );
    }

    #[test]
    fn test_path_safe_replaces_separators() {
        assert_eq!(path_safe("../R_abc/def"), "___R_abc_def");
    }

    #[test]
    fn test_audio_extension_defaults_and_validates() {
        assert_eq!(audio_extension(None).unwrap(), "webm");
        assert_eq!(audio_extension(Some(".WAV".into())).unwrap(), "wav");
        assert!(audio_extension(Some("../sh".into())).is_err());
    }

    #[test]
    fn test_decode_audio_accepts_data_urls() {
        assert_eq!(decode_audio("data:audio/webm;base64,aGk=").unwrap(), b"hi");
        assert_eq!(decode_audio("aGk=").unwrap(), b"hi");
        assert!(decode_audio("not base64!").is_err());
    }
}
