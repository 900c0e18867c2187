//! DI "Interfaces"

use crate::core::assistant::ModelProvider;
use crate::core::commands::{
    ChatTurn, CreateBot, InitializeConversation, KeystrokeReport, UpdateBot, VoiceUtteranceUpload,
};
use crate::core::corpus::Corpus;
use crate::core::error::{ProviderError, ServiceResult};
use crate::infrastructure::entities;
use crate::infrastructure::entities::ModelVendor;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Outcome of starting a conversation.
#[derive(Debug, Clone)]
pub struct InitializedConversation {
    pub conversation: entities::Conversation,
    /// The bot's opening line, already stored as the first utterance.
    pub initial_utterance: Option<String>,
}

/// Outcome of one user message and the bot's reply.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub conversation_id: String,
    pub bot_name: String,
    pub message: String,
    pub response: String,
}

#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Starts a conversation between a participant and the named bot.
    ///
    /// Returns `NotFound` if the bot does not exist, in which case nothing is written.
    async fn initialize_conversation(
        &self,
        request: InitializeConversation,
    ) -> ServiceResult<InitializedConversation>;

    /// Relays one participant message to the conversation's model and stores
    /// both sides of the exchange.
    async fn chat_turn(&self, request: ChatTurn) -> ServiceResult<TurnReply>;

    /// The full transcript in creation order.
    async fn list_utterances(&self, conversation_id: &str)
    -> ServiceResult<Vec<entities::Utterance>>;

    /// Stores a spoken utterance, with its recording if one was sent.
    async fn record_voice_utterance(
        &self,
        request: VoiceUtteranceUpload,
    ) -> ServiceResult<entities::Utterance>;

    /// The transcript as a sentiment-annotated corpus.
    async fn export_corpus(&self, conversation_id: &str) -> ServiceResult<Corpus>;

    /// The corpus dump packed as a `.tar.gz` archive.
    async fn export_corpus_archive(&self, conversation_id: &str) -> ServiceResult<Vec<u8>>;
}

#[async_trait]
pub trait BotService: Send + Sync {
    async fn list_bots(&self) -> ServiceResult<Vec<entities::Bot>>;

    async fn create_bot(&self, request: CreateBot) -> ServiceResult<entities::Bot>;

    async fn get_bot(&self, id: i64) -> ServiceResult<entities::Bot>;

    async fn update_bot(&self, id: i64, request: UpdateBot) -> ServiceResult<entities::Bot>;

    async fn delete_bot(&self, id: i64) -> ServiceResult<()>;

    /// Upserts bots by name. Returns how many were written.
    async fn import_bots(&self, bots: Vec<entities::NewBot>) -> ServiceResult<usize>;
}

#[async_trait]
pub trait TelemetryService: Send + Sync {
    async fn record_keystrokes(&self, report: KeystrokeReport)
    -> ServiceResult<entities::Keystroke>;
}

/// Access to the hosted model vendors.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// The shared client for a vendor and model, created on first use.
    fn provider(&self, vendor: ModelVendor, model_id: &str) -> Arc<dyn ModelProvider>;

    /// Mints an ephemeral realtime voice session, returning the vendor's status and body.
    async fn create_realtime_session(&self) -> Result<(u16, Value), ProviderError>;
}
