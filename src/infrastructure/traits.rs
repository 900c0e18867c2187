//! Infrastructure traits, used for DI on higher levels

use crate::infrastructure::entities;
use async_trait::async_trait;

#[async_trait]
pub trait BotRepository: Send + Sync {
    async fn list_bots(&self) -> Result<Vec<entities::Bot>, sqlx::Error>;

    async fn find_bot(&self, id: i64) -> Result<Option<entities::Bot>, sqlx::Error>;

    async fn find_bot_by_name(&self, name: &str) -> Result<Option<entities::Bot>, sqlx::Error>;

    async fn create_bot(&self, bot: entities::NewBot) -> Result<entities::Bot, sqlx::Error>;

    /// Overwrites every column of the bot with the given id.
    ///
    /// Returns `None` if the bot does not exist.
    async fn update_bot(&self, bot: entities::Bot) -> Result<Option<entities::Bot>, sqlx::Error>;

    /// Returns `false` if no bot had the given id.
    async fn delete_bot(&self, id: i64) -> Result<bool, sqlx::Error>;

    /// Inserts the bot, or updates the existing bot with the same name.
    async fn upsert_bot_by_name(&self, bot: entities::NewBot)
    -> Result<entities::Bot, sqlx::Error>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<entities::Conversation>, sqlx::Error>;

    async fn create_conversation(
        &self,
        conversation: entities::Conversation,
    ) -> Result<entities::Conversation, sqlx::Error>;

    /// All utterances of a conversation in creation order.
    async fn list_utterances(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<entities::Utterance>, sqlx::Error>;

    /// Inserts the utterances in order, in a single transaction.
    async fn create_utterances(
        &self,
        utterances: Vec<entities::NewUtterance>,
    ) -> Result<Vec<entities::Utterance>, sqlx::Error>;
}

#[async_trait]
pub trait KeystrokeRepository: Send + Sync {
    async fn create_keystroke(
        &self,
        keystroke: entities::NewKeystroke,
    ) -> Result<entities::Keystroke, sqlx::Error>;
}
