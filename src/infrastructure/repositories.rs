//! DB Repository abstractions

use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{
    Bot, Conversation, Keystroke, NewBot, NewKeystroke, NewUtterance, Utterance,
};
use crate::infrastructure::traits::{BotRepository, ConversationRepository, KeystrokeRepository};
use async_trait::async_trait;
use chrono::Utc;
use di::{Ref, injectable};

#[injectable(BotRepository)]
pub struct DbBotRepository {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl BotRepository for DbBotRepository {
    async fn list_bots(&self) -> Result<Vec<Bot>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM bots ORDER BY name ASC")
            .fetch_all(&**self.connection)
            .await
    }

    async fn find_bot(&self, id: i64) -> Result<Option<Bot>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM bots WHERE id = ?")
            .bind(id)
            .fetch_optional(&**self.connection)
            .await
    }

    async fn find_bot_by_name(&self, name: &str) -> Result<Option<Bot>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM bots WHERE name = ?")
            .bind(name)
            .fetch_optional(&**self.connection)
            .await
    }

    async fn create_bot(&self, bot: NewBot) -> Result<Bot, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO bots (name, prompt, model_type, model_id, initial_utterance) VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(bot.name)
        .bind(bot.prompt)
        .bind(bot.model_type)
        .bind(bot.model_id)
        .bind(bot.initial_utterance)
        .fetch_one(&**self.connection)
        .await
    }

    async fn update_bot(&self, bot: Bot) -> Result<Option<Bot>, sqlx::Error> {
        sqlx::query_as(
            "UPDATE bots SET name = ?, prompt = ?, model_type = ?, model_id = ?, initial_utterance = ? WHERE id = ? RETURNING *",
        )
        .bind(bot.name)
        .bind(bot.prompt)
        .bind(bot.model_type)
        .bind(bot.model_id)
        .bind(bot.initial_utterance)
        .bind(bot.id)
        .fetch_optional(&**self.connection)
        .await
    }

    async fn delete_bot(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM bots WHERE id = ?")
            .bind(id)
            .execute(&**self.connection)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn upsert_bot_by_name(&self, bot: NewBot) -> Result<Bot, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO bots (name, prompt, model_type, model_id, initial_utterance) VALUES (?, ?, ?, ?, ?) \
             ON CONFLICT (name) DO UPDATE SET prompt = excluded.prompt, model_type = excluded.model_type, \
             model_id = excluded.model_id, initial_utterance = excluded.initial_utterance RETURNING *",
        )
        .bind(bot.name)
        .bind(bot.prompt)
        .bind(bot.model_type)
        .bind(bot.model_id)
        .bind(bot.initial_utterance)
        .fetch_one(&**self.connection)
        .await
    }
}

#[injectable(ConversationRepository)]
pub struct DbConversationRepository {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl ConversationRepository for DbConversationRepository {
    async fn find_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        sqlx::query_as("SELECT * FROM conversations WHERE conversation_id = ?")
            .bind(conversation_id)
            .fetch_optional(&**self.connection)
            .await
    }

    async fn create_conversation(
        &self,
        conversation: Conversation,
    ) -> Result<Conversation, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO conversations (conversation_id, bot_name, participant_id, initial_utterance, study_name, user_group, survey_id, survey_meta_data, bot_prompt, model_type, model_id, started_time) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(conversation.conversation_id)
        .bind(conversation.bot_name)
        .bind(conversation.participant_id)
        .bind(conversation.initial_utterance)
        .bind(conversation.study_name)
        .bind(conversation.user_group)
        .bind(conversation.survey_id)
        .bind(conversation.survey_meta_data)
        .bind(conversation.bot_prompt)
        .bind(conversation.model_type)
        .bind(conversation.model_id)
        .bind(conversation.started_time)
        .fetch_one(&**self.connection)
        .await
    }

    async fn list_utterances(&self, conversation_id: &str) -> Result<Vec<Utterance>, sqlx::Error> {
        sqlx::query_as(
            "SELECT * FROM utterances WHERE conversation_id = ? ORDER BY created_time ASC, id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&**self.connection)
        .await
    }

    async fn create_utterances(
        &self,
        utterances: Vec<NewUtterance>,
    ) -> Result<Vec<Utterance>, sqlx::Error> {
        let mut transaction = self.connection.begin().await?;
        let mut created = Vec::with_capacity(utterances.len());

        for utterance in utterances {
            let row: Utterance = sqlx::query_as(
                "INSERT INTO utterances (conversation_id, speaker_id, bot_name, participant_id, text, audio_file, is_voice, created_time) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING *",
            )
            .bind(utterance.conversation_id)
            .bind(utterance.speaker_id)
            .bind(utterance.bot_name)
            .bind(utterance.participant_id)
            .bind(utterance.text)
            .bind(utterance.audio_file)
            .bind(utterance.is_voice)
            .bind(Utc::now())
            .fetch_one(&mut *transaction)
            .await?;
            created.push(row);
        }

        transaction.commit().await?;
        Ok(created)
    }
}

#[injectable(KeystrokeRepository)]
pub struct DbKeystrokeRepository {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl KeystrokeRepository for DbKeystrokeRepository {
    async fn create_keystroke(&self, keystroke: NewKeystroke) -> Result<Keystroke, sqlx::Error> {
        sqlx::query_as(
            "INSERT INTO keystrokes (conversation_id, total_time_on_page, total_time_away_from_page, keystroke_count, timestamp) VALUES (?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(keystroke.conversation_id)
        .bind(keystroke.total_time_on_page)
        .bind(keystroke.total_time_away_from_page)
        .bind(keystroke.keystroke_count)
        .bind(keystroke.timestamp)
        .fetch_one(&**self.connection)
        .await
    }
}
