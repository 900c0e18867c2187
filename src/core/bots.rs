//! Bot registry: CRUD over bot definitions and the seed-file import.

use crate::core::commands::{CreateBot, UpdateBot};
use crate::core::error::{ServiceError, ServiceResult, is_unique_violation, optional, required};
use crate::core::traits::BotService;
use crate::infrastructure::entities::{Bot, ModelVendor, NewBot};
use crate::infrastructure::traits::BotRepository;
use async_trait::async_trait;
use di::{Ref, injectable};
use log::info;

#[injectable(BotService)]
pub struct BotRegistry {
    bots: Ref<dyn BotRepository>,
}

fn parse_vendor(value: &str) -> ServiceResult<ModelVendor> {
    value.parse().map_err(ServiceError::Validation)
}

fn duplicate_name(name: &str) -> impl FnOnce(sqlx::Error) -> ServiceError + '_ {
    move |e| {
        if is_unique_violation(&e) {
            ServiceError::validation(format!("A bot named '{name}' already exists."))
        } else {
            e.into()
        }
    }
}

fn bot_not_found(id: i64) -> ServiceError {
    ServiceError::not_found(format!("No bot found with the id {id}."))
}

#[async_trait]
impl BotService for BotRegistry {
    async fn list_bots(&self) -> ServiceResult<Vec<Bot>> {
        Ok(self.bots.list_bots().await?)
    }

    async fn create_bot(&self, request: CreateBot) -> ServiceResult<Bot> {
        let name = required(request.name, "name")?;
        let model_type = parse_vendor(&required(request.model_type, "model_type")?)?;
        let model_id = required(request.model_id, "model_id")?;

        let bot = self
            .bots
            .create_bot(NewBot {
                name: name.clone(),
                prompt: request.prompt.unwrap_or_default(),
                model_type,
                model_id,
                initial_utterance: optional(request.initial_utterance),
            })
            .await
            .map_err(duplicate_name(&name))?;

        info!("bot {} created with id {}", bot.name, bot.id);
        Ok(bot)
    }

    async fn get_bot(&self, id: i64) -> ServiceResult<Bot> {
        self.bots.find_bot(id).await?.ok_or_else(|| bot_not_found(id))
    }

    async fn update_bot(&self, id: i64, request: UpdateBot) -> ServiceResult<Bot> {
        let mut bot = self.get_bot(id).await?;

        if request.name.is_some() {
            bot.name = required(request.name, "name")?;
        }
        if let Some(prompt) = request.prompt {
            bot.prompt = prompt;
        }
        if request.model_type.is_some() {
            bot.model_type = parse_vendor(&required(request.model_type, "model_type")?)?;
        }
        if request.model_id.is_some() {
            bot.model_id = required(request.model_id, "model_id")?;
        }
        if request.initial_utterance.is_some() {
            // An empty string clears the opening line.
            bot.initial_utterance = optional(request.initial_utterance);
        }

        let name = bot.name.clone();
        self.bots
            .update_bot(bot)
            .await
            .map_err(duplicate_name(&name))?
            .ok_or_else(|| bot_not_found(id))
    }

    async fn delete_bot(&self, id: i64) -> ServiceResult<()> {
        if self.bots.delete_bot(id).await? {
            info!("bot {id} deleted");
            Ok(())
        } else {
            Err(bot_not_found(id))
        }
    }

    async fn import_bots(&self, bots: Vec<NewBot>) -> ServiceResult<usize> {
        let mut imported = 0;
        for bot in bots {
            self.bots.upsert_bot_by_name(bot).await?;
            imported += 1;
        }
        Ok(imported)
    }
}
