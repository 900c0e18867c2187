//! Bot registry endpoints

use crate::api::bots::schemas::{Bot, BotList, BotUpdated};
use crate::api::{ApiResult, ValidatedJson, ValidatedPath};
use crate::core::commands::{CreateBot, UpdateBot};
use crate::core::traits::BotService;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use di_axum::Inject;

pub fn router() -> Router {
    Router::new()
        .route("/bots/", get(list_bots).post(create_bot))
        .route("/bots/:id/", get(get_bot).put(update_bot).delete(delete_bot))
}

async fn list_bots(Inject(bot_service): Inject<dyn BotService>) -> ApiResult<Json<BotList>> {
    let bots = bot_service.list_bots().await?;

    Ok(Json(BotList {
        bots: bots.into_iter().map(Bot::from).collect(),
    }))
}

async fn create_bot(
    Inject(bot_service): Inject<dyn BotService>,
    ValidatedJson(request): ValidatedJson<CreateBot>,
) -> ApiResult<(StatusCode, Json<Bot>)> {
    let bot = bot_service.create_bot(request).await?;
    Ok((StatusCode::CREATED, Json(bot.into())))
}

async fn get_bot(
    Inject(bot_service): Inject<dyn BotService>,
    ValidatedPath(id): ValidatedPath<i64>,
) -> ApiResult<Json<Bot>> {
    Ok(Json(bot_service.get_bot(id).await?.into()))
}

async fn update_bot(
    Inject(bot_service): Inject<dyn BotService>,
    ValidatedPath(id): ValidatedPath<i64>,
    ValidatedJson(request): ValidatedJson<UpdateBot>,
) -> ApiResult<Json<BotUpdated>> {
    let bot = bot_service.update_bot(id, request).await?;

    Ok(Json(BotUpdated {
        message: "Bot updated successfully.",
        bot: bot.into(),
    }))
}

async fn delete_bot(
    Inject(bot_service): Inject<dyn BotService>,
    ValidatedPath(id): ValidatedPath<i64>,
) -> ApiResult<StatusCode> {
    bot_service.delete_bot(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub mod schemas {
    use crate::infrastructure::entities;
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct Bot {
        pub id: i64,
        pub name: String,
        pub prompt: String,
        pub model_type: String,
        pub model_id: String,
        pub initial_utterance: Option<String>,
    }

    impl From<entities::Bot> for Bot {
        fn from(bot: entities::Bot) -> Self {
            Bot {
                id: bot.id,
                name: bot.name,
                prompt: bot.prompt,
                model_type: bot.model_type.to_string(),
                model_id: bot.model_id,
                initial_utterance: bot.initial_utterance,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct BotList {
        pub bots: Vec<Bot>,
    }

    #[derive(Serialize, Debug)]
    pub struct BotUpdated {
        pub message: &'static str,
        pub bot: Bot,
    }
}
