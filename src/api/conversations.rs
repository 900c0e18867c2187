//! Conversation endpoints

use crate::api::conversations::schemas::{
    ChatResponse, ConversationInitialized, Utterance, UtteranceList,
};
use crate::api::{ApiResult, ValidatedJson, ValidatedPath};
use crate::core::commands::{ChatTurn, InitializeConversation};
use crate::core::corpus::Corpus;
use crate::core::traits::ConversationService;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use di_axum::Inject;

pub fn router() -> Router {
    Router::new()
        .route("/initialize_conversation/", post(initialize_conversation))
        .route("/chatbot/", post(chatbot))
        .route(
            "/conversations/:conversation_id/utterances/",
            get(conversation_utterances),
        )
        .route(
            "/conversations/:conversation_id/corpus/",
            get(conversation_corpus),
        )
        .route(
            "/conversations/:conversation_id/corpus/archive/",
            get(conversation_corpus_archive),
        )
}

async fn initialize_conversation(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ValidatedJson(request): ValidatedJson<InitializeConversation>,
) -> ApiResult<(StatusCode, Json<ConversationInitialized>)> {
    let initialized = conversation_service
        .initialize_conversation(request)
        .await?;

    Ok((
        StatusCode::OK,
        Json(ConversationInitialized {
            conversation_id: initialized.conversation.conversation_id,
            message: "Conversation initialized successfully.",
            initial_utterance: initialized.initial_utterance,
        }),
    ))
}

async fn chatbot(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ValidatedJson(request): ValidatedJson<ChatTurn>,
) -> ApiResult<Json<ChatResponse>> {
    let reply = conversation_service.chat_turn(request).await?;

    Ok(Json(ChatResponse {
        message: reply.message,
        response: reply.response,
        bot_name: reply.bot_name,
        conversation_id: reply.conversation_id,
    }))
}

async fn conversation_utterances(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ValidatedPath(conversation_id): ValidatedPath<String>,
) -> ApiResult<Json<UtteranceList>> {
    let utterances = conversation_service
        .list_utterances(&conversation_id)
        .await?;

    Ok(Json(UtteranceList {
        conversation_id,
        utterances: utterances.into_iter().map(Utterance::from).collect(),
    }))
}

async fn conversation_corpus(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ValidatedPath(conversation_id): ValidatedPath<String>,
) -> ApiResult<Json<Corpus>> {
    Ok(Json(
        conversation_service.export_corpus(&conversation_id).await?,
    ))
}

async fn conversation_corpus_archive(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ValidatedPath(conversation_id): ValidatedPath<String>,
) -> ApiResult<impl IntoResponse> {
    let archive = conversation_service
        .export_corpus_archive(&conversation_id)
        .await?;
    let file_stem: String = conversation_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    let disposition = format!("attachment; filename=\"{file_stem}_corpus.tar.gz\"");

    Ok((
        [
            (header::CONTENT_TYPE, "application/gzip".to_owned()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive,
    ))
}

pub mod schemas {
    use crate::infrastructure::entities;
    use chrono::{DateTime, Utc};
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct ConversationInitialized {
        pub conversation_id: String,
        pub message: &'static str,
        pub initial_utterance: Option<String>,
    }

    #[derive(Serialize, Debug)]
    pub struct ChatResponse {
        pub message: String,
        pub response: String,
        pub bot_name: String,
        pub conversation_id: String,
    }

    #[derive(Serialize, Debug)]
    pub struct Utterance {
        pub id: i64,
        pub speaker_id: entities::Speaker,
        pub bot_name: Option<String>,
        pub participant_id: Option<String>,
        pub text: String,
        pub audio_file: Option<String>,
        pub is_voice: bool,
        pub created_time: DateTime<Utc>,
    }

    impl From<entities::Utterance> for Utterance {
        fn from(utterance: entities::Utterance) -> Self {
            Utterance {
                id: utterance.id,
                speaker_id: utterance.speaker_id,
                bot_name: utterance.bot_name,
                participant_id: utterance.participant_id,
                text: utterance.text,
                audio_file: utterance.audio_file,
                is_voice: utterance.is_voice,
                created_time: utterance.created_time,
            }
        }
    }

    #[derive(Serialize, Debug)]
    pub struct UtteranceList {
        pub conversation_id: String,
        pub utterances: Vec<Utterance>,
    }
}
