//! Telemetry sinks: keystrokes, voice utterances and realtime voice sessions.

use crate::api::telemetry::schemas::{KeystrokesRecorded, VoiceUtteranceStored};
use crate::api::{ApiResult, ValidatedJson};
use crate::core::commands::{KeystrokeReport, VoiceUtteranceUpload};
use crate::core::traits::{ConversationService, ModelGateway, TelemetryService};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use di_axum::Inject;
use log::error;
use serde_json::json;

pub fn router() -> Router {
    Router::new()
        .route("/update_keystrokes/", post(update_keystrokes))
        .route("/voice_utterance/", post(voice_utterance))
        .route("/realtime_session/", get(realtime_session))
}

async fn update_keystrokes(
    Inject(telemetry_service): Inject<dyn TelemetryService>,
    ValidatedJson(report): ValidatedJson<KeystrokeReport>,
) -> ApiResult<Json<KeystrokesRecorded>> {
    let keystroke = telemetry_service.record_keystrokes(report).await?;

    Ok(Json(KeystrokesRecorded {
        message: "Keystroke data updated successfully.",
        id: keystroke.id,
    }))
}

async fn voice_utterance(
    Inject(conversation_service): Inject<dyn ConversationService>,
    ValidatedJson(upload): ValidatedJson<VoiceUtteranceUpload>,
) -> ApiResult<(StatusCode, Json<VoiceUtteranceStored>)> {
    let utterance = conversation_service.record_voice_utterance(upload).await?;

    Ok((
        StatusCode::CREATED,
        Json(VoiceUtteranceStored {
            id: utterance.id,
            speaker_id: utterance.speaker_id.as_str(),
            audio_file: utterance.audio_file,
        }),
    ))
}

/// Passes the vendor's status and body through unchanged.
async fn realtime_session(Inject(models): Inject<dyn ModelGateway>) -> Response {
    match models.create_realtime_session().await {
        Ok((status, body)) => (
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            Json(body),
        )
            .into_response(),
        Err(e) => {
            error!("realtime session request failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Failed to get session from OpenAI" })),
            )
                .into_response()
        }
    }
}

pub mod schemas {
    use serde::Serialize;

    #[derive(Serialize, Debug)]
    pub struct KeystrokesRecorded {
        pub message: &'static str,
        pub id: i64,
    }

    #[derive(Serialize, Debug)]
    pub struct VoiceUtteranceStored {
        pub id: i64,
        pub speaker_id: &'static str,
        pub audio_file: Option<String>,
    }
}
