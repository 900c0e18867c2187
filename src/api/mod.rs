use crate::core::error::ServiceError;
use crate::infrastructure::database::DatabaseConnection;
use async_trait::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use di_axum::Inject;
use log::error;
use serde::de::DeserializeOwned;
use serde_json::json;

pub mod bots;
pub mod conversations;
pub mod telemetry;

/// Every route the app serves, without middleware or a service provider.
pub fn router() -> Router {
    Router::new()
        .route("/health/", get(health))
        .nest(
            "/api",
            Router::new()
                .merge(conversations::router())
                .merge(bots::router())
                .merge(telemetry::router()),
        )
}

/// Maps service failures to status codes. Internal causes are logged, never returned.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0 {
            ServiceError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            ServiceError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            other => {
                error!("request failed: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred.".to_owned(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// `Json<T>` whose rejections are reported as 400 with a JSON error body.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ServiceError::validation(rejection.body_text()))?;

        Ok(ValidatedJson(value))
    }
}

/// `Path<T>` whose rejections are reported as 400 with a JSON error body.
#[derive(Debug)]
pub struct ValidatedPath<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidatedPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ServiceError::validation(rejection.body_text()))?;

        Ok(ValidatedPath(value))
    }
}

async fn health(Inject(database): Inject<DatabaseConnection>) -> Response {
    match sqlx::query("SELECT 1").execute(&**database).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "database": "ok" })),
        )
            .into_response(),
        Err(e) => {
            error!("health check failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "database": "unavailable" })),
            )
                .into_response()
        }
    }
}
