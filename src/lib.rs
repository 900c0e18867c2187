//! Chatbot study server: conversations with hosted LLMs for survey-based research.
//!
//! Library exports for the binaries and tests

pub mod api;
pub mod core;
pub mod infrastructure;

use crate::core::bots::BotRegistry;
use crate::core::history::HistoryCache;
use crate::core::providers::ProviderRegistry;
use crate::core::services::StudyConversationService;
use crate::core::telemetry::KeystrokeTelemetry;
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::repositories::{
    DbBotRepository, DbConversationRepository, DbKeystrokeRepository,
};
use crate::infrastructure::settings::Settings;
use anyhow::anyhow;
use axum::Router;
use axum::http::header::{CONTENT_SECURITY_POLICY, X_FRAME_OPTIONS};
use axum::http::{HeaderValue, Method};
use di::{Injectable, ServiceCollection, ServiceProvider};
use di_axum::RouterServiceProviderExtensions;
use log::warn;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Registers every service the routes resolve. Install the settings and the
/// database pool first; both are picked up when the singletons are created.
pub fn build_service_provider() -> anyhow::Result<ServiceProvider> {
    ServiceCollection::new()
        .add(Settings::singleton())
        .add(DatabaseConnection::singleton())
        .add(HistoryCache::singleton())
        .add(ProviderRegistry::singleton())
        .add(DbBotRepository::scoped())
        .add(DbConversationRepository::scoped())
        .add(DbKeystrokeRepository::scoped())
        .add(StudyConversationService::scoped())
        .add(BotRegistry::scoped())
        .add(KeystrokeTelemetry::scoped())
        .build_provider()
        .map_err(|e| anyhow!("invalid service configuration: {e:?}"))
}

fn cors_layer(settings: &Settings) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    if settings.allowed_origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = settings
        .allowed_origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse::<HeaderValue>()
                .inspect_err(|_| warn!("ignoring invalid CORS origin '{origin}'"))
                .ok()
        })
        .collect();

    cors.allow_origin(origins)
}

/// The application with its middleware, bound to `provider`.
pub fn app(provider: ServiceProvider, settings: &Settings) -> Router {
    api::router()
        .layer(SetResponseHeaderLayer::overriding(
            X_FRAME_OPTIONS,
            HeaderValue::from_static("ALLOWALL"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("frame-ancestors *"),
        ))
        .layer(cors_layer(settings))
        .layer(TraceLayer::new_for_http())
        .with_provider(provider)
}
