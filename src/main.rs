//! Chatbot study server
//!
//! Serves the conversation, bot and telemetry APIs over HTTP.

use chatbot_study_server::core::history::HistoryCache;
use chatbot_study_server::core::traits::BotService;
use chatbot_study_server::infrastructure::database::DatabaseConnection;
use chatbot_study_server::infrastructure::seed::SeedFile;
use chatbot_study_server::infrastructure::settings::Settings;
use chatbot_study_server::{app, build_service_provider};

use anyhow::anyhow;
use di::{Ref, ServiceProvider};
use log::{debug, info};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing_subscriber::EnvFilter;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(web_server_task())
}

async fn web_server_task() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    Settings::install(settings.clone());

    let pool = DatabaseConnection::connect(&settings).await?;
    DatabaseConnection::install_pool(pool);

    let provider = build_service_provider()?;

    import_seed_bots(&provider, &settings).await?;
    tokio::spawn(purge_history(provider.get_required::<HistoryCache>()));

    let app = app(provider, &settings);

    let listener = tokio::net::TcpListener::bind(&settings.bind_address).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    info!("Shutting down...");

    Ok(())
}

/// Upserts the bots from the seed file, if there is one.
async fn import_seed_bots(provider: &ServiceProvider, settings: &Settings) -> anyhow::Result<()> {
    let path = &settings.bots_config_path;
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        debug!("no bot seed file at {}", path.display());
        return Ok(());
    }

    let bots = SeedFile::load(path).await?.into_bots()?;
    let scope = provider.create_scope();
    let imported = scope
        .get_required::<dyn BotService>()
        .import_bots(bots)
        .await
        .map_err(|e| anyhow!("importing bots from {} failed: {e}", path.display()))?;

    info!("imported {imported} bots from {}", path.display());
    Ok(())
}

async fn purge_history(history: Ref<HistoryCache>) {
    let mut interval = tokio::time::interval(PURGE_INTERVAL);
    loop {
        interval.tick().await;
        history.purge_expired();
    }
}
