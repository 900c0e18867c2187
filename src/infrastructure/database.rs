//! Pooled SQLite connection

use crate::infrastructure::settings::Settings;
use di::{Ref, inject, injectable};
use log::info;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

/// Pool installed by the binary (after migrating) or by a test.
static INSTALLED_POOL: RwLock<Option<SqlitePool>> = RwLock::new(None);

pub struct DatabaseConnection {
    connection: SqlitePool,
}

#[injectable]
impl DatabaseConnection {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> DatabaseConnection {
        let installed = INSTALLED_POOL
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let pool = installed.unwrap_or_else(|| {
            // `connect` validates the URL before anything is installed, so this
            // only runs for providers built without an installed pool.
            let options = SqliteConnectOptions::from_str(&settings.database_url)
                .unwrap_or_else(|_| SqliteConnectOptions::new().filename(&settings.database_url));
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_lazy_with(options)
        });

        DatabaseConnection { connection: pool }
    }
}

impl DatabaseConnection {
    /// Opens the pool described by the settings and applies pending migrations.
    pub async fn connect(settings: &Settings) -> anyhow::Result<SqlitePool> {
        let options = SqliteConnectOptions::from_str(&settings.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::migrate!().run(&pool).await?;
        info!("database ready at {}", settings.database_url);

        Ok(pool)
    }

    /// Every `DatabaseConnection` resolved afterwards shares `pool`.
    pub fn install_pool(pool: SqlitePool) {
        *INSTALLED_POOL
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(pool);
    }

    pub fn clear_installed_pool() {
        *INSTALLED_POOL
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Deref for DatabaseConnection {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.connection
    }
}

impl DerefMut for DatabaseConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.connection
    }
}
