//! Runtime settings, read from the environment (and `.env`)

use di::{inject, injectable};
use log::warn;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";

/// Settings installed by the binary (or a test) before the service provider is built.
static INSTALLED: RwLock<Option<Settings>> = RwLock::new(None);

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub bind_address: String,
    pub allowed_origins: Vec<String>,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub anthropic_api_key: String,
    pub anthropic_api_base: String,
    pub provider_timeout: Duration,
    /// Number of recent exchanges forwarded to the model on each turn.
    pub memory_length: usize,
    /// Number of messages kept in the rolling-history cache after a turn.
    pub history_cache_limit: usize,
    pub history_ttl: Duration,
    pub bots_config_path: PathBuf,
    pub media_root: PathBuf,
    pub realtime_model: String,
    pub realtime_voice: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database_url: "sqlite://chatbot.db?mode=rwc".to_owned(),
            bind_address: "0.0.0.0:8000".to_owned(),
            allowed_origins: vec!["http://localhost:3000".to_owned()],
            openai_api_key: String::new(),
            openai_api_base: DEFAULT_OPENAI_API_BASE.to_owned(),
            anthropic_api_key: String::new(),
            anthropic_api_base: DEFAULT_ANTHROPIC_API_BASE.to_owned(),
            provider_timeout: Duration::from_secs(120),
            memory_length: 5,
            history_cache_limit: 10,
            history_ttl: Duration::from_secs(3600),
            bots_config_path: PathBuf::from("config.json"),
            media_root: PathBuf::from("media"),
            realtime_model: "gpt-4o-realtime-preview-2024-12-17".to_owned(),
            realtime_voice: "alloy".to_owned(),
        }
    }
}

#[injectable]
impl Settings {
    #[inject]
    pub fn create() -> Settings {
        let installed = INSTALLED
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        installed.unwrap_or_else(Settings::from_env)
    }
}

impl Settings {
    /// Reads `.env` and the process environment.
    pub fn from_env() -> Settings {
        dotenvy::dotenv().ok();
        Settings::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Settings {
        let defaults = Settings::default();
        let string = |key: &str, default: String| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
                .unwrap_or(default)
        };
        let number = |key: &str, default: u64| match lookup(key) {
            Some(raw) => u64::from_str(raw.trim()).unwrap_or_else(|_| {
                warn!("ignoring invalid value {raw:?} for {key}, using {default}");
                default
            }),
            None => default,
        };

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or(defaults.allowed_origins);

        Settings {
            database_url: string("DATABASE_URL", defaults.database_url),
            bind_address: string("BIND_ADDRESS", defaults.bind_address),
            allowed_origins,
            openai_api_key: string("OPENAI_API_KEY", defaults.openai_api_key),
            openai_api_base: string("OPENAI_API_BASE", defaults.openai_api_base),
            anthropic_api_key: string("ANTHROPIC_API_KEY", defaults.anthropic_api_key),
            anthropic_api_base: string("ANTHROPIC_API_BASE", defaults.anthropic_api_base),
            provider_timeout: Duration::from_secs(number(
                "PROVIDER_TIMEOUT_SECS",
                defaults.provider_timeout.as_secs(),
            )),
            memory_length: number("MEMORY_LENGTH", defaults.memory_length as u64) as usize,
            history_cache_limit: number(
                "HISTORY_CACHE_LIMIT",
                defaults.history_cache_limit as u64,
            ) as usize,
            history_ttl: Duration::from_secs(number(
                "HISTORY_TTL_SECS",
                defaults.history_ttl.as_secs(),
            )),
            bots_config_path: lookup("BOTS_CONFIG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.bots_config_path),
            media_root: lookup("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_root),
            realtime_model: string("REALTIME_MODEL", defaults.realtime_model),
            realtime_voice: string("REALTIME_VOICE", defaults.realtime_voice),
        }
    }

    /// Makes every `Settings` resolved from the service provider a copy of `settings`.
    pub fn install(settings: Settings) {
        *INSTALLED.write().unwrap_or_else(PoisonError::into_inner) = Some(settings);
    }

    pub fn uninstall() {
        *INSTALLED.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
