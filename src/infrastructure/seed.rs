//! Bot seed file (`config.json`) format.
//!
//! The file is only an import format: its bots are upserted into the database at
//! startup and the database stays the single source of truth afterwards.

use crate::infrastructure::entities::{ModelVendor, NewBot};
use anyhow::{Context, anyhow};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub default_model_config: Option<DefaultModelConfig>,
    #[serde(default)]
    pub bots: Vec<SeedBot>,
}

#[derive(Debug, Deserialize)]
pub struct DefaultModelConfig {
    #[serde(rename = "type")]
    pub model_type: String,
    pub model_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SeedBot {
    pub name: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, alias = "type")]
    pub model_type: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub initial_utterance: Option<String>,
}

impl SeedFile {
    pub async fn load(path: &Path) -> anyhow::Result<SeedFile> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("cannot read bot seed file {}", path.display()))?;

        SeedFile::parse(&raw).with_context(|| format!("invalid bot seed file {}", path.display()))
    }

    pub fn parse(raw: &str) -> anyhow::Result<SeedFile> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Resolves every bot against `default_model_config`.
    pub fn into_bots(self) -> anyhow::Result<Vec<NewBot>> {
        let default = self.default_model_config;

        self.bots
            .into_iter()
            .map(|bot| {
                let model_type = bot
                    .model_type
                    .or_else(|| default.as_ref().map(|d| d.model_type.clone()))
                    .ok_or_else(|| anyhow!("bot '{}' has no model type", bot.name))?;
                let model_id = bot
                    .model_id
                    .or_else(|| default.as_ref().map(|d| d.model_id.clone()))
                    .ok_or_else(|| anyhow!("bot '{}' has no model id", bot.name))?;

                Ok(NewBot {
                    model_type: model_type
                        .parse::<ModelVendor>()
                        .map_err(|e| anyhow!("bot '{}': {e}", bot.name))?,
                    name: bot.name,
                    prompt: bot.prompt,
                    model_id,
                    initial_utterance: bot.initial_utterance,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bots_inherit_default_model_config() {
        let seed = SeedFile::parse(
            r#"{
                "default_model_config": {"type": "OpenAI", "model_id": "gpt-4o-mini"},
                "bots": [
                    {"name": "Friendly", "prompt": "Be kind."},
                    {"name": "Critic", "prompt": "Be blunt.", "model_type": "Anthropic", "model_id": "claude-3-5-haiku-latest"}
                ]
            }"#,
        )
        .unwrap();

        let bots = seed.into_bots().unwrap();

        assert_eq!(bots.len(), 2);
        assert_eq!(bots[0].model_type, ModelVendor::OpenAI);
        assert_eq!(bots[0].model_id, "gpt-4o-mini");
        assert_eq!(bots[1].model_type, ModelVendor::Anthropic);
        assert_eq!(bots[1].model_id, "claude-3-5-haiku-latest");
    }

    #[test]
    fn test_bot_without_model_and_without_default_is_rejected() {
        let seed = SeedFile::parse(r#"{"bots": [{"name": "Orphan", "prompt": ""}]}"#).unwrap();

        let error = seed.into_bots().unwrap_err();
        assert!(error.to_string().contains("Orphan"));
    }

    #[test]
    fn test_unknown_vendor_is_rejected() {
        let seed = SeedFile::parse(
            r#"{"bots": [{"name": "Local", "type": "llama", "model_id": "3b"}]}"#,
        )
        .unwrap();

        assert!(seed.into_bots().is_err());
    }

    #[test]
    fn test_empty_file_has_no_bots() {
        let seed = SeedFile::parse("{}").unwrap();
        assert!(seed.into_bots().unwrap().is_empty());
    }
}
