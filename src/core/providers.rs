//! Hosted model vendors and the process-wide client registry.

use crate::core::assistant::{ChatMessage, ModelProvider, Role, join_fragments};
use crate::core::error::ProviderError;
use crate::core::traits::ModelGateway;
use crate::infrastructure::entities::ModelVendor;
use crate::infrastructure::settings::Settings;
use async_trait::async_trait;
use dashmap::DashMap;
use di::{Ref, inject, injectable};
use log::{debug, error, info};
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const ANTHROPIC_MAX_TOKENS: u32 = 1024;

/// OpenAI chat completions.
pub struct OpenAIProvider {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl OpenAIProvider {
    pub fn new(client: Client, api_base: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
        }
    }

    fn payload(&self, system_prompt: &str, messages: &[ChatMessage]) -> Value {
        let mut all_messages = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.trim().is_empty() {
            all_messages.push(json!({"role": "system", "content": system_prompt}));
        }
        all_messages.extend(
            messages
                .iter()
                .map(|msg| json!({"role": msg.role.as_str(), "content": msg.content})),
        );

        json!({
            "model": self.model,
            "messages": all_messages,
        })
    }
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("OpenAI"));
        }

        debug!(
            "calling {}/chat/completions with {} messages on {}",
            self.api_base,
            messages.len(),
            self.model
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&self.payload(system_prompt, messages))
            .send()
            .await?;

        let data = read_json("OpenAI", response).await?;

        let choices = data
            .get("choices")
            .and_then(Value::as_array)
            .filter(|choices| !choices.is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("response has no 'choices'".to_owned())
            })?;

        Ok(join_fragments(choices.iter().filter_map(|choice| {
            choice
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
        })))
    }
}

/// Anthropic messages API.
pub struct AnthropicProvider {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

impl AnthropicProvider {
    pub fn new(client: Client, api_base: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            model: model.to_owned(),
        }
    }

    fn payload(&self, system_prompt: &str, messages: &[ChatMessage]) -> Value {
        // The messages API requires the conversation to open on a user turn.
        let first_user = messages
            .iter()
            .position(|m| m.role == Role::User)
            .unwrap_or(messages.len());

        let formatted: Vec<Value> = messages[first_user..]
            .iter()
            .map(|msg| json!({"role": msg.role.as_str(), "content": msg.content}))
            .collect();

        let mut payload = json!({
            "model": self.model,
            "max_tokens": ANTHROPIC_MAX_TOKENS,
            "messages": formatted,
        });
        if !system_prompt.trim().is_empty() {
            payload["system"] = json!(system_prompt);
        }
        payload
    }
}

#[async_trait]
impl ModelProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn chat(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("Anthropic"));
        }

        debug!(
            "calling {}/messages with {} messages on {}",
            self.api_base,
            messages.len(),
            self.model
        );

        let response = self
            .client
            .post(format!("{}/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.payload(system_prompt, messages))
            .send()
            .await?;

        let data = read_json("Anthropic", response).await?;

        let blocks = data
            .get("content")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("response has no 'content'".to_owned())
            })?;

        Ok(join_fragments(
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|block| block.get("text").and_then(Value::as_str)),
        ))
    }
}

/// Parses a vendor response, turning non-2xx statuses and error documents into
/// [`ProviderError::Api`].
async fn read_json(vendor: &'static str, response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    let text = response.text().await?;

    let data: Value = serde_json::from_str(&text).map_err(|e| {
        error!("{vendor} returned non-JSON response ({status}): {text}");
        ProviderError::InvalidResponse(e.to_string())
    })?;

    if !status.is_success() || data.get("error").is_some_and(|e| !e.is_null()) {
        let message = data
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_owned();
        return Err(ProviderError::Api {
            vendor,
            status: status.as_u16(),
            message,
        });
    }

    Ok(data)
}

/// Memoizes one client per `(vendor, model)`; creation happens at most once per
/// key, under the map's shard lock.
pub struct ProviderRegistry {
    settings: Ref<Settings>,
    client: Client,
    providers: DashMap<(ModelVendor, String), Arc<dyn ModelProvider>>,
}

#[injectable(ModelGateway)]
impl ProviderRegistry {
    #[inject]
    pub fn create(settings: Ref<Settings>) -> ProviderRegistry {
        let client = Client::builder()
            .timeout(settings.provider_timeout)
            .build()
            .unwrap_or_else(|e| {
                error!("cannot apply provider timeout ({e}), using default client");
                Client::new()
            });

        ProviderRegistry {
            settings,
            client,
            providers: DashMap::new(),
        }
    }
}

impl ProviderRegistry {
    fn build(&self, vendor: ModelVendor, model_id: &str) -> Arc<dyn ModelProvider> {
        info!("creating {vendor} client for model {model_id}");
        match vendor {
            ModelVendor::OpenAI => Arc::new(OpenAIProvider::new(
                self.client.clone(),
                &self.settings.openai_api_base,
                &self.settings.openai_api_key,
                model_id,
            )),
            ModelVendor::Anthropic => Arc::new(AnthropicProvider::new(
                self.client.clone(),
                &self.settings.anthropic_api_base,
                &self.settings.anthropic_api_key,
                model_id,
            )),
        }
    }

    pub fn cached_clients(&self) -> usize {
        self.providers.len()
    }
}

#[async_trait]
impl ModelGateway for ProviderRegistry {
    fn provider(&self, vendor: ModelVendor, model_id: &str) -> Arc<dyn ModelProvider> {
        self.providers
            .entry((vendor, model_id.to_owned()))
            .or_insert_with(|| self.build(vendor, model_id))
            .clone()
    }

    async fn create_realtime_session(&self) -> Result<(u16, Value), ProviderError> {
        if self.settings.openai_api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("OpenAI"));
        }

        let response = self
            .client
            .post(format!(
                "{}/realtime/sessions",
                self.settings.openai_api_base.trim_end_matches('/')
            ))
            .bearer_auth(&self.settings.openai_api_key)
            .json(&json!({
                "model": self.settings.realtime_model,
                "voice": self.settings.realtime_voice,
            }))
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.json::<Value>().await?;
        Ok((status, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ProviderRegistry {
        ProviderRegistry::create(Ref::new(Settings::default()))
    }

    #[test]
    fn test_registry_memoizes_per_vendor_and_model() {
        let registry = registry();

        let a = registry.provider(ModelVendor::OpenAI, "gpt-4o-mini");
        let b = registry.provider(ModelVendor::OpenAI, "gpt-4o-mini");
        let c = registry.provider(ModelVendor::OpenAI, "gpt-4o");
        let d = registry.provider(ModelVendor::Anthropic, "gpt-4o");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(d.name(), "anthropic");
        assert_eq!(registry.cached_clients(), 3);
    }

    #[test]
    fn test_openai_payload_puts_system_prompt_first() {
        let provider = OpenAIProvider::new(Client::new(), "http://x/v1/", "key", "gpt-4o-mini");

        let payload = provider.payload(
            "Be brief.",
            &[ChatMessage::user("hi"), ChatMessage::assistant("hello")],
        );

        let messages = payload["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "Be brief.");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(provider.api_base, "http://x/v1");
    }

    #[test]
    fn test_anthropic_payload_opens_on_user_turn() {
        let provider = AnthropicProvider::new(Client::new(), "http://x/v1", "key", "claude");

        let payload = provider.payload(
            "Be brief.",
            &[
                ChatMessage::assistant("Welcome!"),
                ChatMessage::user("hi"),
            ],
        );

        let messages = payload["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
        assert_eq!(payload["system"], "Be brief.");
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_any_request() {
        let provider = OpenAIProvider::new(Client::new(), "http://127.0.0.1:9", "", "gpt");

        let result = provider.chat("", &[ChatMessage::user("hi")]).await;

        assert!(matches!(result, Err(ProviderError::MissingApiKey("OpenAI"))));
    }
}
