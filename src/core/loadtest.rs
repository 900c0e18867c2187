//! Load-test harness: simulated participants running a full conversation each.
//!
//! Every user lists the bots, picks one at random, starts a conversation and
//! sends a fixed number of scripted messages with a random think time between
//! requests. The run ends once every user has reported completion.

use chrono::Utc;
use log::{error, info};
use rand::Rng;
use rand::seq::IndexedRandom;
use reqwest::{Client, Response};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

pub const BOTS_ENDPOINT: &str = "GET /api/bots/";
pub const INITIALIZE_ENDPOINT: &str = "POST /api/initialize_conversation/";
pub const CHAT_ENDPOINT: &str = "POST /api/chatbot/";

#[derive(Debug, Clone)]
pub struct LoadTestConfig {
    /// Base URL of the server under test, e.g. `http://localhost:8000`.
    pub host: String,
    pub users: usize,
    pub messages: usize,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointStats {
    pub successes: u64,
    pub failures: u64,
    pub total_latency: Duration,
}

impl EndpointStats {
    pub fn requests(&self) -> u64 {
        self.successes + self.failures
    }

    pub fn mean_latency(&self) -> Duration {
        match self.requests() {
            0 => Duration::ZERO,
            n => self.total_latency / n as u32,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadTestReport {
    pub endpoints: BTreeMap<&'static str, EndpointStats>,
    pub completed_users: usize,
    pub finished_conversations: usize,
}

#[derive(Default)]
struct Recorder {
    endpoints: Mutex<BTreeMap<&'static str, EndpointStats>>,
    finished_conversations: Mutex<usize>,
}

impl Recorder {
    fn record(&self, endpoint: &'static str, success: bool, latency: Duration) {
        let mut endpoints = self
            .endpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let stats = endpoints.entry(endpoint).or_default();
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }
        stats.total_latency += latency;
    }
}

/// Counts users that have stopped and wakes the runner when the last one does.
struct Completion {
    completed: Mutex<usize>,
    total: usize,
    all_done: Notify,
}

impl Completion {
    fn user_stopped(&self) {
        let mut completed = self.completed.lock().unwrap_or_else(PoisonError::into_inner);
        *completed += 1;
        info!("user completed conversation. Total completed: {}/{}", *completed, self.total);
        if *completed >= self.total {
            info!("all users have completed their conversation, stopping test");
            self.all_done.notify_one();
        }
    }

    fn completed(&self) -> usize {
        *self.completed.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct SimulatedUser {
    id: usize,
    client: Client,
    config: Arc<LoadTestConfig>,
    recorder: Arc<Recorder>,
}

fn stamp() -> String {
    Utc::now().format("%Y%m%d%H%M%S").to_string()
}

fn random_suffix() -> u32 {
    rand::rng().random_range(1000..=9999)
}

fn think_time(config: &LoadTestConfig) -> Duration {
    if config.max_wait <= config.min_wait {
        return config.min_wait;
    }
    rand::rng().random_range(config.min_wait..=config.max_wait)
}

fn pick_bot(bots: &[String]) -> Option<String> {
    bots.choose(&mut rand::rng()).cloned()
}

/// The scripted message for the `n`-th turn, counting from one.
pub fn scripted_message(n: usize) -> String {
    format!("Message {n}: How are you?")
}

impl SimulatedUser {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.host.trim_end_matches('/'))
    }

    /// Sends the request and records it; only 200 counts as success.
    async fn timed(
        &self,
        endpoint: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Option<Response> {
        let started = Instant::now();
        let outcome = request.send().await;
        let latency = started.elapsed();

        match outcome {
            Ok(response) if response.status().is_success() => {
                self.recorder.record(endpoint, true, latency);
                Some(response)
            }
            Ok(response) => {
                error!(
                    "request failure: {endpoint} took {:.2}ms, status {}",
                    latency.as_secs_f64() * 1000.0,
                    response.status()
                );
                self.recorder.record(endpoint, false, latency);
                None
            }
            Err(e) => {
                error!("request failure: {endpoint}: {e}");
                self.recorder.record(endpoint, false, latency);
                None
            }
        }
    }

    async fn fetch_bots(&self) -> Vec<String> {
        let Some(response) = self
            .timed(BOTS_ENDPOINT, self.client.get(self.url("/api/bots/")))
            .await
        else {
            return Vec::new();
        };

        match response.json::<Value>().await {
            Ok(body) => body
                .get("bots")
                .and_then(Value::as_array)
                .map(|bots| {
                    bots.iter()
                        .filter_map(|bot| bot.get("name").and_then(Value::as_str))
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            Err(e) => {
                error!("user {}: unreadable bot list: {e}", self.id);
                Vec::new()
            }
        }
    }

    async fn initialize_conversation(&self, bot_name: &str, participant_id: &str) -> Option<String> {
        let payload = json!({
            "bot_name": bot_name,
            "participant_id": participant_id,
            "conversation_id": format!("conv_{}_{}_{}", stamp(), self.id, random_suffix()),
            "study_name": "study1",
            "user_group": "group1",
            "survey_id": "survey1",
            "survey_meta_data": "meta",
        });

        let response = self
            .timed(
                INITIALIZE_ENDPOINT,
                self.client
                    .post(self.url("/api/initialize_conversation/"))
                    .json(&payload),
            )
            .await?;

        let body = response.json::<Value>().await.ok()?;
        body.get("conversation_id")
            .and_then(Value::as_str)
            .map(str::to_owned)
    }

    async fn run(self) {
        let participant_id = format!("test_{}_{}", stamp(), random_suffix());

        let bots = self.fetch_bots().await;
        let Some(bot_name) = pick_bot(&bots) else {
            error!("user {}: no bots available for conversation", self.id);
            return;
        };

        tokio::time::sleep(think_time(&self.config)).await;
        let Some(conversation_id) = self.initialize_conversation(&bot_name, &participant_id).await
        else {
            error!("user {}: failed to initialize conversation with {bot_name}", self.id);
            return;
        };

        for n in 1..=self.config.messages {
            tokio::time::sleep(think_time(&self.config)).await;
            let payload = json!({
                "message": scripted_message(n),
                "bot_name": bot_name,
                "conversation_id": conversation_id,
                "participant_id": participant_id,
            });
            self.timed(
                CHAT_ENDPOINT,
                self.client.post(self.url("/api/chatbot/")).json(&payload),
            )
            .await;
        }

        *self
            .recorder
            .finished_conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner) += 1;
        info!(
            "conversation completed for participant {participant_id} with bot {bot_name}"
        );
    }
}

/// Runs every simulated user to completion and returns the per-endpoint tally.
pub async fn run(config: LoadTestConfig) -> anyhow::Result<LoadTestReport> {
    let client = Client::builder().build()?;
    let config = Arc::new(config);
    let recorder = Arc::new(Recorder::default());
    let completion = Arc::new(Completion {
        completed: Mutex::new(0),
        total: config.users,
        all_done: Notify::new(),
    });

    info!(
        "starting {} users against {} with {} messages each",
        config.users, config.host, config.messages
    );

    for id in 0..config.users {
        let user = SimulatedUser {
            id,
            client: client.clone(),
            config: config.clone(),
            recorder: recorder.clone(),
        };
        let completion = completion.clone();
        tokio::spawn(async move {
            user.run().await;
            completion.user_stopped();
        });
    }

    if config.users > 0 {
        completion.all_done.notified().await;
    }

    let endpoints = recorder
        .endpoints
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let finished_conversations = *recorder
        .finished_conversations
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    Ok(LoadTestReport {
        endpoints,
        completed_users: completion.completed(),
        finished_conversations,
    })
}
