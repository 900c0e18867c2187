//! Load test for a running chatbot study server
//!
//! Simulates participants chatting with randomly chosen bots and prints a
//! per-endpoint summary once all of them are done.

use chatbot_study_server::core::loadtest::{self, LoadTestConfig};

use anyhow::bail;
use clap::Parser;
use log::info;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "loadtest")]
#[command(about = "Simulated participants for the chatbot study server")]
struct Args {
    /// Base URL of the server under test
    #[arg(long, default_value = "http://localhost:8000", env = "LOADTEST_HOST")]
    host: String,

    /// Number of simulated users
    #[arg(short, long, default_value_t = 10)]
    users: usize,

    /// Chat messages sent by each user
    #[arg(short, long, default_value_t = 10)]
    messages: usize,

    #[arg(long, default_value_t = 1000)]
    min_wait_ms: u64,

    #[arg(long, default_value_t = 3000)]
    max_wait_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.min_wait_ms > args.max_wait_ms {
        bail!("--min-wait-ms must not exceed --max-wait-ms");
    }

    let report = loadtest::run(LoadTestConfig {
        host: args.host,
        users: args.users,
        messages: args.messages,
        min_wait: Duration::from_millis(args.min_wait_ms),
        max_wait: Duration::from_millis(args.max_wait_ms),
    })
    .await?;

    info!(
        "{} users completed, {} full conversations",
        report.completed_users, report.finished_conversations
    );
    for (endpoint, stats) in &report.endpoints {
        info!(
            "{endpoint}: {} ok, {} failed, mean {:.2}ms",
            stats.successes,
            stats.failures,
            stats.mean_latency().as_secs_f64() * 1000.0
        );
    }

    Ok(())
}
