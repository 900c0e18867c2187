//! Qualtrics survey administration for chatbot studies

use chatbot_study_server::core::surveys::{ExportPolicy, IframeParams, QualtricsClient};

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "survey-admin")]
#[command(about = "Create, activate and export the Qualtrics surveys of a chatbot study")]
struct Args {
    /// Qualtrics datacenter id, e.g. `ca1`
    #[arg(long, env = "QUALTRICS_DATACENTER_ID")]
    datacenter: String,

    #[arg(long, env = "QUALTRICS_API_TOKEN", hide_env_values = true)]
    api_token: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates a survey from a .qsf template and embeds the chatbot in it
    Create {
        #[arg(long)]
        name: String,

        #[arg(long)]
        template: PathBuf,

        /// URL of the chat page the survey embeds
        #[arg(long, env = "CHATBOT_SERVER_URL")]
        server_url: String,

        /// Id of the iframe question in the template
        #[arg(long, default_value = "QID58")]
        question_id: String,

        #[arg(long, default_value = "workerId")]
        worker_id_param: String,

        #[arg(long, default_value = "assignmentId")]
        assignment_id_param: String,

        #[arg(long, default_value = "responseId")]
        response_id_param: String,

        /// Activate the survey once it is created
        #[arg(long)]
        activate: bool,
    },
    /// Activates existing surveys
    Activate { survey_ids: Vec<String> },
    /// Downloads all responses of a survey as a CSV archive
    Export {
        survey_id: String,

        #[arg(long, short)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let client = QualtricsClient::new(&args.datacenter, &args.api_token);

    match args.command {
        Command::Create {
            name,
            template,
            server_url,
            question_id,
            worker_id_param,
            assignment_id_param,
            response_id_param,
            activate,
        } => {
            let survey_id = client
                .create_survey(&name, &template)
                .await
                .with_context(|| format!("creating survey from {}", template.display()))?;

            let params = IframeParams {
                worker_id: worker_id_param,
                assignment_id: assignment_id_param,
                response_id: response_id_param,
            };
            client
                .embed_chatbot(&survey_id, &question_id, &server_url, &params)
                .await
                .context("updating the chatbot question")?;

            if activate {
                client.activate_survey(&survey_id).await?;
            }
            info!("Done creating survey {survey_id} on {server_url}");
        }
        Command::Activate { survey_ids } => {
            for survey_id in survey_ids {
                client
                    .activate_survey(&survey_id)
                    .await
                    .with_context(|| format!("activating {survey_id}"))?;
            }
        }
        Command::Export { survey_id, output } => {
            client
                .export_responses(&survey_id, &output, &ExportPolicy::default())
                .await
                .with_context(|| format!("exporting responses of {survey_id}"))?;
        }
    }

    Ok(())
}
