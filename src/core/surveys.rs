//! Qualtrics REST v3 client used to set up and collect the study surveys.
//!
//! A study survey is created from an exported `.qsf` template, its chatbot
//! question is rewritten to embed this server in an iframe, and it is then
//! activated. Responses are exported as a CSV archive.

use log::{debug, info};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const API_TOKEN_HEADER: &str = "X-API-TOKEN";
const QSF_MIME: &str = "application/vnd.qualtrics.survey.qsf";

#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Qualtrics returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("response export failed with status '{0}'")]
    ExportFailed(String),

    #[error("response export not ready after {0} checks")]
    ExportTimedOut(u32),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Query-string parameter names the survey platform forwards to the iframe.
#[derive(Debug, Clone)]
pub struct IframeParams {
    pub worker_id: String,
    pub assignment_id: String,
    pub response_id: String,
}

impl Default for IframeParams {
    fn default() -> Self {
        IframeParams {
            worker_id: "workerId".to_owned(),
            assignment_id: "assignmentId".to_owned(),
            response_id: "responseId".to_owned(),
        }
    }
}

/// Delay between export progress checks doubles up to `max_delay`.
#[derive(Debug, Clone)]
pub struct ExportPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_checks: u32,
}

impl Default for ExportPolicy {
    fn default() -> Self {
        ExportPolicy {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            max_checks: 40,
        }
    }
}

impl ExportPolicy {
    pub fn delay(&self, check: u32) -> Duration {
        let factor = 2u32.saturating_pow(check.min(16));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// The descriptive-text question that hosts the chat page.
pub fn iframe_question(server_url: &str, question_id: &str, params: &IframeParams) -> Value {
    let html = format!(
        r#"<!DOCTYPE html>
<html>
  <body>
    <iframe id="chatbotIframe" allowfullscreen="" frameborder="0" marginwidth="0" marginheight="0"
            scrolling="NO" style="width: min(75vw, 1400px); height: 100vh;"></iframe>
  </body>
  <script>
    const params = new URLSearchParams(document.location.search);
    const workerID = params.get("{worker}") || "workerid-not-found";
    const assignmentID = params.get("{assignment}") || "assignmentid-not-found";
    const responseID = params.get("{response}") || "responseid-not-found";
    document.getElementById("chatbotIframe").src = "{server_url}"
      + "?worker_id=" + workerID + "&assignment_id=" + assignmentID + "&response_id=" + responseID;
  </script>
</html>"#,
        worker = params.worker_id,
        assignment = params.assignment_id,
        response = params.response_id,
    );

    json!({
        "QuestionText": html,
        "DefaultChoices": false,
        "DataExportTag": "chatbot_display_container",
        "QuestionType": "DB",
        "Selector": "TB",
        "Configuration": {"QuestionDescriptionOption": "UseText"},
        "QuestionDescription": "Chatbot section container",
        "ChoiceOrder": [],
        "Validation": {"Settings": {"Type": "None"}},
        "GradingData": [],
        "Language": [],
        "NextChoiceId": 4,
        "NextAnswerId": 1,
        "QuestionID": question_id,
        "DataVisibility": {"Private": false, "Hidden": false},
    })
}

pub struct QualtricsClient {
    client: Client,
    base_url: String,
    api_token: String,
}

fn result_field(body: &Value, field: &str) -> Result<String, SurveyError> {
    body.get("result")
        .and_then(|result| result.get(field))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| SurveyError::InvalidResponse(format!("missing 'result.{field}'")))
}

impl QualtricsClient {
    /// Client for `https://{datacenter}.qualtrics.com/API/v3`.
    pub fn new(datacenter: &str, api_token: &str) -> Self {
        Self::with_base_url(
            &format!("https://{datacenter}.qualtrics.com/API/v3"),
            api_token,
        )
    }

    pub fn with_base_url(base_url: &str, api_token: &str) -> Self {
        QualtricsClient {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_token: api_token.to_owned(),
        }
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(API_TOKEN_HEADER, &self.api_token)
    }

    async fn checked(response: Response) -> Result<Response, SurveyError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(SurveyError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }

    async fn send_json(&self, builder: RequestBuilder) -> Result<Value, SurveyError> {
        let response = Self::checked(self.request(builder).send().await?).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| SurveyError::InvalidResponse(e.to_string()))
    }

    /// Uploads a `.qsf` template as a new survey and returns the survey id.
    pub async fn create_survey(&self, name: &str, template: &Path) -> Result<String, SurveyError> {
        let contents = tokio::fs::read(template).await?;
        let file_name = template
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "template.qsf".to_owned());

        let form = Form::new().text("name", name.to_owned()).part(
            "file",
            Part::bytes(contents)
                .file_name(file_name)
                .mime_str(QSF_MIME)?,
        );

        let body = self
            .send_json(
                self.client
                    .post(format!("{}/surveys", self.base_url))
                    .multipart(form),
            )
            .await?;

        let survey_id = result_field(&body, "id")?;
        info!("created survey {survey_id} ({name})");
        Ok(survey_id)
    }

    /// Points the chatbot question of the survey at `server_url`.
    pub async fn embed_chatbot(
        &self,
        survey_id: &str,
        question_id: &str,
        server_url: &str,
        params: &IframeParams,
    ) -> Result<(), SurveyError> {
        self.send_json(
            self.client
                .put(format!(
                    "{}/survey-definitions/{survey_id}/questions/{question_id}",
                    self.base_url
                ))
                .json(&iframe_question(server_url, question_id, params)),
        )
        .await?;

        info!("survey {survey_id}: question {question_id} now embeds {server_url}");
        Ok(())
    }

    pub async fn activate_survey(&self, survey_id: &str) -> Result<(), SurveyError> {
        self.send_json(
            self.client
                .put(format!("{}/surveys/{survey_id}", self.base_url))
                .json(&json!({"isActive": true})),
        )
        .await?;

        info!("survey {survey_id} activated");
        Ok(())
    }

    /// Exports all responses as CSV and writes the downloaded archive to `destination`.
    pub async fn export_responses(
        &self,
        survey_id: &str,
        destination: &Path,
        policy: &ExportPolicy,
    ) -> Result<u64, SurveyError> {
        let exports = format!("{}/surveys/{survey_id}/export-responses", self.base_url);

        let started = self
            .send_json(self.client.post(&exports).json(&json!({"format": "csv"})))
            .await?;
        let progress_id = result_field(&started, "progressId")?;

        let mut file_id = None;
        for check in 0..policy.max_checks {
            let progress = self
                .send_json(self.client.get(format!("{exports}/{progress_id}")))
                .await?;
            let status = result_field(&progress, "status")?;
            debug!("export {progress_id}: {status}");

            match status.as_str() {
                "complete" => {
                    file_id = Some(result_field(&progress, "fileId")?);
                    break;
                }
                "failed" => return Err(SurveyError::ExportFailed(status)),
                _ => tokio::time::sleep(policy.delay(check)).await,
            }
        }
        let file_id = file_id.ok_or(SurveyError::ExportTimedOut(policy.max_checks))?;

        let response = Self::checked(
            self.request(self.client.get(format!("{exports}/{file_id}/file")))
                .send()
                .await?,
        )
        .await?;
        let bytes = response.bytes().await?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(destination, &bytes).await?;

        info!(
            "exported responses of {survey_id} to {} ({} bytes)",
            destination.display(),
            bytes.len()
        );
        Ok(bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_delay_doubles_up_to_the_cap() {
        let policy = ExportPolicy {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            max_checks: 10,
        };

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(1), Duration::from_millis(200));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(3), Duration::from_millis(500));
        assert_eq!(policy.delay(40), Duration::from_millis(500));
    }

    #[test]
    fn test_iframe_question_forwards_survey_parameters() {
        let question = iframe_question(
            "https://chat.example.org",
            "QID58",
            &IframeParams::default(),
        );

        let html = question["QuestionText"].as_str().unwrap();
        assert!(html.contains("\"https://chat.example.org\""));
        assert!(html.contains("params.get(\"workerId\")"));
        assert!(html.contains("params.get(\"responseId\")"));
        assert_eq!(question["QuestionID"], "QID58");
        assert_eq!(question["DataExportTag"], "chatbot_display_container");
    }
}
