//! Qualtrics client against a mock HTTP server.

use chatbot_study_server::core::surveys::{
    ExportPolicy, IframeParams, QualtricsClient, SurveyError,
};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "qualtrics-token";

fn fast_policy() -> ExportPolicy {
    ExportPolicy {
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        max_checks: 5,
    }
}

fn ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"result": result, "meta": {"httpStatus": "200 - OK"}}))
}

#[tokio::test]
async fn test_create_survey_uploads_the_template() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/surveys"))
        .and(header("X-API-TOKEN", TOKEN))
        .respond_with(ok(json!({"id": "SV_123"})))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("study.qsf");
    std::fs::write(&template, br#"{"SurveyEntry": {}}"#).unwrap();

    let client = QualtricsClient::with_base_url(&server.uri(), TOKEN);
    let survey_id = client.create_survey("study-2025-03-01", &template).await.unwrap();

    assert_eq!(survey_id, "SV_123");
    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("study-2025-03-01"));
    assert!(body.contains("application/vnd.qualtrics.survey.qsf"));
    assert!(body.contains("filename=\"study.qsf\""));
}

#[tokio::test]
async fn test_embed_and_activate() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/survey-definitions/SV_1/questions/QID58"))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/surveys/SV_1"))
        .and(body_json(json!({"isActive": true})))
        .respond_with(ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = QualtricsClient::with_base_url(&server.uri(), TOKEN);
    client
        .embed_chatbot("SV_1", "QID58", "https://chat.example.org", &IframeParams::default())
        .await
        .unwrap();
    client.activate_survey("SV_1").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let question: Value = requests[0].body_json().unwrap();
    assert!(
        question["QuestionText"]
            .as_str()
            .unwrap()
            .contains("https://chat.example.org")
    );
}

#[tokio::test]
async fn test_api_errors_carry_status() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad token"))
        .mount(&server)
        .await;

    let client = QualtricsClient::with_base_url(&server.uri(), "wrong");
    let error = client.activate_survey("SV_1").await.unwrap_err();

    assert!(matches!(error, SurveyError::Api { status: 401, ref body } if body == "bad token"));
}

#[tokio::test]
async fn test_export_polls_until_complete_and_downloads() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/surveys/SV_1/export-responses"))
        .and(body_json(json!({"format": "csv"})))
        .respond_with(ok(json!({"progressId": "ES_1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/surveys/SV_1/export-responses/ES_1"))
        .respond_with(ok(json!({"status": "inProgress", "percentComplete": 40.0})))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/surveys/SV_1/export-responses/ES_1"))
        .respond_with(ok(json!({"status": "complete", "percentComplete": 100.0, "fileId": "F_1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/surveys/SV_1/export-responses/F_1/file"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK-archive".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let destination = dir.path().join("exports").join("SV_1.zip");

    let client = QualtricsClient::with_base_url(&server.uri(), TOKEN);
    let written = client
        .export_responses("SV_1", &destination, &fast_policy())
        .await
        .unwrap();

    assert_eq!(written, 10);
    assert_eq!(std::fs::read(&destination).unwrap(), b"PK-archive");
}

#[tokio::test]
async fn test_failed_export_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!({"progressId": "ES_1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ok(json!({"status": "failed"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = QualtricsClient::with_base_url(&server.uri(), TOKEN);
    let error = client
        .export_responses("SV_1", &dir.path().join("out.zip"), &fast_policy())
        .await
        .unwrap_err();

    assert!(matches!(error, SurveyError::ExportFailed(_)));
}

#[tokio::test]
async fn test_export_gives_up_after_bounded_checks() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!({"progressId": "ES_1"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ok(json!({"status": "inProgress"})))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = QualtricsClient::with_base_url(&server.uri(), TOKEN);
    let error = client
        .export_responses("SV_1", &dir.path().join("out.zip"), &fast_policy())
        .await
        .unwrap_err();

    assert!(matches!(error, SurveyError::ExportTimedOut(5)));
}
