//! Database and schema tests
//!
//! Tests SQLite migrations, schema constraints and the repositories as resolved
//! from the service provider.

use chatbot_study_server::build_service_provider;
use chatbot_study_server::infrastructure::database::DatabaseConnection;
use chatbot_study_server::infrastructure::entities::{
    Conversation, ModelVendor, NewBot, NewUtterance, Speaker,
};
use chatbot_study_server::infrastructure::settings::Settings;
use chatbot_study_server::infrastructure::traits::{BotRepository, ConversationRepository};
use chrono::Utc;
use serial_test::serial;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

/// Setup test database with migrations. A single connection keeps every query
/// on the same in-memory database.
async fn setup_test_db() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    sqlx::migrate!().run(&pool).await.unwrap();
    pool
}

fn conversation(conversation_id: &str) -> Conversation {
    Conversation {
        conversation_id: conversation_id.to_owned(),
        bot_name: "helper".to_owned(),
        participant_id: "p1".to_owned(),
        initial_utterance: None,
        study_name: None,
        user_group: None,
        survey_id: None,
        survey_meta_data: None,
        bot_prompt: "Be kind.".to_owned(),
        model_type: ModelVendor::Anthropic,
        model_id: "claude-3-5-haiku-latest".to_owned(),
        started_time: Utc::now(),
    }
}

fn new_bot(name: &str, prompt: &str) -> NewBot {
    NewBot {
        name: name.to_owned(),
        prompt: prompt.to_owned(),
        model_type: ModelVendor::OpenAI,
        model_id: "gpt-4o-mini".to_owned(),
        initial_utterance: None,
    }
}

#[tokio::test]
async fn test_database_migrations_work() {
    let pool = setup_test_db().await;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE '\\_%' ESCAPE '\\' AND name != 'sqlite_sequence' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(tables, vec!["bots", "conversations", "keystrokes", "utterances"]);
}

#[tokio::test]
async fn test_bot_names_are_unique() {
    let pool = setup_test_db().await;

    let insert = "INSERT INTO bots (name, prompt, model_type, model_id) VALUES ('helper', '', 'OpenAI', 'gpt-4o-mini')";
    sqlx::query(insert).execute(&pool).await.unwrap();
    let error = sqlx::query(insert).execute(&pool).await.unwrap_err();

    assert!(chatbot_study_server::core::error::is_unique_violation(&error));
}

#[tokio::test]
async fn test_utterances_require_a_conversation() {
    let pool = setup_test_db().await;

    let result = sqlx::query(
        "INSERT INTO utterances (conversation_id, speaker_id, text, created_time) VALUES ('nope', 'user', 'hi', ?)",
    )
    .bind(Utc::now())
    .execute(&pool)
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_conversation_cascade_delete() {
    let pool = setup_test_db().await;

    sqlx::query(
        "INSERT INTO conversations (conversation_id, bot_name, participant_id, model_type, model_id, started_time) VALUES ('c1', 'helper', 'p1', 'OpenAI', 'gpt-4o-mini', ?)",
    )
    .bind(Utc::now())
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "INSERT INTO utterances (conversation_id, speaker_id, text, created_time) VALUES ('c1', 'user', 'hi', ?)",
    )
    .bind(Utc::now())
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query("DELETE FROM conversations WHERE conversation_id = 'c1'")
        .execute(&pool)
        .await
        .unwrap();

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM utterances WHERE conversation_id = 'c1'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count.0, 0);
}

#[tokio::test]
#[serial]
async fn test_repositories_round_trip_through_the_service_provider() {
    let pool = setup_test_db().await;
    DatabaseConnection::install_pool(pool.clone());
    Settings::install(Settings::default());

    let provider = build_service_provider().unwrap();
    let scope = provider.create_scope();
    let bots = scope.get_required::<dyn BotRepository>();
    let conversations = scope.get_required::<dyn ConversationRepository>();

    let created = bots.create_bot(new_bot("helper", "v1")).await.unwrap();
    let upserted = bots.upsert_bot_by_name(new_bot("helper", "v2")).await.unwrap();
    assert_eq!(created.id, upserted.id);
    assert_eq!(upserted.prompt, "v2");
    assert_eq!(bots.list_bots().await.unwrap().len(), 1);

    let stored = conversations
        .create_conversation(conversation("c1"))
        .await
        .unwrap();
    assert_eq!(stored.model_type, ModelVendor::Anthropic);

    let utterances = conversations
        .create_utterances(vec![
            NewUtterance::from_participant("c1", "p1", "hello".to_owned()),
            NewUtterance::from_bot("c1", "helper", "hi there".to_owned()),
        ])
        .await
        .unwrap();
    assert_eq!(utterances.len(), 2);

    let transcript = conversations.list_utterances("c1").await.unwrap();
    let speakers: Vec<Speaker> = transcript.iter().map(|u| u.speaker_id).collect();
    assert_eq!(speakers, vec![Speaker::User, Speaker::Assistant]);
    assert!(transcript[0].id < transcript[1].id);

    assert!(bots.delete_bot(created.id).await.unwrap());
    assert!(!bots.delete_bot(created.id).await.unwrap());

    DatabaseConnection::clear_installed_pool();
    Settings::uninstall();
}

#[tokio::test]
#[serial]
async fn test_failed_batch_leaves_no_utterances() {
    let pool = setup_test_db().await;
    DatabaseConnection::install_pool(pool.clone());
    Settings::install(Settings::default());

    let provider = build_service_provider().unwrap();
    let scope = provider.create_scope();
    let conversations = scope.get_required::<dyn ConversationRepository>();
    conversations
        .create_conversation(conversation("c1"))
        .await
        .unwrap();

    let result = conversations
        .create_utterances(vec![
            NewUtterance::from_participant("c1", "p1", "kept?".to_owned()),
            NewUtterance::from_bot("missing", "helper", "orphan".to_owned()),
        ])
        .await;

    assert!(result.is_err());
    assert!(conversations.list_utterances("c1").await.unwrap().is_empty());

    DatabaseConnection::clear_installed_pool();
    Settings::uninstall();
}
