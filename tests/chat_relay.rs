mod common;

use chatrelay::client::{ChatBackend, ChatSession, EntryStatus, HttpChatBackend, RegenerationCoordinator};
use chatrelay::forms::{CreateConversation, SaveMessage};
use chatrelay::models::Role;
use chatrelay::relay::{LineDecoder, StreamPart};
use common::{TestApp, TEST_TOKEN};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(app: &TestApp) -> HttpChatBackend {
    HttpChatBackend::new(reqwest::Client::new(), app.address.clone(), Some(TEST_TOKEN.to_string()))
}

async fn conversation_with_hi(backend: &HttpChatBackend) -> Uuid {
    let id = Uuid::new_v4();
    backend
        .create_conversation(CreateConversation {
            id: Some(id),
            ..Default::default()
        })
        .await
        .unwrap();
    backend
        .save_message(
            id,
            SaveMessage {
                role: Role::User,
                content: "Hi".into(),
                created_at: None,
                model_id: None,
                turn: None,
            },
        )
        .await
        .unwrap();
    id
}

async fn post_chat(app: &TestApp, path: &str, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(app.url(path))
        .bearer_auth(TEST_TOKEN)
        .json(&body)
        .send()
        .await
        .expect("Failed to execute request.")
}

fn decode(body: &[u8]) -> Vec<StreamPart> {
    LineDecoder::new().push(body).into_iter().map(Result::unwrap).collect()
}

async fn assistant_rows(app: &TestApp) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM chat_message WHERE role = 'assistant'")
        .fetch_one(&app.db_pool)
        .await
        .unwrap()
}

#[tokio::test]
async fn reply_is_streamed_then_annotated_and_saved() {
    let provider = MockServer::start().await;
    common::mount_openai_reply(&provider, &["Hel", "lo"]).await;
    let app = match common::spawn_app_with_provider(&provider).await {
        Some(app) => app,
        None => return,
    };
    let id = conversation_with_hi(&backend(&app)).await;

    let response = post_chat(
        &app,
        "/api/chat",
        json!({"messages": [{"role": "user", "content": "Hi"}], "model": "openai:gpt-4o-mini", "id": id}),
    )
    .await;
    assert!(response.status().is_success());
    let parts = decode(&response.bytes().await.unwrap());

    assert_eq!(parts[0], StreamPart::Text("Hel".into()));
    assert_eq!(parts[1], StreamPart::Text("lo".into()));
    match &parts[2] {
        StreamPart::Annotation(annotation) => {
            assert_eq!(annotation.model_name, "openai:gpt-4o-mini");
            assert_eq!(annotation.model_id, 2);
            assert!(annotation.message_id.is_some());
        }
        other => panic!("expected annotation, got {:?}", other),
    }
    assert_eq!(parts[3], StreamPart::finish("stop"));

    let transcript = backend(&app).load_transcript(id).await.unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[1].content, "Hello");
    assert_eq!(transcript[1].model_id, Some(2));
}

#[tokio::test]
async fn long_reply_is_saved_after_the_client_hangs_up() {
    let provider = MockServer::start().await;
    let words: Vec<String> = (0..40).map(|i| format!("w{} ", i)).collect();
    let script: Vec<&str> = words.iter().map(String::as_str).collect();
    common::mount_openai_reply(&provider, &script).await;
    let mut configuration = common::provider_configuration(&provider).await;
    configuration.relay.channel_capacity = 1;
    let app = match common::spawn_app_with_configuration(configuration).await {
        Some(app) => app,
        None => return,
    };
    let id = conversation_with_hi(&backend(&app)).await;

    let response = post_chat(
        &app,
        "/api/chat",
        json!({"messages": [{"role": "user", "content": "Hi"}], "model": "openai:gpt-4o-mini", "id": id}),
    )
    .await;
    assert!(response.status().is_success());
    // headers only; the body is never read
    drop(response);

    let mut saved = assistant_rows(&app).await;
    for _ in 0..50 {
        if saved > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        saved = assistant_rows(&app).await;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(saved, 1);
    assert_eq!(assistant_rows(&app).await, 1);

    let transcript = backend(&app).load_transcript(id).await.unwrap();
    assert_eq!(transcript[1].content, words.concat());
}

#[tokio::test]
async fn unknown_model_is_rejected_before_streaming() {
    let provider = MockServer::start().await;
    common::mount_openai_reply(&provider, &["never"]).await;
    let app = match common::spawn_app_with_provider(&provider).await {
        Some(app) => app,
        None => return,
    };
    let id = conversation_with_hi(&backend(&app)).await;

    let response = post_chat(
        &app,
        "/api/chat",
        json!({"messages": [{"role": "user", "content": "Hi"}], "model": "unknown:foo", "id": id}),
    )
    .await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Unsupported model provider for ID: unknown:foo");
    assert_eq!(assistant_rows(&app).await, 0);
}

#[tokio::test]
async fn provider_route_rejects_a_foreign_slug() {
    let provider = MockServer::start().await;
    let app = match common::spawn_app_with_provider(&provider).await {
        Some(app) => app,
        None => return,
    };

    let response = post_chat(
        &app,
        "/api/chat/google",
        json!({"messages": [{"role": "user", "content": "Hi"}], "model": "openai:gpt-4o-mini"}),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

    let response = post_chat(
        &app,
        "/api/chat/nope",
        json!({"messages": [{"role": "user", "content": "Hi"}], "model": "openai:gpt-4o-mini"}),
    )
    .await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failing_provider_is_a_bad_gateway() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&provider)
        .await;
    let app = match common::spawn_app_with_provider(&provider).await {
        Some(app) => app,
        None => return,
    };

    let response = post_chat(
        &app,
        "/api/chat/openai",
        json!({"messages": [{"role": "user", "content": "Hi"}], "model": "openai:gpt-4o-mini"}),
    )
    .await;

    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Upstream provider unavailable"));
}

#[tokio::test]
async fn empty_history_is_invalid() {
    let provider = MockServer::start().await;
    let app = match common::spawn_app_with_provider(&provider).await {
        Some(app) => app,
        None => return,
    };

    let response = post_chat(&app, "/api/chat", json!({"messages": [], "model": "openai:gpt-4o-mini"})).await;
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn regenerations_accumulate_in_the_response_set() {
    let provider = MockServer::start().await;
    common::mount_openai_reply(&provider, &["Hello"]).await;
    let app = match common::spawn_app_with_provider(&provider).await {
        Some(app) => app,
        None => return,
    };
    let backend = backend(&app);
    let id = conversation_with_hi(&backend).await;
    let mut coordinator = RegenerationCoordinator::new();

    for model in ["openai:chatgpt-4o-latest", "openai:gpt-4o-mini"] {
        let transcript = backend.load_transcript(id).await.unwrap();
        coordinator.regenerate(&backend, id, 0, model, &transcript).await.unwrap();
    }

    let set = backend.load_response_set(id, 0).await.unwrap();
    let models: Vec<Option<i32>> = set.iter().map(|m| m.model_id).collect();
    assert_eq!(models, vec![Some(1), Some(2)]);

    let carousel = coordinator.carousel_mut(0).unwrap();
    assert_eq!(carousel.current().unwrap().model_id, Some(2));
    assert_eq!(carousel.previous().unwrap().model_id, Some(1));
}

#[tokio::test]
async fn new_conversation_gets_exactly_one_automatic_reply() {
    let provider = MockServer::start().await;
    common::mount_openai_reply(&provider, &["Hi ", "there"]).await;
    let app = match common::spawn_app_with_provider(&provider).await {
        Some(app) => app,
        None => return,
    };
    let backend = Arc::new(backend(&app));
    let mut session = ChatSession::new(backend.clone(), "openai:gpt-4o-mini");

    let id = session.start_conversation("Hello", None).await.unwrap();
    assert!(!session.open(id).await.unwrap());
    assert!(!session.auto_respond().await.unwrap());

    assert_eq!(assistant_rows(&app).await, 1);
    assert_eq!(session.entries()[1].content, "Hi there");
    assert!(matches!(session.entries()[1].status, EntryStatus::Saved(_)));
}

#[tokio::test]
async fn first_message_names_the_conversation() {
    let provider = MockServer::start().await;
    common::mount_openai_reply(&provider, &["\"Weather in Paris\""]).await;
    let mut configuration = common::test_configuration().await;
    configuration.providers.openai.base_url = format!("{}/v1", provider.uri());
    configuration.providers.openai.api_key = Some("sk-test".to_string());
    configuration.title.enabled = true;
    let app = match common::spawn_app_with_configuration(configuration).await {
        Some(app) => app,
        None => return,
    };

    let id = conversation_with_hi(&backend(&app)).await;

    let mut title = String::new();
    for _ in 0..20 {
        title = sqlx::query_scalar("SELECT title FROM chat WHERE id = $1")
            .bind(id)
            .fetch_one(&app.db_pool)
            .await
            .unwrap();
        if title != "New Chat" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(title, "Weather in Paris");
}
