#![allow(dead_code)]

use actix_web::{get, web, App, HttpServer, Responder};
use chatrelay::configuration::{get_configuration, DatabaseSettings, Settings};
use chatrelay::forms;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::net::TcpListener;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_USER_ID: &str = "test_user_id";
pub const TEST_TOKEN: &str = "test-token";

pub struct TestApp {
    pub address: String,
    pub db_pool: PgPool,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}

pub async fn spawn_app_with_configuration(mut configuration: Settings) -> Option<TestApp> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);
    configuration.database.database_name = uuid::Uuid::new_v4().to_string();

    let connection_pool = match configure_database(&configuration.database).await {
        Ok(pool) => pool,
        Err(err) => {
            eprintln!("Skipping tests: failed to connect to postgres: {}", err);
            return None;
        }
    };

    let server = chatrelay::startup::run(listener, connection_pool.clone(), configuration)
        .await
        .expect("Failed to bind address.");

    let _ = tokio::spawn(server);
    println!("Used Port: {}", port);

    Some(TestApp {
        address,
        db_pool: connection_pool,
    })
}

/// Configuration with a mock identity service; titles are off so tests
/// only see the provider calls they make.
pub async fn test_configuration() -> Settings {
    let mut configuration = get_configuration().expect("Failed to get configuration");

    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to bind port for testing auth server");
    configuration.auth_url = format!("http://127.0.0.1:{}/me", listener.local_addr().unwrap().port());
    println!("Auth Server is running on: {}", configuration.auth_url);

    let _ = tokio::spawn(mock_auth_server(listener));
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    configuration.title.enabled = false;
    configuration
}

pub async fn spawn_app() -> Option<TestApp> {
    spawn_app_with_configuration(test_configuration().await).await
}

/// Test configuration whose OpenAI endpoint is `provider`.
pub async fn provider_configuration(provider: &MockServer) -> Settings {
    let mut configuration = test_configuration().await;
    configuration.providers.openai.base_url = format!("{}/v1", provider.uri());
    configuration.providers.openai.api_key = Some("sk-test".to_string());
    configuration
}

pub async fn spawn_app_with_provider(provider: &MockServer) -> Option<TestApp> {
    spawn_app_with_configuration(provider_configuration(provider).await).await
}

pub async fn configure_database(config: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
    let mut connection = PgConnection::connect(&config.connection_string_without_db()).await?;

    connection
        .execute(format!(r#"CREATE DATABASE "{}""#, config.database_name).as_str())
        .await?;

    let connection_pool = PgPool::connect(&config.connection_string()).await?;

    sqlx::migrate!("./migrations").run(&connection_pool).await?;

    Ok(connection_pool)
}

/// OpenAI style SSE body streaming `parts` and a stop.
pub fn openai_sse(parts: &[&str]) -> String {
    let mut body = String::new();
    for part in parts {
        let chunk = serde_json::json!({"choices": [{"delta": {"content": part}, "finish_reason": null}]});
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

pub async fn mount_openai_reply(provider: &MockServer, parts: &[&str]) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(openai_sse(parts)),
        )
        .mount(provider)
        .await;
}

#[get("")]
async fn mock_auth() -> actix_web::Result<impl Responder> {
    let user = forms::user::User {
        id: TEST_USER_ID.to_string(),
        email: "test@example.com".to_string(),
        email_confirmed: true,
        ..Default::default()
    };

    Ok(web::Json(forms::user::UserForm { user }))
}

fn mock_auth_server(listener: TcpListener) -> actix_web::dev::Server {
    HttpServer::new(|| App::new().service(web::scope("/me").service(mock_auth)))
        .listen(listener)
        .unwrap()
        .run()
}
