use crate::configuration::Settings;
use crate::db;
use crate::middleware;
use crate::relay::{ModelRegistry, ProviderAdapters, StreamRelay};
use crate::routes;
use crate::services::{ConversationStore, PgConversationStore, TitleGenerator};
use actix_cors::Cors;
use actix_web::{dev::Server, error, http, web, App, HttpServer};
use sqlx::{Pool, Postgres};
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use tracing_actix_web::TracingLogger;

fn io_error<E: std::fmt::Display>(err: E) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}

pub async fn run(
    listener: TcpListener,
    pg_pool: Pool<Postgres>,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let registry = Arc::new(ModelRegistry::from_settings(&settings.models).map_err(io_error)?);

    // assistant rows reference models.id, so the catalogue lands first
    match db::model::upsert_all(&pg_pool, &registry.rows()).await {
        Ok(count) => tracing::info!("Synced {} models into the catalogue", count),
        Err(err) => tracing::error!("Failed to sync model catalogue: {}", err),
    }

    let store: Arc<dyn ConversationStore> = Arc::new(PgConversationStore::new(pg_pool.clone()));
    let adapters = ProviderAdapters::from_settings(&settings.providers);

    let relay = web::Data::new(StreamRelay::new(
        registry.clone(),
        adapters.clone(),
        store.clone(),
        settings.relay.clone(),
        settings.environment,
    ));
    let titles = web::Data::new(TitleGenerator::new(
        registry,
        adapters,
        store.clone(),
        settings.title.clone(),
        settings.environment,
    ));
    let store = web::Data::new(store);

    let settings = web::Data::new(settings);
    let pg_pool = web::Data::new(pg_pool);

    let oauth_http_client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .map_err(io_error)?;
    let oauth_http_client = web::Data::new(oauth_http_client);

    let oauth_cache = web::Data::new(middleware::authentication::OAuthCache::new(
        Duration::from_secs(60),
    ));

    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let msg: String = match err {
            error::JsonPayloadError::Deserialize(err) => format!(
                "{{\"kind\":\"deserialize\",\"line\":{}, \"column\":{}, \"msg\":\"{}\"}}",
                err.line(),
                err.column(),
                err
            ),
            _ => format!("{{\"kind\":\"other\",\"msg\":\"{}\"}}", err),
        };
        error::InternalError::new(msg, http::StatusCode::BAD_REQUEST).into()
    });

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            .app_data(json_config.clone())
            .app_data(settings.clone())
            .app_data(pg_pool.clone())
            .app_data(store.clone())
            .app_data(relay.clone())
            .app_data(titles.clone())
            .app_data(oauth_http_client.clone())
            .app_data(oauth_cache.clone())
            .service(web::scope("/health_check").service(routes::health_check))
            .service(
                web::scope("/api")
                    .service(routes::completion::list_models_handler)
                    .service(
                        web::scope("/chat")
                            .wrap(middleware::authentication::Manager::new())
                            .service(routes::completion::router_handler)
                            .service(routes::completion::provider_handler),
                    ),
            )
            .service(
                web::scope("/chat")
                    .wrap(middleware::authentication::Manager::new())
                    .service(routes::chat::list_handler)
                    .service(routes::chat::add_handler)
                    .service(routes::chat::transcript_handler)
                    .service(routes::chat::save_message_handler)
                    .service(routes::chat::responses_handler)
                    .service(routes::chat::rename_handler)
                    .service(routes::chat::move_handler)
                    .service(routes::chat::delete_handler),
            )
            .service(
                web::scope("/folder")
                    .wrap(middleware::authentication::Manager::new())
                    .service(routes::folder::add_handler)
                    .service(routes::folder::update_handler)
                    .service(routes::folder::delete_handler),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
