use crate::forms::ChatRequest;
use crate::models;
use crate::relay::{ProviderKind, RelayError, StreamRelay};
use actix_web::{http::header, post, web, HttpResponse};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_valid::Validate;
use std::convert::Infallible;
use std::sync::Arc;

fn parse_body(body: &[u8]) -> Result<ChatRequest, RelayError> {
    let deserializer = &mut serde_json::Deserializer::from_slice(body);
    let form: ChatRequest = serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = err.path().to_string();
        RelayError::InvalidRequest(format!("Invalid data received at {}: {}", path, err.into_inner()))
    })?;

    form.validate().map_err(|err| {
        tracing::debug!("Invalid chat request {:?}", err);
        RelayError::InvalidRequest(err.to_string())
    })?;

    Ok(form)
}

async fn relay_response(
    user: &models::User,
    body: &[u8],
    provider: Option<ProviderKind>,
    relay: &StreamRelay,
) -> Result<HttpResponse, RelayError> {
    let form = parse_body(body)?;
    if let Some(model_id) = form.model_id {
        tracing::debug!(model_id, "Client-side model id ignored in favour of the catalogue");
    }

    let handle = relay.open(&user.id, form.into_relay_request(provider)).await?;
    tracing::info!(model = %handle.model.slug, "Streaming reply");

    // the pump task keeps running after the body is dropped
    let body = handle
        .parts
        .map(|part| Ok::<_, Infallible>(Bytes::from(part.encode())));

    Ok(HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(body))
}

#[tracing::instrument(name = "Relay chat completion.", skip(body, relay))]
#[post("")]
pub async fn router_handler(
    user: web::ReqData<Arc<models::User>>,
    body: web::Bytes,
    relay: web::Data<StreamRelay>,
) -> Result<HttpResponse, RelayError> {
    relay_response(&user, &body, None, &relay).await
}

#[tracing::instrument(name = "Relay chat completion for provider.", skip(body, relay))]
#[post("/{provider}")]
pub async fn provider_handler(
    user: web::ReqData<Arc<models::User>>,
    path: web::Path<(String,)>,
    body: web::Bytes,
    relay: web::Data<StreamRelay>,
) -> Result<HttpResponse, RelayError> {
    let (provider,) = path.into_inner();
    let kind = ProviderKind::from_prefix(&provider).ok_or(RelayError::UnsupportedProvider(provider))?;

    relay_response(&user, &body, Some(kind), &relay).await
}
