use crate::helpers::JsonResponse;
use crate::relay::{ModelDescriptor, StreamRelay};
use actix_web::{get, web, Responder, Result};

/// Catalogue visible in the running environment.
#[tracing::instrument(name = "List available models.", skip(relay))]
#[get("/models")]
pub async fn list_models_handler(relay: web::Data<StreamRelay>) -> Result<impl Responder> {
    let models: Vec<ModelDescriptor> = relay
        .registry()
        .list_available(relay.environment())
        .into_iter()
        .cloned()
        .collect();

    Ok(JsonResponse::build().set_list(models).ok("OK"))
}
