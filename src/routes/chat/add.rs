use crate::forms;
use crate::helpers::JsonResponse;
use crate::models;
use crate::services::ConversationStore;
use actix_web::{post, web, Responder, Result};
use serde_valid::Validate;
use std::sync::Arc;

/// Idempotent on a client-supplied id.
#[tracing::instrument(name = "Create conversation.", skip(store))]
#[post("")]
pub async fn add_handler(
    user: web::ReqData<Arc<models::User>>,
    form: web::Json<forms::CreateConversation>,
    store: web::Data<Arc<dyn ConversationStore>>,
) -> Result<impl Responder> {
    if let Err(errors) = form.validate() {
        tracing::debug!("Invalid data received {:?}", errors);
        return Err(JsonResponse::<models::Conversation>::build().form_error(errors.to_string()));
    }

    let conversation = form.into_inner().into_conversation(&user.id);
    store
        .create_conversation(conversation)
        .await
        .map(|conversation| {
            JsonResponse::build()
                .set_id(conversation.id)
                .set_item(conversation)
                .ok("OK")
        })
        .map_err(super::store_error)
}
