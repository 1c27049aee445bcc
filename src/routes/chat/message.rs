use crate::forms;
use crate::helpers::JsonResponse;
use crate::models::{self, NewMessage, Role};
use crate::services::{ConversationStore, TitleGenerator};
use actix_web::{post, web, Responder, Result};
use serde_valid::Validate;
use std::sync::Arc;
use uuid::Uuid;

/// Appends one message. The first user message also kicks off title
/// generation in the background.
#[tracing::instrument(name = "Save message.", skip(store, titles, form))]
#[post("/{id}/messages")]
pub async fn save_message_handler(
    user: web::ReqData<Arc<models::User>>,
    path: web::Path<(Uuid,)>,
    form: web::Json<forms::SaveMessage>,
    store: web::Data<Arc<dyn ConversationStore>>,
    titles: web::Data<TitleGenerator>,
) -> Result<impl Responder> {
    let (id,) = path.into_inner();
    if let Err(errors) = form.validate() {
        tracing::debug!("Invalid data received {:?}", errors);
        return Err(JsonResponse::<models::Message>::build().form_error(errors.to_string()));
    }

    let message: NewMessage = form.into_inner().into();
    let saved = store
        .append_message(&user.id, id, message)
        .await
        .map_err(super::store_error)?;

    if saved.role == Role::User {
        match store.user_turn_count(&user.id, id).await {
            Ok(1) => {
                titles.spawn(&user.id, id, &saved.content);
            }
            Ok(_) => {}
            Err(err) => tracing::warn!("Could not count user turns: {}", err),
        }
    }

    Ok(JsonResponse::build().set_id(saved.id).set_item(saved).ok("OK"))
}
