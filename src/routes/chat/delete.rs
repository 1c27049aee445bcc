use crate::helpers::JsonResponse;
use crate::models;
use crate::services::ConversationStore;
use actix_web::{delete, web, Responder, Result};
use std::sync::Arc;
use uuid::Uuid;

#[tracing::instrument(name = "Delete conversation.", skip(store))]
#[delete("/{id}")]
pub async fn delete_handler(
    user: web::ReqData<Arc<models::User>>,
    path: web::Path<(Uuid,)>,
    store: web::Data<Arc<dyn ConversationStore>>,
) -> Result<impl Responder> {
    let (id,) = path.into_inner();

    store
        .delete_conversation(&user.id, id)
        .await
        .map_err(super::store_error)
        .and_then(|deleted| match deleted {
            true => Ok(JsonResponse::<models::Conversation>::build().set_id(id).ok("Deleted")),
            false => Err(JsonResponse::<models::Conversation>::build().not_found("Conversation not found")),
        })
}
