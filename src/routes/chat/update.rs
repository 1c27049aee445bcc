use crate::db;
use crate::forms;
use crate::helpers::JsonResponse;
use crate::models;
use crate::services::ConversationStore;
use actix_web::{put, web, Responder, Result};
use serde_valid::Validate;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

#[tracing::instrument(name = "Rename conversation.", skip(store))]
#[put("/{id}/title")]
pub async fn rename_handler(
    user: web::ReqData<Arc<models::User>>,
    path: web::Path<(Uuid,)>,
    form: web::Json<forms::RenameConversation>,
    store: web::Data<Arc<dyn ConversationStore>>,
) -> Result<impl Responder> {
    let (id,) = path.into_inner();
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<models::Conversation>::build().form_error(errors.to_string()));
    }

    match store.rename_conversation(&user.id, id, form.title.trim()).await {
        Ok(true) => Ok(JsonResponse::<models::Conversation>::build().set_id(id).ok("Renamed")),
        Ok(false) => Err(JsonResponse::<models::Conversation>::build().not_found("Conversation not found")),
        Err(err) => Err(super::store_error(err)),
    }
}

#[tracing::instrument(name = "Move conversation.")]
#[put("/{id}/folder")]
pub async fn move_handler(
    user: web::ReqData<Arc<models::User>>,
    path: web::Path<(Uuid,)>,
    form: web::Json<forms::MoveConversation>,
    pg_pool: web::Data<PgPool>,
) -> Result<impl Responder> {
    let (id,) = path.into_inner();

    if let Some(folder_id) = form.folder_id {
        let folders = db::folder::fetch_by_user(pg_pool.get_ref(), &user.id)
            .await
            .map_err(|err| JsonResponse::<models::Folder>::build().internal_server_error(err))?;
        if !folders.iter().any(|folder| folder.id == folder_id) {
            return Err(JsonResponse::<models::Folder>::build().not_found("Folder not found"));
        }
    }

    db::chat::move_to_folder(pg_pool.get_ref(), &user.id, id, form.folder_id)
        .await
        .map_err(|err| JsonResponse::<models::Conversation>::build().internal_server_error(err))
        .and_then(|moved| match moved {
            true => Ok(JsonResponse::<models::Conversation>::build().set_id(id).ok("Moved")),
            false => Err(JsonResponse::<models::Conversation>::build().not_found("Conversation not found")),
        })
}
