use crate::db;
use crate::helpers::JsonResponse;
use crate::models;
use crate::services::ConversationStore;
use actix_web::{get, web, Responder, Result};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Sidebar data: folders with their conversations, unfiled ones last.
#[tracing::instrument(name = "List user's conversations.")]
#[get("")]
pub async fn list_handler(
    user: web::ReqData<Arc<models::User>>,
    pg_pool: web::Data<PgPool>,
) -> Result<impl Responder> {
    let folders = db::folder::fetch_by_user(pg_pool.get_ref(), &user.id)
        .await
        .map_err(|err| JsonResponse::<models::FolderGroup>::build().internal_server_error(err))?;
    let conversations = db::chat::fetch_by_user(pg_pool.get_ref(), &user.id)
        .await
        .map_err(|err| JsonResponse::<models::FolderGroup>::build().internal_server_error(err))?;

    Ok(JsonResponse::build()
        .set_list(models::group_by_folder(folders, conversations))
        .ok("OK"))
}

#[tracing::instrument(name = "Load transcript.", skip(store))]
#[get("/{id}/messages")]
pub async fn transcript_handler(
    user: web::ReqData<Arc<models::User>>,
    path: web::Path<(Uuid,)>,
    store: web::Data<Arc<dyn ConversationStore>>,
) -> Result<impl Responder> {
    let (id,) = path.into_inner();

    store
        .fetch_conversation(&user.id, id)
        .await
        .map_err(super::store_error)?
        .ok_or_else(|| JsonResponse::<models::Message>::build().not_found("Conversation not found"))?;

    store
        .load_transcript(&user.id, id)
        .await
        .map(|messages| JsonResponse::build().set_list(messages).ok("OK"))
        .map_err(super::store_error)
}

/// Every reply ever generated for one user turn, newest last.
#[tracing::instrument(name = "Load response set.", skip(store))]
#[get("/{id}/turns/{ordinal}/responses")]
pub async fn responses_handler(
    user: web::ReqData<Arc<models::User>>,
    path: web::Path<(Uuid, usize)>,
    store: web::Data<Arc<dyn ConversationStore>>,
) -> Result<impl Responder> {
    let (id, ordinal) = path.into_inner();

    store
        .load_response_set_for_turn(&user.id, id, ordinal)
        .await
        .map(|messages| JsonResponse::build().set_list(messages).ok("OK"))
        .map_err(super::store_error)
}
