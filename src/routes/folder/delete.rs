use crate::db;
use crate::helpers::JsonResponse;
use crate::models;
use actix_web::{delete, web, Responder, Result};
use sqlx::PgPool;
use std::sync::Arc;

/// Takes the folder's conversations and their messages with it.
#[tracing::instrument(name = "Delete folder.")]
#[delete("/{id}")]
pub async fn delete_handler(
    user: web::ReqData<Arc<models::User>>,
    path: web::Path<(i32,)>,
    pg_pool: web::Data<PgPool>,
) -> Result<impl Responder> {
    let (id,) = path.into_inner();

    db::folder::delete(pg_pool.get_ref(), &user.id, id)
        .await
        .map_err(|err| JsonResponse::<models::Folder>::build().internal_server_error(err))
        .and_then(|deleted| match deleted {
            true => Ok(JsonResponse::<models::Folder>::build().set_id(id).ok("Deleted")),
            false => Err(JsonResponse::<models::Folder>::build().not_found("Folder not found")),
        })
}
