use crate::db;
use crate::forms;
use crate::helpers::JsonResponse;
use crate::models;
use actix_web::{put, web, Responder, Result};
use serde_valid::Validate;
use sqlx::PgPool;
use std::sync::Arc;

#[tracing::instrument(name = "Rename folder.")]
#[put("/{id}")]
pub async fn update_handler(
    user: web::ReqData<Arc<models::User>>,
    path: web::Path<(i32,)>,
    form: web::Json<forms::FolderForm>,
    pg_pool: web::Data<PgPool>,
) -> Result<impl Responder> {
    let (id,) = path.into_inner();
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<models::Folder>::build().form_error(errors.to_string()));
    }

    db::folder::rename(pg_pool.get_ref(), &user.id, id, form.name.trim())
        .await
        .map_err(|err| JsonResponse::<models::Folder>::build().internal_server_error(err))
        .and_then(|renamed| match renamed {
            true => Ok(JsonResponse::<models::Folder>::build().set_id(id).ok("Renamed")),
            false => Err(JsonResponse::<models::Folder>::build().not_found("Folder not found")),
        })
}
