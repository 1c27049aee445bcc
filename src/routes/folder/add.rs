use crate::db;
use crate::forms;
use crate::helpers::JsonResponse;
use crate::models;
use actix_web::{post, web, Responder, Result};
use serde_valid::Validate;
use sqlx::PgPool;
use std::sync::Arc;

#[tracing::instrument(name = "Add folder.")]
#[post("")]
pub async fn add_handler(
    user: web::ReqData<Arc<models::User>>,
    form: web::Json<forms::FolderForm>,
    pg_pool: web::Data<PgPool>,
) -> Result<impl Responder> {
    if let Err(errors) = form.validate() {
        return Err(JsonResponse::<models::Folder>::build().form_error(errors.to_string()));
    }

    db::folder::insert(pg_pool.get_ref(), &user.id, form.name.trim(), models::USER_CREATED)
        .await
        .map(|folder| JsonResponse::build().set_id(folder.id).set_item(folder).ok("OK"))
        .map_err(|err| JsonResponse::<models::Folder>::build().internal_server_error(err))
}
