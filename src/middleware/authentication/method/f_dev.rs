use crate::configuration::Settings;
use crate::models;
use actix_web::{dev::ServiceRequest, web, HttpMessage};
use std::sync::Arc;

/// Without credentials a development server runs every request as the
/// fixed dev user.
#[tracing::instrument(name = "Authenticate as dev user", skip(req))]
pub fn try_dev(req: &mut ServiceRequest) -> Result<bool, String> {
    let settings = req
        .app_data::<web::Data<Settings>>()
        .ok_or("Settings not found")?;
    if !settings.environment.is_development() {
        return Ok(false);
    }

    if req.extensions_mut().insert(Arc::new(models::User::dev())).is_some() {
        return Err("user already logged".to_string());
    }
    tracing::debug!("Request runs as {}", models::DEV_USER_ID);

    Ok(true)
}
