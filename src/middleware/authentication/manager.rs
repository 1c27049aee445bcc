use crate::middleware::authentication::*;

use actix_web::{
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use std::cell::RefCell;
use std::future::{ready, Ready};
use std::rc::Rc;

/// Resolves the caller into a `web::ReqData<Arc<models::User>>`.
pub struct Manager {}

impl Manager {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, B> Transform<S, ServiceRequest> for Manager
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ManagerMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ManagerMiddleware {
            service: Rc::new(RefCell::new(service)),
        }))
    }
}
