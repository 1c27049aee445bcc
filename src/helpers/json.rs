use actix_web::error::InternalError;
use actix_web::http::StatusCode;
use actix_web::web::Json;
use actix_web::{Error, HttpResponse};
use serde::Serialize;

/// Envelope of every JSON answer: `{message, id?, item?, list?}`.
#[derive(Serialize)]
pub struct JsonResponse<T> {
    pub(crate) message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) item: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) list: Option<Vec<T>>,
}

pub struct JsonResponseBuilder<T>
where
    T: serde::Serialize,
{
    message: String,
    id: Option<String>,
    item: Option<T>,
    list: Option<Vec<T>>,
}

impl<T: serde::Serialize> Default for JsonResponseBuilder<T> {
    fn default() -> Self {
        Self {
            message: String::new(),
            id: None,
            item: None,
            list: None,
        }
    }
}

impl<T> JsonResponseBuilder<T>
where
    T: serde::Serialize,
{
    pub(crate) fn set_msg<I: Into<String>>(mut self, msg: I) -> Self {
        self.message = msg.into();
        self
    }

    pub(crate) fn set_id<I: ToString>(mut self, id: I) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub(crate) fn set_item(mut self, item: T) -> Self {
        self.item = Some(item);
        self
    }

    pub(crate) fn set_list(mut self, list: Vec<T>) -> Self {
        self.list = Some(list);
        self
    }

    fn to_json_response(self) -> JsonResponse<T> {
        JsonResponse {
            message: self.message,
            id: self.id,
            item: self.item,
            list: self.list,
        }
    }

    pub(crate) fn ok<I: Into<String>>(self, msg: I) -> Json<JsonResponse<T>> {
        Json(self.set_msg(msg).to_json_response())
    }

    /// JSON error body under `status`; `message` doubles as the error text.
    fn error<I: Into<String>>(self, status: StatusCode, msg: I) -> Error {
        let body = self.set_msg(msg).to_json_response();
        let message = body.message.clone();
        InternalError::from_response(message, HttpResponse::build(status).json(&body)).into()
    }

    pub(crate) fn bad_request<I: Into<String>>(self, msg: I) -> Error {
        self.error(StatusCode::BAD_REQUEST, msg)
    }

    pub(crate) fn form_error(self, msg: String) -> Error {
        self.bad_request(msg)
    }

    pub(crate) fn unauthorized<I: Into<String>>(self, msg: I) -> Error {
        self.error(StatusCode::UNAUTHORIZED, msg)
    }

    pub(crate) fn not_found<I: Into<String>>(self, msg: I) -> Error {
        self.error(StatusCode::NOT_FOUND, msg)
    }

    pub(crate) fn forbidden<I: Into<String>>(self, msg: I) -> Error {
        self.error(StatusCode::FORBIDDEN, msg)
    }

    pub(crate) fn internal_server_error<I: Into<String>>(self, msg: I) -> Error {
        self.error(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }
}

impl<T> JsonResponse<T>
where
    T: serde::Serialize,
{
    pub fn build() -> JsonResponseBuilder<T> {
        JsonResponseBuilder::default()
    }
}
