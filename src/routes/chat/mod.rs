mod add;
mod delete;
mod get;
mod message;
mod update;

pub use add::*;
pub use delete::*;
pub use get::*;
pub use message::*;
pub use update::*;

use crate::helpers::JsonResponse;
use crate::services::StoreError;

pub(crate) fn store_error(err: StoreError) -> actix_web::Error {
    match err {
        StoreError::ConversationNotFound(_) | StoreError::TurnNotFound(_) => {
            JsonResponse::<String>::build().not_found(err.to_string())
        }
        StoreError::Database(msg) => JsonResponse::<String>::build().internal_server_error(msg),
    }
}
