use super::provider::ProviderError;
use super::registry::RegistryError;
use crate::services::StoreError;
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use serde_json::json;

/// Everything that can end a relay request. Errors raised before the first
/// fragment become the HTTP status; later ones travel in-band as `3:` parts.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Unsupported model provider for ID: {0}")]
    UnsupportedProvider(String),
    #[error("Conversation {0} not found")]
    ConversationNotFound(uuid::Uuid),
    #[error("{0} is only available in development mode.")]
    DevelopmentOnly(String),
    #[error("Upstream provider unavailable: {0}")]
    UpstreamUnavailable(ProviderError),
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(ProviderError),
    #[error("Reply was generated but could not be saved: {0}")]
    PersistenceFailure(StoreError),
}

impl From<RegistryError> for RelayError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(slug) => RelayError::UnsupportedProvider(slug),
            RegistryError::InvalidCatalogue(msg) => RelayError::InvalidRequest(msg),
        }
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ConversationNotFound(id) => RelayError::ConversationNotFound(id),
            StoreError::TurnNotFound(turn) => RelayError::InvalidRequest(format!("user turn {} not found", turn)),
            other => RelayError::PersistenceFailure(other),
        }
    }
}

impl ResponseError for RelayError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedProvider(_) => StatusCode::BAD_REQUEST,
            Self::DevelopmentOnly(_) => StatusCode::FORBIDDEN,
            Self::ConversationNotFound(_) => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable(_) | Self::StreamInterrupted(_) => StatusCode::BAD_GATEWAY,
            Self::PersistenceFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_stream_errors_map_to_status_codes() {
        assert_eq!(
            RelayError::from(RegistryError::NotFound("unknown:foo".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::DevelopmentOnly("LM Studio".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            RelayError::UpstreamUnavailable(ProviderError::transient("503")).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn message_matches_unsupported_provider_wording() {
        let err = RelayError::UnsupportedProvider("unknown:foo".into());
        assert_eq!(err.to_string(), "Unsupported model provider for ID: unknown:foo");
    }
}
