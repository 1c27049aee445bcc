use crate::models::TurnRef;
use crate::relay::{ChatTurn, ProviderKind, RelayRequest};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use uuid::Uuid;

/// Body of `POST /api/chat` and `POST /api/chat/{provider}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[validate(min_items = 1)]
    pub messages: Vec<ChatTurn>,
    #[validate(min_length = 3)]
    pub model: String,
    /// Informational; the registry's id is authoritative.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<i32>,
    /// Conversation the reply is saved into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    /// Zero-based user turn being regenerated. Absent for a normal reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<usize>,
}

impl ChatRequest {
    pub fn into_relay_request(self, provider: Option<ProviderKind>) -> RelayRequest {
        RelayRequest {
            history: self.messages,
            model: self.model,
            provider,
            conversation_id: self.id,
            turn: self.turn.map(TurnRef::Ordinal).unwrap_or_default(),
        }
    }
}
