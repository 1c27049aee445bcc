use crate::models::{Conversation, NewMessage, Role, TurnRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_valid::Validate;
use uuid::Uuid;

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversation {
    /// Client-generated id; repeating it returns the existing conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[validate(max_length = 255)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<i32>,
}

impl CreateConversation {
    pub fn into_conversation(self, owner: &str) -> Conversation {
        Conversation::new(
            self.id,
            owner.to_string(),
            self.title.filter(|t| !t.trim().is_empty()),
            self.folder_id,
            self.model_id,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveMessage {
    pub role: Role,
    #[validate(min_length = 1)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<i32>,
    /// For assistant messages: the zero-based user turn answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<usize>,
}

impl From<SaveMessage> for NewMessage {
    fn from(form: SaveMessage) -> Self {
        NewMessage {
            role: form.role,
            content: form.content,
            model_id: form.model_id,
            answers: form.turn.map(TurnRef::Ordinal).unwrap_or_default(),
            created_at: form.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RenameConversation {
    #[validate(min_length = 1)]
    #[validate(max_length = 255)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MoveConversation {
    /// `null` moves the conversation out of any folder.
    pub folder_id: Option<i32>,
}
