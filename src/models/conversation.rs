use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat thread. The id may be generated by the client so it can be
/// referenced before the server has acknowledged it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub folder_id: Option<i32>,
    pub title: String,
    pub model_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const DEFAULT_TITLE: &str = "New Chat";

impl Conversation {
    pub fn new(
        id: Option<Uuid>,
        user_id: String,
        title: Option<String>,
        folder_id: Option<i32>,
        model_id: Option<i32>,
    ) -> Self {
        let now = Utc::now();
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_TITLE.to_string());

        Self {
            id: id.unwrap_or_else(Uuid::new_v4),
            user_id,
            folder_id,
            title,
            model_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_title_falls_back_to_default() {
        let conv = Conversation::new(None, "u1".into(), Some("   ".into()), None, None);
        assert_eq!(conv.title, DEFAULT_TITLE);
    }

    #[test]
    fn client_supplied_id_is_kept() {
        let id = Uuid::new_v4();
        let conv = Conversation::new(Some(id), "u1".into(), Some("Hi".into()), Some(3), Some(1));
        assert_eq!(conv.id, id);
        assert_eq!(conv.folder_id, Some(3));
        assert_eq!(conv.created_at, conv.updated_at);
    }
}
