//! Conversation Store
//!
//! Durable append-only message log per conversation. Routes and the relay
//! depend on the [`ConversationStore`] trait; [`PgConversationStore`] is the
//! production implementation and [`super::MemoryConversationStore`] backs
//! tests.
//!
//! Response sets are grouped by the `reply_to` column stamped on every
//! assistant row at insert time, while callers still address a turn by its
//! user-message ordinal.

use crate::db;
use crate::models::{Conversation, Message, NewMessage, Role, TurnRef};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("conversation {0} not found")]
    ConversationNotFound(Uuid),
    #[error("user turn {0} not found")]
    TurnNotFound(usize),
    #[error("persistence failure: {0}")]
    Database(String),
}

impl From<String> for StoreError {
    fn from(msg: String) -> Self {
        StoreError::Database(msg)
    }
}

/// Shape handed to best-effort callers, which must never see an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> From<Result<T, StoreError>> for WriteOutcome {
    fn from(result: Result<T, StoreError>) -> Self {
        match result {
            Ok(_) => WriteOutcome {
                success: true,
                error: None,
            },
            Err(err) => WriteOutcome {
                success: false,
                error: Some(err.to_string()),
            },
        }
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Upsert keyed by id; a repeated call returns the existing row. An id
    /// held by another owner is reported as not found.
    async fn create_conversation(&self, conversation: Conversation) -> Result<Conversation, StoreError>;

    async fn fetch_conversation(&self, owner: &str, id: Uuid) -> Result<Option<Conversation>, StoreError>;

    /// Always inserts a new row and bumps `updated_at`.
    async fn append_message(
        &self,
        owner: &str,
        conversation_id: Uuid,
        message: NewMessage,
    ) -> Result<Message, StoreError>;

    async fn load_transcript(&self, owner: &str, conversation_id: Uuid) -> Result<Vec<Message>, StoreError>;

    /// Assistant replies to the `ordinal`th user message, oldest first. The
    /// last element is authoritative.
    async fn load_response_set_for_turn(
        &self,
        owner: &str,
        conversation_id: Uuid,
        ordinal: usize,
    ) -> Result<Vec<Message>, StoreError>;

    async fn user_turn_count(&self, owner: &str, conversation_id: Uuid) -> Result<usize, StoreError>;

    async fn rename_conversation(&self, owner: &str, id: Uuid, title: &str) -> Result<bool, StoreError>;

    /// Messages are removed before the conversation row.
    async fn delete_conversation(&self, owner: &str, id: Uuid) -> Result<bool, StoreError>;
}

pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn resolve_reply_to(
        &self,
        owner: &str,
        conversation_id: Uuid,
        message: &NewMessage,
    ) -> Result<Option<i64>, StoreError> {
        if message.role != Role::Assistant {
            return Ok(None);
        }
        match message.answers {
            TurnRef::Latest => Ok(db::message::latest_user_message_id(&self.pool, owner, conversation_id).await?),
            TurnRef::Ordinal(ordinal) => db::message::nth_user_message_id(&self.pool, owner, conversation_id, ordinal)
                .await?
                .map(Some)
                .ok_or(StoreError::TurnNotFound(ordinal)),
        }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn create_conversation(&self, conversation: Conversation) -> Result<Conversation, StoreError> {
        let id = conversation.id;
        db::chat::upsert(&self.pool, conversation)
            .await?
            .ok_or(StoreError::ConversationNotFound(id))
    }

    async fn fetch_conversation(&self, owner: &str, id: Uuid) -> Result<Option<Conversation>, StoreError> {
        Ok(db::chat::fetch(&self.pool, owner, id).await?)
    }

    async fn append_message(
        &self,
        owner: &str,
        conversation_id: Uuid,
        message: NewMessage,
    ) -> Result<Message, StoreError> {
        if db::chat::fetch(&self.pool, owner, conversation_id).await?.is_none() {
            return Err(StoreError::ConversationNotFound(conversation_id));
        }
        let reply_to = self.resolve_reply_to(owner, conversation_id, &message).await?;

        Ok(db::message::insert(
            &self.pool,
            conversation_id,
            owner,
            message.role,
            &message.content,
            message.model_id,
            reply_to,
            message.created_at.unwrap_or_else(Utc::now),
        )
        .await?)
    }

    async fn load_transcript(&self, owner: &str, conversation_id: Uuid) -> Result<Vec<Message>, StoreError> {
        Ok(db::message::fetch_transcript(&self.pool, owner, conversation_id).await?)
    }

    async fn load_response_set_for_turn(
        &self,
        owner: &str,
        conversation_id: Uuid,
        ordinal: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let user_message_id = db::message::nth_user_message_id(&self.pool, owner, conversation_id, ordinal)
            .await?
            .ok_or(StoreError::TurnNotFound(ordinal))?;

        Ok(db::message::fetch_replies(&self.pool, owner, user_message_id).await?)
    }

    async fn user_turn_count(&self, owner: &str, conversation_id: Uuid) -> Result<usize, StoreError> {
        let count = db::message::count_user_messages(&self.pool, owner, conversation_id).await?;
        Ok(count.max(0) as usize)
    }

    async fn rename_conversation(&self, owner: &str, id: Uuid, title: &str) -> Result<bool, StoreError> {
        Ok(db::chat::rename(&self.pool, owner, id, title).await?)
    }

    async fn delete_conversation(&self, owner: &str, id: Uuid) -> Result<bool, StoreError> {
        Ok(db::chat::delete(&self.pool, owner, id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_outcome_reports_failure_without_raising() {
        let failed: Result<(), StoreError> = Err(StoreError::Database("disk full".into()));
        let outcome = WriteOutcome::from(failed);
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("persistence failure: disk full"));

        let ok: Result<u8, StoreError> = Ok(1);
        assert_eq!(
            WriteOutcome::from(ok),
            WriteOutcome {
                success: true,
                error: None
            }
        );
    }
}
