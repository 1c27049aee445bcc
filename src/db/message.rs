use crate::models::{Message, Role};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

const COLUMNS: &str = "id, chat_id, user_id, role, content, model_id, reply_to, created_at";

/// Visible transcript: user/assistant rows in creation order.
pub async fn fetch_transcript(
    pool: &PgPool,
    user_id: &str,
    chat_id: Uuid,
) -> Result<Vec<Message>, String> {
    let query_span = tracing::info_span!("Fetch transcript.", conversation_id = %chat_id);
    sqlx::query_as::<_, Message>(&format!(
        r#"SELECT {COLUMNS}
           FROM chat_message
           WHERE chat_id = $1 AND user_id = $2 AND role IN ('user', 'assistant')
           ORDER BY created_at ASC, id ASC"#
    ))
    .bind(chat_id)
    .bind(user_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch transcript, error: {:?}", err);
        "Could not fetch messages".to_string()
    })
}

/// Id of the zero-based `ordinal`th user message of the conversation.
pub async fn nth_user_message_id(
    pool: &PgPool,
    user_id: &str,
    chat_id: Uuid,
    ordinal: usize,
) -> Result<Option<i64>, String> {
    let query_span = tracing::info_span!("Resolve user turn.", conversation_id = %chat_id, ordinal);
    sqlx::query_scalar::<_, i64>(
        r#"SELECT id FROM chat_message
           WHERE chat_id = $1 AND user_id = $2 AND role = 'user'
           ORDER BY created_at ASC, id ASC
           OFFSET $3 LIMIT 1"#,
    )
    .bind(chat_id)
    .bind(user_id)
    .bind(ordinal as i64)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to resolve user turn, error: {:?}", err);
        "Could not resolve turn".to_string()
    })
}

pub async fn latest_user_message_id(
    pool: &PgPool,
    user_id: &str,
    chat_id: Uuid,
) -> Result<Option<i64>, String> {
    sqlx::query_scalar::<_, i64>(
        r#"SELECT id FROM chat_message
           WHERE chat_id = $1 AND user_id = $2 AND role = 'user'
           ORDER BY created_at DESC, id DESC
           LIMIT 1"#,
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch latest user message, error: {:?}", err);
        "Could not resolve turn".to_string()
    })
}

pub async fn count_user_messages(pool: &PgPool, user_id: &str, chat_id: Uuid) -> Result<i64, String> {
    sqlx::query_scalar::<_, i64>(
        r#"SELECT COUNT(*) FROM chat_message
           WHERE chat_id = $1 AND user_id = $2 AND role = 'user'"#,
    )
    .bind(chat_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to count user messages, error: {:?}", err);
        "Could not count messages".to_string()
    })
}

/// Every assistant reply to one user message, oldest first.
pub async fn fetch_replies(
    pool: &PgPool,
    user_id: &str,
    reply_to: i64,
) -> Result<Vec<Message>, String> {
    let query_span = tracing::info_span!("Fetch response set.", reply_to);
    sqlx::query_as::<_, Message>(&format!(
        r#"SELECT {COLUMNS}
           FROM chat_message
           WHERE reply_to = $1 AND user_id = $2 AND role = 'assistant'
           ORDER BY created_at ASC, id ASC"#
    ))
    .bind(reply_to)
    .bind(user_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch response set, error: {:?}", err);
        "Could not fetch responses".to_string()
    })
}

/// Always inserts; bumps the conversation's `updated_at` in the same
/// transaction.
#[allow(clippy::too_many_arguments)]
pub async fn insert(
    pool: &PgPool,
    chat_id: Uuid,
    user_id: &str,
    role: Role,
    content: &str,
    model_id: Option<i32>,
    reply_to: Option<i64>,
    created_at: DateTime<Utc>,
) -> Result<Message, String> {
    let query_span = tracing::info_span!("Saving new message into the database", conversation_id = %chat_id, role = %role);
    let mut tx = pool.begin().await.map_err(|err| {
        tracing::error!("Failed to begin transaction: {:?}", err);
        "Could not start transaction".to_string()
    })?;

    let message = sqlx::query_as::<_, Message>(&format!(
        r#"INSERT INTO chat_message (chat_id, user_id, role, content, model_id, reply_to, created_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           RETURNING {COLUMNS}"#
    ))
    .bind(chat_id)
    .bind(user_id)
    .bind(role.as_str())
    .bind(content)
    .bind(model_id)
    .bind(reply_to)
    .bind(created_at)
    .fetch_one(&mut *tx)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        "Failed to insert".to_string()
    })?;

    sqlx::query(r#"UPDATE chat SET updated_at = NOW() WHERE id = $1 AND user_id = $2"#)
        .bind(chat_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            tracing::error!("Failed to touch conversation: {:?}", err);
            "Failed to update conversation".to_string()
        })?;

    tx.commit().await.map_err(|err| {
        tracing::error!("Failed to commit transaction: {:?}", err);
        "Failed to commit".to_string()
    })?;

    Ok(message)
}
