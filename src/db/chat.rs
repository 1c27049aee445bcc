use crate::models::Conversation;
use sqlx::PgPool;
use tracing::Instrument;
use uuid::Uuid;

pub async fn fetch(
    pool: &PgPool,
    user_id: &str,
    id: Uuid,
) -> Result<Option<Conversation>, String> {
    let query_span = tracing::info_span!("Fetch conversation.", conversation_id = %id);
    sqlx::query_as::<_, Conversation>(
        r#"SELECT id, user_id, folder_id, title, model_id, created_at, updated_at
           FROM chat
           WHERE id = $1 AND user_id = $2"#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch conversation, error: {:?}", err);
        "Could not fetch conversation".to_string()
    })
}

pub async fn fetch_by_user(pool: &PgPool, user_id: &str) -> Result<Vec<Conversation>, String> {
    let query_span = tracing::info_span!("Fetch conversations by user id.");
    sqlx::query_as::<_, Conversation>(
        r#"SELECT id, user_id, folder_id, title, model_id, created_at, updated_at
           FROM chat
           WHERE user_id = $1
           ORDER BY updated_at DESC"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch conversations, error: {:?}", err);
        "Could not fetch conversations".to_string()
    })
}

/// Insert the conversation, or return the stored row when the id is already
/// taken by the same owner. Retried initialisation never yields two rows.
/// `None` when another owner holds the id.
pub async fn upsert(pool: &PgPool, conversation: Conversation) -> Result<Option<Conversation>, String> {
    let query_span = tracing::info_span!("Upserting conversation", conversation_id = %conversation.id);
    let inserted = sqlx::query_as::<_, Conversation>(
        r#"INSERT INTO chat (id, user_id, folder_id, title, model_id, created_at, updated_at)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           ON CONFLICT (id) DO NOTHING
           RETURNING id, user_id, folder_id, title, model_id, created_at, updated_at"#,
    )
    .bind(conversation.id)
    .bind(&conversation.user_id)
    .bind(conversation.folder_id)
    .bind(&conversation.title)
    .bind(conversation.model_id)
    .bind(conversation.created_at)
    .bind(conversation.updated_at)
    .fetch_optional(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to insert conversation: {:?}", err);
        "Failed to insert".to_string()
    })?;

    match inserted {
        Some(row) => Ok(Some(row)),
        None => {
            let existing = fetch(pool, &conversation.user_id, conversation.id).await?;
            if existing.is_none() {
                tracing::warn!("Conversation id {} belongs to another owner", conversation.id);
            }
            Ok(existing)
        }
    }
}

pub async fn rename(pool: &PgPool, user_id: &str, id: Uuid, title: &str) -> Result<bool, String> {
    let query_span = tracing::info_span!("Renaming conversation", conversation_id = %id);
    sqlx::query(r#"UPDATE chat SET title = $3 WHERE id = $1 AND user_id = $2"#)
        .bind(id)
        .bind(user_id)
        .bind(title)
        .execute(pool)
        .instrument(query_span)
        .await
        .map(|result| result.rows_affected() > 0)
        .map_err(|err| {
            tracing::error!("Failed to rename conversation: {:?}", err);
            "Failed to rename".to_string()
        })
}

pub async fn move_to_folder(
    pool: &PgPool,
    user_id: &str,
    id: Uuid,
    folder_id: Option<i32>,
) -> Result<bool, String> {
    let query_span = tracing::info_span!("Moving conversation", conversation_id = %id);
    sqlx::query(r#"UPDATE chat SET folder_id = $3 WHERE id = $1 AND user_id = $2"#)
        .bind(id)
        .bind(user_id)
        .bind(folder_id)
        .execute(pool)
        .instrument(query_span)
        .await
        .map(|result| result.rows_affected() > 0)
        .map_err(|err| {
            tracing::error!("Failed to move conversation: {:?}", err);
            "Failed to move".to_string()
        })
}

/// Messages first, then the conversation row, in one transaction.
#[tracing::instrument(name = "Delete user's conversation.", skip(pool))]
pub async fn delete(pool: &PgPool, user_id: &str, id: Uuid) -> Result<bool, String> {
    let mut tx = pool.begin().await.map_err(|err| {
        tracing::error!("Failed to begin transaction: {:?}", err);
        "Could not start transaction".to_string()
    })?;

    let removed = sqlx::query(r#"DELETE FROM chat_message WHERE chat_id = $1 AND user_id = $2"#)
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            tracing::error!("Failed to delete messages of {}: {:?}", id, err);
            "Failed to delete messages".to_string()
        });
    let removed = match removed {
        Ok(result) => result.rows_affected(),
        Err(err) => {
            let _ = tx.rollback().await;
            return Err(err);
        }
    };

    let deleted = sqlx::query(r#"DELETE FROM chat WHERE id = $1 AND user_id = $2"#)
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            tracing::error!("Failed to delete conversation {}: {:?}", id, err);
            "Failed to delete conversation".to_string()
        });
    let deleted = match deleted {
        Ok(result) => result.rows_affected() > 0,
        Err(err) => {
            let _ = tx.rollback().await;
            return Err(err);
        }
    };

    tx.commit().await.map_err(|err| {
        tracing::error!("Failed to commit transaction: {:?}", err);
        "Failed to commit".to_string()
    })?;

    tracing::info!(messages = removed, "Conversation {} deleted", id);
    Ok(deleted)
}
