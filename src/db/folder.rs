use crate::models::Folder;
use sqlx::PgPool;
use tracing::Instrument;

pub async fn fetch_by_user(pool: &PgPool, user_id: &str) -> Result<Vec<Folder>, String> {
    let query_span = tracing::info_span!("Fetch folders by user id.");
    sqlx::query_as::<_, Folder>(
        r#"SELECT id, user_id, name, kind, created_at
           FROM chat_folder
           WHERE user_id = $1
           ORDER BY created_at ASC"#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch folders, error: {:?}", err);
        "Could not fetch folders".to_string()
    })
}

pub async fn insert(pool: &PgPool, user_id: &str, name: &str, kind: &str) -> Result<Folder, String> {
    let query_span = tracing::info_span!("Saving new folder into the database");
    sqlx::query_as::<_, Folder>(
        r#"INSERT INTO chat_folder (user_id, name, kind)
           VALUES ($1, $2, $3)
           RETURNING id, user_id, name, kind, created_at"#,
    )
    .bind(user_id)
    .bind(name)
    .bind(kind)
    .fetch_one(pool)
    .instrument(query_span)
    .await
    .map_err(|err| {
        tracing::error!("Failed to execute query: {:?}", err);
        "Failed to insert".to_string()
    })
}

pub async fn rename(pool: &PgPool, user_id: &str, id: i32, name: &str) -> Result<bool, String> {
    sqlx::query(r#"UPDATE chat_folder SET name = $3 WHERE id = $1 AND user_id = $2"#)
        .bind(id)
        .bind(user_id)
        .bind(name)
        .execute(pool)
        .await
        .map(|result| result.rows_affected() > 0)
        .map_err(|err| {
            tracing::error!("Failed to rename folder: {:?}", err);
            "Failed to rename".to_string()
        })
}

/// Messages of the folder's chats, then the chats, then the folder.
#[tracing::instrument(name = "Delete user's folder.", skip(pool))]
pub async fn delete(pool: &PgPool, user_id: &str, id: i32) -> Result<bool, String> {
    let mut tx = pool.begin().await.map_err(|err| {
        tracing::error!("Failed to begin transaction: {:?}", err);
        "Could not start transaction".to_string()
    })?;

    let steps = [
        (
            r#"DELETE FROM chat_message
               WHERE chat_id IN (SELECT id FROM chat WHERE folder_id = $1 AND user_id = $2)"#,
            "messages",
        ),
        (r#"DELETE FROM chat WHERE folder_id = $1 AND user_id = $2"#, "chats"),
        (r#"DELETE FROM chat_folder WHERE id = $1 AND user_id = $2"#, "folder"),
    ];

    let mut folder_deleted = false;
    for (statement, what) in steps {
        match sqlx::query(statement).bind(id).bind(user_id).execute(&mut *tx).await {
            Ok(result) => {
                tracing::debug!(rows = result.rows_affected(), "Deleted {}", what);
                folder_deleted = result.rows_affected() > 0;
            }
            Err(err) => {
                tracing::error!("Failed to delete {} of folder {}: {:?}", what, id, err);
                let _ = tx.rollback().await;
                return Err(format!("Failed to delete {}", what));
            }
        }
    }

    tx.commit().await.map_err(|err| {
        tracing::error!("Failed to commit transaction: {:?}", err);
        "Failed to commit".to_string()
    })?;

    Ok(folder_deleted)
}
