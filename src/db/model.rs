use crate::models::ModelRow;
use sqlx::PgPool;

/// Mirror the configured catalogue into the `models` table.
pub async fn upsert_all(pool: &PgPool, rows: &[ModelRow]) -> Result<usize, String> {
    let mut synced_count = 0;

    for row in rows {
        let result = sqlx::query(
            r#"
            INSERT INTO models (id, slug, display_name, provider)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET slug = EXCLUDED.slug,
                display_name = EXCLUDED.display_name,
                provider = EXCLUDED.provider
            "#,
        )
        .bind(row.id)
        .bind(&row.slug)
        .bind(&row.display_name)
        .bind(&row.provider)
        .execute(pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to upsert model {}: {:?}", row.slug, e);
            format!("Failed to upsert model: {}", e)
        })?;

        if result.rows_affected() > 0 {
            synced_count += 1;
        }
    }

    Ok(synced_count)
}

pub async fn fetch_by_slug(pool: &PgPool, slug: &str) -> Result<Option<ModelRow>, String> {
    sqlx::query_as::<_, ModelRow>(
        r#"SELECT id, slug, display_name, provider FROM models WHERE slug = $1"#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
    .map_err(|err| {
        tracing::error!("Failed to fetch model {}: {:?}", slug, err);
        "Could not fetch model".to_string()
    })
}
