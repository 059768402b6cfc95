use chrono::Utc;
use sqlx::SqliteExecutor;

pub async fn get<'e, E: SqliteExecutor<'e>>(
    executor: E,
    key: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
        .bind(key)
        .fetch_optional(executor)
        .await
}

pub async fn put<'e, E: SqliteExecutor<'e>>(
    executor: E,
    key: &str,
    value: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO kv_store (key, value, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
    )
    .bind(key)
    .bind(value)
    .bind(Utc::now())
    .execute(executor)
    .await?;
    Ok(())
}

/// Returns true if a value was removed.
pub async fn delete<'e, E: SqliteExecutor<'e>>(executor: E, key: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM kv_store WHERE key = ?")
        .bind(key)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}
