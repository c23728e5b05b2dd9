use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

/// Claims `key` until `now + ttl`.
///
/// This is a single conditional upsert: a fresh key is inserted, an expired key is taken over, and a live key is left
/// alone. SQLite reports one changed row in the first two cases and none in the last, which is the answer.
pub async fn set_if_absent(
    key: &str,
    ttl: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            INSERT INTO idempotency_keys (key, expires_at) VALUES ($1, $2)
            ON CONFLICT (key) DO UPDATE SET expires_at = excluded.expires_at
            WHERE idempotency_keys.expires_at <= $3;
        "#,
    )
    .bind(key)
    .bind(now + ttl)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release(key: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM idempotency_keys WHERE key = $1").bind(key).execute(conn).await?;
    Ok(())
}

/// Removes keys that expired before `now`, returning how many were removed.
pub async fn purge_expired(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= $1").bind(now).execute(conn).await?;
    Ok(result.rows_affected())
}
