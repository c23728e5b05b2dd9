use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::helpers::format_sequence_number;

/// Atomically increments the counter for `(prefix, day)` and returns the new value. The first call for a day returns
/// 1. Two concurrent callers can never receive the same value.
pub async fn next_value(prefix: &str, day: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let value = sqlx::query_scalar(
        r#"
            INSERT INTO daily_sequences (prefix, day, value) VALUES ($1, $2, 1)
            ON CONFLICT (prefix, day) DO UPDATE SET value = value + 1
            RETURNING value;
        "#,
    )
    .bind(prefix)
    .bind(day)
    .fetch_one(conn)
    .await?;
    Ok(value)
}

/// Allocates the next human-readable number for `prefix` on the day of `now`, e.g. `ORD-20241019-0007`.
pub async fn next_number(
    prefix: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<String, sqlx::Error> {
    let day = now.format("%Y%m%d").to_string();
    let value = next_value(prefix, &day, conn).await?;
    Ok(format_sequence_number(prefix, &day, value))
}
