use chrono::{DateTime, Duration, Utc};
use sqlx::SqliteConnection;

/// Acquires the lease `name` for `holder` until `now + ttl`. The current holder may renew; anyone else only gets the
/// lease once it has expired.
pub async fn try_acquire(
    name: &str,
    holder: &str,
    ttl: Duration,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
            INSERT INTO sweep_leases (name, holder, expires_at) VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at
            WHERE sweep_leases.holder = excluded.holder OR sweep_leases.expires_at <= $4;
        "#,
    )
    .bind(name)
    .bind(holder)
    .bind(now + ttl)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn release(name: &str, holder: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM sweep_leases WHERE name = $1 AND holder = $2").bind(name).bind(holder).execute(conn).await?;
    Ok(())
}
