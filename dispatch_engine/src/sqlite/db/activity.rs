use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{ActivityEntry, NewActivity};

pub async fn insert_activity(activity: NewActivity, conn: &mut SqliteConnection) -> Result<ActivityEntry, sqlx::Error> {
    let entry = sqlx::query_as(
        r#"
            INSERT INTO activity_log (category, severity, message, order_id, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(activity.category)
    .bind(activity.severity)
    .bind(activity.message)
    .bind(activity.order_id)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

pub async fn fetch_recent(limit: i64, conn: &mut SqliteConnection) -> Result<Vec<ActivityEntry>, sqlx::Error> {
    let entries =
        sqlx::query_as("SELECT * FROM activity_log ORDER BY id DESC LIMIT $1").bind(limit).fetch_all(conn).await?;
    Ok(entries)
}

pub async fn fetch_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<ActivityEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM activity_log WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
