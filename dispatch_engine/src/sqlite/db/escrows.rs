use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{Escrow, EscrowStatus, Order};

/// Creates the `HELD` escrow for a paid order. The `order_id` column is unique, so a second escrow for the same order
/// fails with a unique-constraint violation.
pub async fn insert_escrow(order: &Order, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Escrow, sqlx::Error> {
    let escrow = sqlx::query_as(
        r#"
            INSERT INTO escrows (order_id, merchant_id, amount, delivery_fee_amount, status, held_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order.id)
    .bind(order.merchant_id)
    .bind(order.total_amount)
    .bind(order.delivery_fee)
    .bind(EscrowStatus::Held)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(escrow)
}

pub async fn fetch_escrow_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Escrow>, sqlx::Error> {
    let escrow =
        sqlx::query_as("SELECT * FROM escrows WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(escrow)
}

/// Flips the escrow from `HELD` to `RELEASED`. Returns `None` if there is no held escrow for the order.
pub async fn release(order_id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Option<Escrow>, sqlx::Error> {
    let escrow = sqlx::query_as(
        r#"
            UPDATE escrows SET status = $2, released_at = $3
            WHERE order_id = $1 AND status = $4
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(EscrowStatus::Released)
    .bind(now)
    .bind(EscrowStatus::Held)
    .fetch_optional(conn)
    .await?;
    Ok(escrow)
}
