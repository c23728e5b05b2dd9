use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{Delivery, DeliveryEvent, DeliveryStatus, EscrowStatus, NewDelivery};

pub async fn insert_delivery(
    delivery: &NewDelivery,
    delivery_number: &str,
    rider_id: Option<i64>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Delivery, sqlx::Error> {
    let (status, assigned_at) = match rider_id {
        Some(_) => (DeliveryStatus::Assigned, Some(now)),
        None => (DeliveryStatus::Pending, None),
    };
    let delivery = sqlx::query_as(
        r#"
            INSERT INTO deliveries (
                delivery_number,
                order_id,
                rider_id,
                status,
                pickup_address,
                pickup_lat,
                pickup_lng,
                dropoff_address,
                dropoff_lat,
                dropoff_lng,
                delivery_fee,
                assigned_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13)
            RETURNING *;
        "#,
    )
    .bind(delivery_number)
    .bind(delivery.order_id)
    .bind(rider_id)
    .bind(status)
    .bind(&delivery.pickup.address)
    .bind(delivery.pickup.lat)
    .bind(delivery.pickup.lng)
    .bind(&delivery.dropoff.address)
    .bind(delivery.dropoff.lat)
    .bind(delivery.dropoff.lng)
    .bind(delivery.delivery_fee)
    .bind(assigned_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(delivery)
}

pub async fn fetch_delivery(id: i64, conn: &mut SqliteConnection) -> Result<Option<Delivery>, sqlx::Error> {
    let delivery = sqlx::query_as("SELECT * FROM deliveries WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(delivery)
}

pub async fn fetch_delivery_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Delivery>, sqlx::Error> {
    let delivery =
        sqlx::query_as("SELECT * FROM deliveries WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(delivery)
}

/// Bumps `updated_at` and returns the row. As the first statement of a transaction this takes the write lock before
/// the current status is read, so the status cannot change underneath the caller.
pub async fn touch(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Option<Delivery>, sqlx::Error> {
    let delivery = sqlx::query_as("UPDATE deliveries SET updated_at = $2 WHERE id = $1 RETURNING *")
        .bind(id)
        .bind(now)
        .fetch_optional(conn)
        .await?;
    Ok(delivery)
}

pub async fn insert_event(
    delivery_id: i64,
    status: DeliveryStatus,
    note: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<DeliveryEvent, sqlx::Error> {
    let event = sqlx::query_as(
        "INSERT INTO delivery_events (delivery_id, status, note, created_at) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(delivery_id)
    .bind(status)
    .bind(note)
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Delivery #{delivery_id} event: {status}");
    Ok(event)
}

pub async fn fetch_events(delivery_id: i64, conn: &mut SqliteConnection) -> Result<Vec<DeliveryEvent>, sqlx::Error> {
    let events = sqlx::query_as("SELECT * FROM delivery_events WHERE delivery_id = $1 ORDER BY id")
        .bind(delivery_id)
        .fetch_all(conn)
        .await?;
    Ok(events)
}

/// Puts the delivery in `ASSIGNED` under `rider_id`, provided it is still in the `from` state.
pub async fn assign(
    id: i64,
    rider_id: i64,
    from: DeliveryStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Delivery>, sqlx::Error> {
    let delivery = sqlx::query_as(
        r#"
            UPDATE deliveries SET rider_id = $2, status = $3, assigned_at = $4, updated_at = $4
            WHERE id = $1 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(rider_id)
    .bind(DeliveryStatus::Assigned)
    .bind(now)
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(delivery)
}

/// Moves the delivery from `from` to `to`, stamping the timestamp column that belongs to `to`.
pub async fn update_status(
    id: i64,
    from: DeliveryStatus,
    to: DeliveryStatus,
    auto_release_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Delivery>, sqlx::Error> {
    let stamp = match to {
        DeliveryStatus::Pending | DeliveryStatus::Assigned => "assigned_at",
        DeliveryStatus::PickedUp => "picked_up_at",
        DeliveryStatus::InTransit => "in_transit_at",
        DeliveryStatus::Delivered => "delivered_at",
        DeliveryStatus::Cancelled => "cancelled_at",
    };
    let sql = format!(
        "UPDATE deliveries SET status = $2, {stamp} = $3, updated_at = $3, auto_release_at = COALESCE($4, \
         auto_release_at) WHERE id = $1 AND status = $5 RETURNING *"
    );
    let delivery = sqlx::query_as(&sql)
        .bind(id)
        .bind(to)
        .bind(now)
        .bind(auto_release_at)
        .bind(from)
        .fetch_optional(conn)
        .await?;
    Ok(delivery)
}

/// Records the customer's confirmation. Returns `None` if the delivery is not `DELIVERED` or is already confirmed.
pub async fn confirm(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Option<Delivery>, sqlx::Error> {
    let delivery = sqlx::query_as(
        r#"
            UPDATE deliveries SET customer_confirmed = 1, confirmed_at = $2, updated_at = $2
            WHERE id = $1 AND status = $3 AND customer_confirmed = 0
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(now)
    .bind(DeliveryStatus::Delivered)
    .fetch_optional(conn)
    .await?;
    Ok(delivery)
}

pub async fn fetch_stuck(
    assigned_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<Delivery>, sqlx::Error> {
    let deliveries =
        sqlx::query_as("SELECT * FROM deliveries WHERE status = $1 AND assigned_at < $2 ORDER BY assigned_at")
            .bind(DeliveryStatus::Assigned)
            .bind(assigned_before)
            .fetch_all(conn)
            .await?;
    Ok(deliveries)
}

pub async fn fetch_unassigned(conn: &mut SqliteConnection) -> Result<Vec<Delivery>, sqlx::Error> {
    let deliveries = sqlx::query_as("SELECT * FROM deliveries WHERE status = $1 AND rider_id IS NULL ORDER BY id")
        .bind(DeliveryStatus::Pending)
        .fetch_all(conn)
        .await?;
    Ok(deliveries)
}

pub async fn fetch_due_for_release(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<Delivery>, sqlx::Error> {
    let deliveries = sqlx::query_as(
        r#"
            SELECT d.* FROM deliveries d JOIN escrows e ON e.order_id = d.order_id
            WHERE d.status = $1
              AND e.status = $2
              AND (d.customer_confirmed = 1 OR d.auto_release_at < $3)
            ORDER BY d.delivered_at;
        "#,
    )
    .bind(DeliveryStatus::Delivered)
    .bind(EscrowStatus::Held)
    .bind(now)
    .fetch_all(conn)
    .await?;
    Ok(deliveries)
}
