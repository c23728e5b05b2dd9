use chrono::{DateTime, Utc};
use dispatch_common::Kobo;
use log::trace;
use sqlx::SqliteConnection;

use crate::db_types::{ApprovalStatus, Rider, RiderStatus};

pub async fn insert_rider(
    name: &str,
    phone: &str,
    approval: ApprovalStatus,
    status: RiderStatus,
    conn: &mut SqliteConnection,
) -> Result<Rider, sqlx::Error> {
    let now = Utc::now();
    let rider = sqlx::query_as(
        r#"
            INSERT INTO riders (name, phone, approval_status, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *;
        "#,
    )
    .bind(name)
    .bind(phone)
    .bind(approval)
    .bind(status)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(rider)
}

pub async fn fetch_rider(id: i64, conn: &mut SqliteConnection) -> Result<Option<Rider>, sqlx::Error> {
    let rider = sqlx::query_as("SELECT * FROM riders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(rider)
}

pub async fn fetch_riders_by_status(status: RiderStatus, conn: &mut SqliteConnection) -> Result<Vec<Rider>, sqlx::Error> {
    let riders =
        sqlx::query_as("SELECT * FROM riders WHERE status = $1 ORDER BY id").bind(status).fetch_all(conn).await?;
    Ok(riders)
}

/// Claims the first available, approved rider (other than `exclude`) by flipping it to `BUSY` in a single statement.
/// Returns `None` if no rider is free.
pub async fn claim_available_rider(
    exclude: Option<i64>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Rider>, sqlx::Error> {
    let rider: Option<Rider> = sqlx::query_as(
        r#"
            UPDATE riders SET status = $1, updated_at = $2
            WHERE id = (
                SELECT id FROM riders
                WHERE status = $3 AND approval_status = $4 AND ($5 IS NULL OR id != $5)
                ORDER BY id LIMIT 1
            ) AND status = $3
            RETURNING *;
        "#,
    )
    .bind(RiderStatus::Busy)
    .bind(now)
    .bind(RiderStatus::Available)
    .bind(ApprovalStatus::Approved)
    .bind(exclude)
    .fetch_optional(conn)
    .await?;
    if let Some(r) = &rider {
        trace!("🗃️ Rider #{} claimed", r.id);
    }
    Ok(rider)
}

/// Returns a busy rider to `AVAILABLE`, adding `completed` to its delivery count.
pub async fn free_rider(
    id: i64,
    completed: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Rider>, sqlx::Error> {
    let rider = sqlx::query_as(
        r#"
            UPDATE riders SET status = $2, total_deliveries = total_deliveries + $3, updated_at = $4
            WHERE id = $1 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(RiderStatus::Available)
    .bind(completed)
    .bind(now)
    .bind(RiderStatus::Busy)
    .fetch_optional(conn)
    .await?;
    Ok(rider)
}

/// Toggles between `OFFLINE` and `AVAILABLE` for approved riders that are not busy.
pub async fn set_online(
    id: i64,
    online: bool,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Rider>, sqlx::Error> {
    let status = if online { RiderStatus::Available } else { RiderStatus::Offline };
    let rider = sqlx::query_as(
        r#"
            UPDATE riders SET status = $2, updated_at = $3
            WHERE id = $1 AND status != $4 AND approval_status = $5
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(now)
    .bind(RiderStatus::Busy)
    .bind(ApprovalStatus::Approved)
    .fetch_optional(conn)
    .await?;
    Ok(rider)
}

pub async fn add_earnings(
    id: i64,
    amount: Kobo,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Rider>, sqlx::Error> {
    let rider =
        sqlx::query_as("UPDATE riders SET total_earnings = total_earnings + $2, updated_at = $3 WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(amount)
            .bind(now)
            .fetch_optional(conn)
            .await?;
    Ok(rider)
}

pub async fn update_location(
    id: i64,
    lat: f64,
    lng: f64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Rider>, sqlx::Error> {
    let rider = sqlx::query_as(
        "UPDATE riders SET current_lat = $2, current_lng = $3, updated_at = $4 WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(lat)
    .bind(lng)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(rider)
}
