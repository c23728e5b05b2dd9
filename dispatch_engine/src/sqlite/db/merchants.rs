use chrono::Utc;
use sqlx::SqliteConnection;

use crate::db_types::{Location, Merchant};

pub async fn insert_merchant(
    name: &str,
    phone: &str,
    pickup: Option<&Location>,
    conn: &mut SqliteConnection,
) -> Result<Merchant, sqlx::Error> {
    let merchant = sqlx::query_as(
        r#"
            INSERT INTO merchants (name, phone, pickup_address, pickup_lat, pickup_lng, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(name)
    .bind(phone)
    .bind(pickup.map(|l| l.address.clone()))
    .bind(pickup.map(|l| l.lat))
    .bind(pickup.map(|l| l.lng))
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(merchant)
}

pub async fn fetch_merchant(id: i64, conn: &mut SqliteConnection) -> Result<Option<Merchant>, sqlx::Error> {
    let merchant = sqlx::query_as("SELECT * FROM merchants WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(merchant)
}
