use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::db_types::{FulfillmentStatus, Order, OrderDraft, OrderItem, PaymentStatus, PricedLine};

/// Inserts a new order using the given connection. This is not atomic. Embed the call in a transaction together with
/// [`insert_item`] for every line, and pass `&mut *tx` as the connection argument.
pub async fn insert_order(
    draft: &OrderDraft,
    order_number: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_number,
                customer_id,
                merchant_id,
                delivery_address,
                delivery_lat,
                delivery_lng,
                subtotal,
                delivery_fee,
                total_amount,
                payment_reference,
                payment_status,
                status,
                stock_reserved,
                payment_expires_at,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
            RETURNING *;
        "#,
    )
    .bind(order_number)
    .bind(&draft.customer_id)
    .bind(draft.merchant_id)
    .bind(&draft.delivery_address)
    .bind(draft.delivery_lat)
    .bind(draft.delivery_lng)
    .bind(draft.subtotal())
    .bind(draft.delivery_fee)
    .bind(draft.total_amount())
    .bind(&draft.payment_reference)
    .bind(PaymentStatus::Pending)
    .bind(FulfillmentStatus::Pending)
    .bind(draft.reserve_stock)
    .bind(draft.payment_expires_at)
    .bind(now)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Order {} saved with id {} for {}", order.order_number, order.id, order.total_amount);
    Ok(order)
}

pub async fn insert_item(order_id: i64, line: &PricedLine, conn: &mut SqliteConnection) -> Result<OrderItem, sqlx::Error> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO order_items (order_id, product_id, product_name, quantity, unit_price, wholesale_price)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(order_id)
    .bind(line.product_id)
    .bind(&line.product_name)
    .bind(line.quantity)
    .bind(line.unit_price)
    .bind(line.wholesale_price)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_reference(
    reference: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE payment_reference = $1")
        .bind(reference)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_items(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<OrderItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

/// Moves an unpaid order to `PAID`/`PROCESSING`. An order whose earlier charge failed can still be paid, unless it
/// has been cancelled. Returns `None` if the order was not awaiting payment.
pub async fn mark_paid(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET payment_status = $2, status = $3, paid_at = $4, updated_at = $4
            WHERE id = $1 AND (payment_status = $5 OR (payment_status = $6 AND status != $7))
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(PaymentStatus::Paid)
    .bind(FulfillmentStatus::Processing)
    .bind(now)
    .bind(PaymentStatus::Pending)
    .bind(PaymentStatus::Failed)
    .bind(FulfillmentStatus::Cancelled)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Marks an unpaid order as `FAILED`, optionally cancelling it too. Returns `None` if the order was not awaiting
/// payment. Cancelling also applies to an order that already failed but was left open for another attempt.
pub async fn mark_failed(
    id: i64,
    cancel: bool,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                payment_status = $2,
                status = CASE WHEN $3 THEN $4 ELSE status END,
                updated_at = $5
            WHERE id = $1 AND (payment_status = $6 OR ($3 AND payment_status = $2 AND status != $4))
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(PaymentStatus::Failed)
    .bind(cancel)
    .bind(FulfillmentStatus::Cancelled)
    .bind(now)
    .bind(PaymentStatus::Pending)
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Order #{id} marked as failed (cancel: {cancel})");
    Ok(order)
}

/// Expires the order if it is still unpaid (pending, or failed but not yet cancelled) and its payment window closed
/// before `now`.
pub async fn expire_if_unpaid(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET payment_status = $2, status = $3, updated_at = $4
            WHERE id = $1 AND (payment_status = $5 OR (payment_status = $2 AND status != $3)) AND payment_expires_at < $4
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(PaymentStatus::Failed)
    .bind(FulfillmentStatus::Cancelled)
    .bind(now)
    .bind(PaymentStatus::Pending)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Clears the stock reservation flag. Returns `None` if the order held no reservation or is not cancelled.
pub async fn clear_reservation(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET stock_reserved = 0, updated_at = $2
            WHERE id = $1 AND stock_reserved = 1 AND status = $3
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(now)
    .bind(FulfillmentStatus::Cancelled)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Hands reserved units over to a paid order, so that later cancellations don't return them to stock.
pub async fn consume_reservation(
    id: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        "UPDATE orders SET stock_reserved = 0, updated_at = $2 WHERE id = $1 AND stock_reserved = 1 RETURNING *",
    )
    .bind(id)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn update_fulfillment_status(
    id: i64,
    status: FulfillmentStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("UPDATE orders SET status = $2, updated_at = $3 WHERE id = $1 RETURNING *")
        .bind(id)
        .bind(status)
        .bind(now)
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

pub async fn fetch_expired_unpaid(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        r#"
            SELECT * FROM orders
            WHERE (payment_status = $1 OR (payment_status = $3 AND status != $4)) AND payment_expires_at < $2
            ORDER BY payment_expires_at;
        "#,
    )
    .bind(PaymentStatus::Pending)
    .bind(now)
    .bind(PaymentStatus::Failed)
    .bind(FulfillmentStatus::Cancelled)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}

pub async fn fetch_holding_stock(now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        r#"
            SELECT * FROM orders
            WHERE ((payment_status = $1 OR (payment_status = $4 AND status != $3)) AND payment_expires_at < $2)
               OR (status = $3 AND stock_reserved = 1)
            ORDER BY id;
        "#,
    )
    .bind(PaymentStatus::Pending)
    .bind(now)
    .bind(FulfillmentStatus::Cancelled)
    .bind(PaymentStatus::Failed)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}
