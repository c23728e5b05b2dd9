use chrono::{DateTime, Utc};
use dispatch_common::Kobo;
use log::trace;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::db_types::{Product, StockLine};

pub async fn insert_product(
    merchant_id: i64,
    name: &str,
    retail_price: Kobo,
    wholesale_price: Kobo,
    stock: i64,
    conn: &mut SqliteConnection,
) -> Result<Product, sqlx::Error> {
    let product = sqlx::query_as(
        r#"
            INSERT INTO products (merchant_id, name, retail_price, wholesale_price, stock, active, updated_at)
            VALUES ($1, $2, $3, $4, $5, 1, $6)
            RETURNING *;
        "#,
    )
    .bind(merchant_id)
    .bind(name)
    .bind(retail_price)
    .bind(wholesale_price)
    .bind(stock)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(product)
}

pub async fn fetch_product(id: i64, conn: &mut SqliteConnection) -> Result<Option<Product>, sqlx::Error> {
    let product = sqlx::query_as("SELECT * FROM products WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(product)
}

pub async fn fetch_products(ids: &[i64], conn: &mut SqliteConnection) -> Result<Vec<Product>, sqlx::Error> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut builder = QueryBuilder::<Sqlite>::new("SELECT * FROM products WHERE id IN (");
    let mut list = builder.separated(", ");
    for id in ids {
        list.push_bind(*id);
    }
    builder.push(") ORDER BY id");
    trace!("🗃️ Executing query: {}", builder.sql());
    let products = builder.build_query_as::<Product>().fetch_all(conn).await?;
    Ok(products)
}

/// The stock position of every line on the order, with repeated products collapsed into one line.
pub async fn fetch_stock_lines(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<StockLine>, sqlx::Error> {
    let lines = sqlx::query_as(
        r#"
            SELECT
                oi.product_id AS product_id,
                MIN(oi.product_name) AS product_name,
                SUM(oi.quantity) AS required,
                p.stock AS available,
                p.active AS active
            FROM order_items oi JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = $1
            GROUP BY oi.product_id, p.stock, p.active
            ORDER BY oi.product_id;
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(lines)
}

/// Decrements stock for a product if, and only if, enough units are on hand. Returns `false` (and changes nothing)
/// otherwise.
pub async fn take_stock(
    product_id: i64,
    quantity: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE products SET stock = stock - $2, updated_at = $3 WHERE id = $1 AND active = 1 AND stock >= $2",
    )
    .bind(product_id)
    .bind(quantity)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn restore_stock(
    product_id: i64,
    quantity: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE products SET stock = stock + $2, updated_at = $3 WHERE id = $1")
        .bind(product_id)
        .bind(quantity)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}
