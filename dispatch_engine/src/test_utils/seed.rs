//! Seed data for tests, written straight through the low-level store functions.
use chrono::{Duration, Utc};
use dispatch_common::Kobo;
use serde_json::json;

use crate::{
    db_types::{ApprovalStatus, Location, Merchant, Order, OrderDraft, PricedLine, Product, Rider, RiderStatus},
    helpers::{calculate_webhook_signature, new_payment_reference},
    sqlite::db::{merchants, products, riders},
    OrderManagement,
    SqliteDatabase,
};

pub const CUSTOMER: &str = "+2348030000001";
pub const WEBHOOK_SECRET: &str = "sk_test_dispatch_webhook";

pub fn ikeja_pickup() -> Location {
    Location { address: "Shop 4, Computer Village, Ikeja".into(), lat: 6.5966, lng: 3.3421 }
}

pub async fn seed_merchant(db: &SqliteDatabase, name: &str, pickup: Option<Location>) -> Merchant {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    merchants::insert_merchant(name, "+2348020000001", pickup.as_ref(), &mut conn)
        .await
        .expect("Error inserting merchant")
}

/// Inserts a product. Prices are in naira.
pub async fn seed_product(
    db: &SqliteDatabase,
    merchant_id: i64,
    name: &str,
    retail: i64,
    wholesale: i64,
    stock: i64,
) -> Product {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    products::insert_product(merchant_id, name, Kobo::from_naira(retail), Kobo::from_naira(wholesale), stock, &mut conn)
        .await
        .expect("Error inserting product")
}

pub async fn fetch_product(db: &SqliteDatabase, id: i64) -> Product {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    products::fetch_product(id, &mut conn).await.expect("Error fetching product").expect("No such product")
}

/// Inserts an approved rider with the given status.
pub async fn seed_rider(db: &SqliteDatabase, name: &str, phone: &str, status: RiderStatus) -> Rider {
    let mut conn = db.pool().acquire().await.expect("Error acquiring connection");
    riders::insert_rider(name, phone, ApprovalStatus::Approved, status, &mut conn).await.expect("Error inserting rider")
}

/// Inserts an order awaiting payment for `qty` units of each product, without going through checkout.
pub async fn seed_order(
    db: &SqliteDatabase,
    merchant_id: i64,
    lines: &[(&Product, i64)],
    delivery_fee: Kobo,
    reserve_stock: bool,
) -> Order {
    let now = Utc::now();
    let draft = OrderDraft {
        customer_id: CUSTOMER.into(),
        merchant_id,
        delivery_address: "12 Allen Avenue, Ikeja".into(),
        delivery_lat: 6.6018,
        delivery_lng: 3.3515,
        delivery_fee,
        payment_reference: new_payment_reference(now),
        payment_expires_at: now + Duration::minutes(30),
        reserve_stock,
        lines: lines
            .iter()
            .map(|(p, qty)| PricedLine {
                product_id: p.id,
                product_name: p.name.clone(),
                quantity: *qty,
                unit_price: p.retail_price,
                wholesale_price: p.wholesale_price,
            })
            .collect(),
    };
    let (order, _) = db.insert_order(draft, "ORD").await.expect("Error inserting order");
    order
}

/// A `charge.success` / `charge.failed` webhook body as the gateway would send it.
pub fn charge_event(event: &str, reference: &str, amount: Kobo) -> Vec<u8> {
    let status = if event == "charge.success" { "success" } else { "failed" };
    let body = json!({
        "event": event,
        "data": {
            "id": 302961,
            "domain": "test",
            "status": status,
            "reference": reference,
            "amount": amount.value(),
            "gateway_response": "Approved",
            "currency": "NGN",
            "channel": "card"
        }
    });
    body.to_string().into_bytes()
}

pub fn sign(body: &[u8]) -> String {
    calculate_webhook_signature(WEBHOOK_SECRET, body)
}
