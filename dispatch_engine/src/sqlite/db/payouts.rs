//! Merchant payouts, wallet withdrawals and delivery-fee splits.
use chrono::{DateTime, Utc};
use dispatch_common::Kobo;
use sqlx::SqliteConnection;

use crate::db_types::{
    DeliveryFeeTransaction,
    FeeTransactionStatus,
    Payout,
    PayoutStatus,
    Withdrawal,
    WithdrawalStatus,
};

pub async fn insert_payout(
    merchant_id: i64,
    order_id: i64,
    amount: Kobo,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payout, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            INSERT INTO payouts (merchant_id, order_id, amount, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *;
        "#,
    )
    .bind(merchant_id)
    .bind(order_id)
    .bind(amount)
    .bind(PayoutStatus::Pending)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(payout)
}

pub async fn fetch_payout(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as("SELECT * FROM payouts WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payout)
}

pub async fn fetch_payout_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Payout>, sqlx::Error> {
    let payout =
        sqlx::query_as("SELECT * FROM payouts WHERE order_id = $1").bind(order_id).fetch_optional(conn).await?;
    Ok(payout)
}

/// Moves the payout from `from` to `to`. Returns `None` if it was not in the `from` state.
pub async fn update_payout_status(
    id: i64,
    from: PayoutStatus,
    to: PayoutStatus,
    transfer_reference: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Payout>, sqlx::Error> {
    let payout = sqlx::query_as(
        r#"
            UPDATE payouts SET status = $2, transfer_reference = COALESCE($3, transfer_reference), updated_at = $4
            WHERE id = $1 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(id)
    .bind(to)
    .bind(transfer_reference)
    .bind(now)
    .bind(from)
    .fetch_optional(conn)
    .await?;
    Ok(payout)
}

pub async fn insert_withdrawal(
    wallet_id: i64,
    amount: Kobo,
    reference: &str,
    recipient_code: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Withdrawal, sqlx::Error> {
    let withdrawal = sqlx::query_as(
        r#"
            INSERT INTO withdrawals (wallet_id, amount, reference, recipient_code, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *;
        "#,
    )
    .bind(wallet_id)
    .bind(amount)
    .bind(reference)
    .bind(recipient_code)
    .bind(WithdrawalStatus::Pending)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(withdrawal)
}

/// Settles a pending withdrawal. Returns `None` if there is no pending withdrawal with the reference.
pub async fn settle_withdrawal(
    reference: &str,
    status: WithdrawalStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Withdrawal>, sqlx::Error> {
    let withdrawal = sqlx::query_as(
        r#"
            UPDATE withdrawals SET status = $2, updated_at = $3
            WHERE reference = $1 AND status = $4
            RETURNING *;
        "#,
    )
    .bind(reference)
    .bind(status)
    .bind(now)
    .bind(WithdrawalStatus::Pending)
    .fetch_optional(conn)
    .await?;
    Ok(withdrawal)
}

pub async fn insert_fee_transaction(
    delivery_id: i64,
    rider_id: i64,
    total_fee: Kobo,
    rider_amount: Kobo,
    platform_amount: Kobo,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<DeliveryFeeTransaction, sqlx::Error> {
    let fee = sqlx::query_as(
        r#"
            INSERT INTO delivery_fee_transactions
                (delivery_id, rider_id, total_fee, rider_amount, platform_amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(delivery_id)
    .bind(rider_id)
    .bind(total_fee)
    .bind(rider_amount)
    .bind(platform_amount)
    .bind(FeeTransactionStatus::Completed)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(fee)
}

pub async fn fetch_fee_transaction(
    delivery_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<DeliveryFeeTransaction>, sqlx::Error> {
    let fee = sqlx::query_as("SELECT * FROM delivery_fee_transactions WHERE delivery_id = $1")
        .bind(delivery_id)
        .fetch_optional(conn)
        .await?;
    Ok(fee)
}
