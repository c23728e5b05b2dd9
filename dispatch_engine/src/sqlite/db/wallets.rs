//! Wallets and their append-only ledgers.
//!
//! The balance is only changed by [`post_entry`], which writes the matching ledger row on the same connection. Run it
//! inside a transaction so that the two writes commit together.
use chrono::{DateTime, Utc};
use dispatch_common::Kobo;
use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{TransactionType, Wallet, WalletOwner, WalletTransaction},
    traits::LedgerError,
};

pub async fn fetch_wallet(owner: WalletOwner, conn: &mut SqliteConnection) -> Result<Option<Wallet>, sqlx::Error> {
    let wallet = sqlx::query_as("SELECT * FROM wallets WHERE owner_type = $1 AND owner_id = $2")
        .bind(owner.owner_type())
        .bind(owner.owner_id())
        .fetch_optional(conn)
        .await?;
    Ok(wallet)
}

/// Returns the wallet for `owner`, creating an empty one if it does not exist yet.
pub async fn fetch_or_create_wallet(
    owner: WalletOwner,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Wallet, sqlx::Error> {
    sqlx::query("INSERT INTO wallets (owner_type, owner_id, updated_at) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING")
        .bind(owner.owner_type())
        .bind(owner.owner_id())
        .bind(now)
        .execute(&mut *conn)
        .await?;
    let wallet = sqlx::query_as("SELECT * FROM wallets WHERE owner_type = $1 AND owner_id = $2")
        .bind(owner.owner_type())
        .bind(owner.owner_id())
        .fetch_one(conn)
        .await?;
    Ok(wallet)
}

/// Applies a signed ledger entry to the wallet's balance and appends the entry, with the resulting balance as its
/// `balance_after` snapshot.
///
/// Debits and withdrawals are guarded: if the balance cannot cover the amount nothing is written and
/// [`LedgerError::InsufficientFunds`] is returned.
pub async fn post_entry(
    wallet_id: i64,
    tx_type: TransactionType,
    amount: Kobo,
    reference: &str,
    description: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<WalletTransaction, LedgerError> {
    let signed = tx_type.signed(amount);
    let wallet: Option<Wallet> = sqlx::query_as(
        r#"
            UPDATE wallets SET balance = balance + $2, updated_at = $3
            WHERE id = $1 AND balance + $2 >= 0
            RETURNING *;
        "#,
    )
    .bind(wallet_id)
    .bind(signed)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;
    let wallet = match wallet {
        Some(w) => w,
        None => {
            let balance: Option<Kobo> = sqlx::query_scalar("SELECT balance FROM wallets WHERE id = $1")
                .bind(wallet_id)
                .fetch_optional(&mut *conn)
                .await?;
            return match balance {
                Some(balance) => Err(LedgerError::InsufficientFunds { balance, requested: amount }),
                None => Err(LedgerError::WalletNotFound(format!("wallet #{wallet_id}"))),
            };
        },
    };
    let entry: WalletTransaction = sqlx::query_as(
        r#"
            INSERT INTO wallet_transactions (wallet_id, tx_type, amount, balance_after, reference, description, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *;
        "#,
    )
    .bind(wallet_id)
    .bind(tx_type)
    .bind(amount)
    .bind(wallet.balance)
    .bind(reference)
    .bind(description)
    .bind(now)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Wallet #{wallet_id}: {tx_type} of {amount} [{reference}]. Balance is now {}", wallet.balance);
    Ok(entry)
}

/// Adjusts the lifetime revenue counters. These are informational and never feed back into the balance.
pub async fn add_to_counters(
    wallet_id: i64,
    earned: Kobo,
    commission: Kobo,
    delivery_fees: Kobo,
    withdrawn: Kobo,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
            UPDATE wallets SET
                total_earned = total_earned + $2,
                commission_earned = commission_earned + $3,
                delivery_fees_earned = delivery_fees_earned + $4,
                total_withdrawn = total_withdrawn + $5
            WHERE id = $1;
        "#,
    )
    .bind(wallet_id)
    .bind(earned)
    .bind(commission)
    .bind(delivery_fees)
    .bind(withdrawn)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_transactions(wallet_id: i64, conn: &mut SqliteConnection) -> Result<Vec<WalletTransaction>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM wallet_transactions WHERE wallet_id = $1 ORDER BY id")
        .bind(wallet_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
