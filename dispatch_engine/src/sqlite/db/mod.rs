//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are simple functions (rather than stateful structs) that accept a `&mut SqliteConnection`
//! argument. Callers can obtain a connection from a pool, or create an atomic transaction as the need arises and call
//! through to the functions without any other changes.
//!
//! Guarded transitions are written as a single `UPDATE … WHERE status = <expected> RETURNING *`. An empty result means
//! the row was not in the expected state, and the caller decides whether that is an error or a no-op.
use std::{env, str::FromStr, time::Duration};

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod activity;
pub mod deliveries;
pub mod escrows;
pub mod idempotency;
pub mod leases;
pub mod merchants;
pub mod orders;
pub mod payouts;
pub mod products;
pub mod riders;
pub mod sequences;
pub mod wallets;

const SQLITE_DB_URL: &str = "sqlite://data/dispatch.db";

pub fn db_url() -> String {
    let result = env::var("DSP_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ DSP_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

/// Opens a pool in WAL mode. Writers queue on the busy timeout rather than failing immediately.
pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(15));
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
    Ok(pool)
}
