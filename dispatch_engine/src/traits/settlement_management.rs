use dispatch_common::Kobo;

use crate::{
    db_types::{DeliveryFeeTransaction, Escrow, Payout, PayoutStatus, Wallet, WalletOwner, WalletTransaction, Withdrawal},
    traits::{LedgerError, SettlementBreakdown, SettlementRecord},
};

/// Escrow, wallets and their ledgers, payouts and withdrawals.
///
/// Wallet balances are only ever changed together with a matching ledger entry, inside the same transaction, so that
/// a balance is always the signed sum of its entries.
#[allow(async_fn_in_trait)]
pub trait SettlementManagement: Clone {
    async fn fetch_escrow_for_order(&self, order_id: i64) -> Result<Option<Escrow>, LedgerError>;

    /// Releases the escrow for the order and distributes the funds as described by `breakdown`.
    ///
    /// In a single transaction:
    /// * The escrow moves from `HELD` to `RELEASED`. The update is guarded on the status, so a second release fails
    ///   with [`LedgerError::AlreadyReleased`] and nothing else is written.
    /// * A `PENDING` payout is created for the merchant amount.
    /// * The rider assigned to the order's delivery is credited their share of the delivery fee, their lifetime
    ///   earnings are incremented, and a `COMPLETED` delivery fee transaction is recorded. If no rider was ever
    ///   assigned, the whole fee goes to the platform.
    /// * The platform wallet is credited with the commission and its share of the delivery fee.
    async fn release_escrow(
        &self,
        order_id: i64,
        breakdown: &SettlementBreakdown,
    ) -> Result<SettlementRecord, LedgerError>;

    async fn fetch_wallet(&self, owner: WalletOwner) -> Result<Option<Wallet>, LedgerError>;

    async fn fetch_wallet_transactions(&self, wallet_id: i64) -> Result<Vec<WalletTransaction>, LedgerError>;

    async fn fetch_fee_transaction(&self, delivery_id: i64) -> Result<Option<DeliveryFeeTransaction>, LedgerError>;

    async fn fetch_payout(&self, id: i64) -> Result<Option<Payout>, LedgerError>;

    async fn fetch_payout_for_order(&self, order_id: i64) -> Result<Option<Payout>, LedgerError>;

    /// Moves a payout from `from` to `to`, failing with [`LedgerError::IllegalPayoutTransition`] if the payout is no
    /// longer in the `from` state.
    async fn update_payout_status(
        &self,
        id: i64,
        from: PayoutStatus,
        to: PayoutStatus,
        transfer_reference: Option<&str>,
    ) -> Result<Payout, LedgerError>;

    /// Debits the wallet with a `WITHDRAWAL` entry and records a pending withdrawal, atomically. Fails with
    /// [`LedgerError::InsufficientFunds`] if the balance does not cover `amount`.
    async fn begin_withdrawal(
        &self,
        owner: WalletOwner,
        amount: Kobo,
        reference: &str,
        recipient_code: &str,
    ) -> Result<Withdrawal, LedgerError>;

    async fn complete_withdrawal(&self, reference: &str) -> Result<Withdrawal, LedgerError>;

    /// Marks a pending withdrawal as failed and restores the funds with a compensating `CREDIT` entry.
    async fn fail_withdrawal(&self, reference: &str) -> Result<Withdrawal, LedgerError>;
}
