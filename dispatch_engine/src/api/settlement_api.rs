use std::fmt::Debug;

use dispatch_common::Kobo;
use log::*;

use crate::{
    api::{
        activity_api::ActivityApi,
        engine_config::EngineConfig,
        errors::SettlementError,
        withdrawal_api::{resolve_transfer_recipient, BankDetails},
    },
    db_types::{EscrowStatus, NewActivity, Payout, PayoutStatus, Severity, WalletOwner},
    events::{EscrowReleasedEvent, EventProducers},
    traits::{LedgerStore, PaymentGateway, SettlementBreakdown, SettlementRecord, TransferRequest},
};

/// The settlement engine. Turns a held escrow into a merchant payout, a rider fee and platform revenue.
#[derive(Clone)]
pub struct SettlementApi<B, G> {
    db: B,
    gateway: G,
    activity: ActivityApi<B>,
    producers: EventProducers,
    config: EngineConfig,
}

impl<B, G> Debug for SettlementApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementApi")
    }
}

impl<B: Clone, G> SettlementApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers, config: EngineConfig) -> Self {
        let activity = ActivityApi::new(db.clone(), producers.clone());
        Self { db, gateway, activity, producers, config }
    }
}

impl<B, G> SettlementApi<B, G>
where
    B: LedgerStore,
    G: PaymentGateway,
{
    /// Computes how the escrow for `order_id` will be split, from the prices captured on the order lines.
    pub async fn calculate_breakdown(&self, order_id: i64) -> Result<SettlementBreakdown, SettlementError> {
        let escrow = self.db.fetch_escrow_for_order(order_id).await?.ok_or(SettlementError::NotFound(order_id))?;
        let items = self.db.fetch_order_items(order_id).await?;
        Ok(SettlementBreakdown::calculate(&items, escrow.delivery_fee_amount, self.config.rider_fee_percent))
    }

    /// Releases the escrow for `order_id`.
    ///
    /// The status check and every wallet credit happen in one store transaction, so a release either happens
    /// completely, exactly once, or not at all. A second call fails with [`SettlementError::AlreadyReleased`].
    pub async fn release_escrow(&self, order_id: i64) -> Result<SettlementRecord, SettlementError> {
        let escrow = self.db.fetch_escrow_for_order(order_id).await?.ok_or(SettlementError::NotFound(order_id))?;
        if escrow.status == EscrowStatus::Released {
            return Err(SettlementError::AlreadyReleased(order_id));
        }
        let items = self.db.fetch_order_items(order_id).await?;
        let breakdown = SettlementBreakdown::calculate(&items, escrow.delivery_fee_amount, self.config.rider_fee_percent);
        if breakdown.total() != escrow.amount {
            let msg = format!(
                "Escrow for order #{order_id} holds {} but the order lines add up to {}. Releasing by line prices.",
                escrow.amount,
                breakdown.total()
            );
            self.activity.log(NewActivity::new("settlement", Severity::High, msg).for_order(order_id)).await;
        }
        let record = self.db.release_escrow(order_id, &breakdown).await?;
        info!(
            "💰️ Escrow for order #{order_id} released. Merchant {}, rider {}, platform {}",
            breakdown.merchant_amount,
            breakdown.rider_amount,
            breakdown.platform_total()
        );
        let event = EscrowReleasedEvent {
            order_id,
            merchant_id: record.escrow.merchant_id,
            payout_id: record.payout.id,
            payout_amount: record.payout.amount,
            breakdown,
        };
        self.producers.publish_escrow_released(event).await;
        Ok(record)
    }

    /// Releases the escrow unless it has already been released, which is not an error for the callers that race to
    /// trigger it (customer confirmation, the auto-release sweep, an admin).
    pub async fn release_if_held(&self, order_id: i64) -> Result<Option<SettlementRecord>, SettlementError> {
        match self.release_escrow(order_id).await {
            Ok(record) => Ok(Some(record)),
            Err(SettlementError::AlreadyReleased(_)) => {
                debug!("💰️ Escrow for order #{order_id} was already released. Nothing to do.");
                Ok(None)
            },
            Err(e) => Err(e),
        }
    }

    /// Pays a merchant payout out to the given bank account. Failed payouts can be retried.
    pub async fn process_payout(&self, payout_id: i64, bank: &BankDetails) -> Result<Payout, SettlementError> {
        let payout = self.db.fetch_payout(payout_id).await?.ok_or(SettlementError::PayoutNotFound(payout_id))?;
        if !matches!(payout.status, PayoutStatus::Pending | PayoutStatus::Failed) {
            return Err(SettlementError::PayoutNotPending(payout_id));
        }
        let payout = self.db.update_payout_status(payout_id, payout.status, PayoutStatus::Processing, None).await?;
        let transfer = async {
            let recipient_code = resolve_transfer_recipient(&self.gateway, bank).await?;
            let request = TransferRequest {
                recipient_code,
                amount: payout.amount,
                reference: format!("PAYOUT-{payout_id}"),
                reason: format!("Payout for order #{}", payout.order_id),
            };
            self.gateway.initiate_transfer(&request).await
        };
        match transfer.await {
            Ok(ack) => {
                let paid = self
                    .db
                    .update_payout_status(payout_id, PayoutStatus::Processing, PayoutStatus::Paid, Some(&ack.transfer_code))
                    .await?;
                info!("💰️ Payout #{payout_id} of {} sent ({})", paid.amount, ack.transfer_code);
                Ok(paid)
            },
            Err(e) => {
                self.db.update_payout_status(payout_id, PayoutStatus::Processing, PayoutStatus::Failed, None).await?;
                let msg = format!("Payout #{payout_id} of {} for merchant #{} failed. {e}", payout.amount, payout.merchant_id);
                self.activity.log(NewActivity::new("payout", Severity::High, msg).for_order(payout.order_id)).await;
                Err(SettlementError::Gateway(e))
            },
        }
    }

    /// Checks that a wallet's balance equals the signed sum of its ledger entries.
    pub async fn wallet_is_consistent(&self, owner: WalletOwner) -> Result<bool, SettlementError> {
        let Some(wallet) = self.db.fetch_wallet(owner).await? else {
            return Ok(true);
        };
        let entries = self.db.fetch_wallet_transactions(wallet.id).await?;
        let sum = entries.iter().map(|e| e.signed_amount()).sum::<Kobo>();
        if sum != wallet.balance {
            error!("💰️ Wallet #{} for {owner} has a balance of {} but its entries sum to {sum}", wallet.id, wallet.balance);
        }
        Ok(sum == wallet.balance)
    }
}
