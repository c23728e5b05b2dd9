use std::fmt::Debug;

use chrono::Utc;
use dispatch_common::Kobo;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    api::{activity_api::ActivityApi, errors::WithdrawalError},
    db_types::{NewActivity, Severity, WalletOwner, Withdrawal},
    events::EventProducers,
    helpers::new_withdrawal_reference,
    traits::{GatewayError, LedgerStore, PaymentGateway, TransferRequest},
};

/// Bank details as a merchant or rider types them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankDetails {
    pub bank_name: String,
    pub account_number: String,
}

/// Resolves the bank, verifies the account number and registers the account as a transfer recipient. Returns the
/// gateway's recipient code.
pub async fn resolve_transfer_recipient<G: PaymentGateway>(
    gateway: &G,
    details: &BankDetails,
) -> Result<String, GatewayError> {
    let bank_code = gateway.resolve_bank_code(&details.bank_name).await?;
    let account = gateway.verify_account_number(&details.account_number, &bank_code).await?;
    trace!("💸️ Account {} at {} belongs to {}", account.account_number, details.bank_name, account.account_name);
    gateway.create_transfer_recipient(&account).await
}

/// Moves money out of merchant and rider wallets to their bank accounts.
#[derive(Clone)]
pub struct WithdrawalApi<B, G> {
    db: B,
    gateway: G,
    activity: ActivityApi<B>,
}

impl<B, G> Debug for WithdrawalApi<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WithdrawalApi")
    }
}

impl<B: Clone, G> WithdrawalApi<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers) -> Self {
        let activity = ActivityApi::new(db.clone(), producers);
        Self { db, gateway, activity }
    }
}

impl<B, G> WithdrawalApi<B, G>
where
    B: LedgerStore,
    G: PaymentGateway,
{
    /// Withdraws `amount` from the owner's wallet.
    ///
    /// The wallet is debited before the transfer is initiated, so the same funds cannot be withdrawn twice. If the
    /// gateway refuses the transfer, a compensating credit restores the balance and the error is returned.
    pub async fn withdraw(
        &self,
        owner: WalletOwner,
        amount: Kobo,
        bank: &BankDetails,
    ) -> Result<Withdrawal, WithdrawalError> {
        if !amount.is_positive() {
            return Err(WithdrawalError::InvalidAmount(amount));
        }
        let wallet = self.db.fetch_wallet(owner).await?.ok_or_else(|| WithdrawalError::WalletNotFound(owner.to_string()))?;
        if wallet.balance < amount {
            return Err(WithdrawalError::InsufficientFunds { balance: wallet.balance, requested: amount });
        }
        let recipient =
            resolve_transfer_recipient(&self.gateway, bank).await.map_err(WithdrawalError::AccountVerification)?;
        let reference = new_withdrawal_reference(Utc::now());
        let withdrawal = self.db.begin_withdrawal(owner, amount, &reference, &recipient).await?;
        info!("💸️ {owner} wallet debited {amount} for withdrawal {reference}");
        let request = TransferRequest {
            recipient_code: recipient,
            amount,
            reference: reference.clone(),
            reason: format!("Wallet withdrawal {reference}"),
        };
        match self.gateway.initiate_transfer(&request).await {
            Ok(ack) => {
                debug!("💸️ Transfer {} for withdrawal {reference} is {}", ack.transfer_code, ack.status);
                let withdrawal = self.db.complete_withdrawal(&reference).await?;
                Ok(withdrawal)
            },
            Err(e) => {
                warn!("💸️ Transfer for withdrawal {reference} failed. {e}. Reversing the debit.");
                match self.db.fail_withdrawal(&reference).await {
                    Ok(_) => {
                        let msg = format!("Transfer for {owner} withdrawal {reference} of {amount} failed and was reversed. {e}");
                        self.activity.log(NewActivity::new("withdrawal", Severity::High, msg)).await;
                        Err(WithdrawalError::TransferFailed(e))
                    },
                    Err(reversal) => {
                        let msg = format!(
                            "Transfer for {owner} withdrawal {reference} of {amount} failed ({e}) and the debit could \
                             NOT be reversed ({reversal}). Withdrawal #{} needs manual attention.",
                            withdrawal.id
                        );
                        self.activity.log(NewActivity::new("withdrawal", Severity::Critical, msg)).await;
                        Err(WithdrawalError::from(reversal))
                    },
                }
            },
        }
    }
}
