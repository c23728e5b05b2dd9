use dispatch_common::Kobo;
use dispatch_engine::{
    api::withdrawal_api::BankDetails,
    db_types::{EscrowStatus, FeeTransactionStatus, PayoutStatus, RiderStatus, Severity, TransactionType, WalletOwner},
    DeliveryManagement,
    SettlementError,
    SettlementManagement,
    WithdrawalError,
};

mod support;

use support::Harness;

fn gtbank() -> BankDetails {
    BankDetails { bank_name: "GTBank".into(), account_number: "0123456789".into() }
}

#[tokio::test]
async fn confirmation_splits_the_escrow() {
    let h = Harness::new().await;
    let (order, delivery, rider) = h.delivered_order().await;
    let record = h.deliveries.confirm_delivery(delivery.id).await.unwrap().expect("escrow should be released");

    let b = record.breakdown;
    assert_eq!(b.merchant_amount, Kobo::from_naira(5_000));
    assert_eq!(b.commission, Kobo::from_naira(1_000));
    assert_eq!(b.rider_amount, Kobo::from_naira(1_200));
    assert_eq!(b.platform_delivery_fee, Kobo::from_naira(300));
    assert_eq!(b.total(), order.total_amount);

    assert_eq!(record.escrow.status, EscrowStatus::Released);
    assert_eq!(record.payout.status, PayoutStatus::Pending);
    assert_eq!(record.payout.amount, Kobo::from_naira(5_000));
    assert!(h.db.fetch_wallet(WalletOwner::Merchant(h.merchant.id)).await.unwrap().is_none(), "merchants are paid by payout");
    let fee = record.fee_transaction.expect("a fee transaction should be recorded");
    assert_eq!(fee.status, FeeTransactionStatus::Completed);
    assert_eq!(fee.rider_id, rider.id);

    let rider_wallet = h.db.fetch_wallet(WalletOwner::Rider(rider.id)).await.unwrap().unwrap();
    assert_eq!(rider_wallet.balance, Kobo::from_naira(1_200));
    assert_eq!(rider_wallet.total_earned, Kobo::from_naira(1_200));
    let platform = h.db.fetch_wallet(WalletOwner::Platform).await.unwrap().unwrap();
    assert_eq!(platform.balance, Kobo::from_naira(1_300));
    assert_eq!(platform.commission_earned, Kobo::from_naira(1_000));
    assert_eq!(platform.delivery_fees_earned, Kobo::from_naira(300));
    let rider = h.db.fetch_rider(rider.id).await.unwrap().unwrap();
    assert_eq!(rider.total_earnings, Kobo::from_naira(1_200));

    let settlement = h.deliveries.settlement();
    assert!(settlement.wallet_is_consistent(WalletOwner::Rider(rider.id)).await.unwrap());
    assert!(settlement.wallet_is_consistent(WalletOwner::Platform).await.unwrap());
    assert!(h.notifier.received(&h.merchant.phone, "payout"));
    h.tear_down().await;
}

#[tokio::test]
async fn escrow_is_released_only_once() {
    let h = Harness::new().await;
    let (order, delivery, rider) = h.delivered_order().await;
    assert!(h.deliveries.confirm_delivery(delivery.id).await.unwrap().is_some());
    assert!(h.deliveries.confirm_delivery(delivery.id).await.unwrap().is_none());
    let err = h.deliveries.settlement().release_escrow(order.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::AlreadyReleased(id) if id == order.id));

    let wallet = h.db.fetch_wallet(WalletOwner::Rider(rider.id)).await.unwrap().unwrap();
    let entries = h.db.fetch_wallet_transactions(wallet.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(wallet.balance, Kobo::from_naira(1_200));
    h.tear_down().await;
}

#[tokio::test]
async fn racing_releases_credit_once() {
    let h = Harness::new().await;
    let (order, _delivery, rider) = h.delivered_order().await;
    let settlement = h.deliveries.settlement();
    let (a, b, c) = tokio::join!(
        settlement.release_if_held(order.id),
        settlement.release_if_held(order.id),
        settlement.release_if_held(order.id),
    );
    let released = [a.unwrap(), b.unwrap(), c.unwrap()].iter().filter(|r| r.is_some()).count();
    assert_eq!(released, 1);
    let wallet = h.db.fetch_wallet(WalletOwner::Rider(rider.id)).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Kobo::from_naira(1_200));
    assert!(settlement.wallet_is_consistent(WalletOwner::Platform).await.unwrap());
    h.tear_down().await;
}

#[tokio::test]
async fn release_without_escrow_is_not_found() {
    let h = Harness::new().await;
    let product = h.product(5).await;
    let order = h.order(&product, 1).await;
    let err = h.deliveries.settlement().release_escrow(order.id).await.unwrap_err();
    assert!(matches!(err, SettlementError::NotFound(_)));
    h.tear_down().await;
}

#[tokio::test]
async fn unassigned_delivery_fee_goes_to_the_platform() {
    let h = Harness::new().await;
    let product = h.product(5).await;
    let order = h.order(&product, 1).await;
    let _ = h.pay(&order).await;
    let record = h.deliveries.settlement().release_escrow(order.id).await.unwrap();
    assert!(record.fee_transaction.is_none());
    let platform = h.db.fetch_wallet(WalletOwner::Platform).await.unwrap().unwrap();
    // ₦500 markup plus the whole ₦1,500 fee
    assert_eq!(platform.balance, Kobo::from_naira(2_000));
    h.tear_down().await;
}

#[tokio::test]
async fn payouts_are_sent_and_can_be_retried() {
    let h = Harness::new().await;
    let (_order, delivery, _rider) = h.delivered_order().await;
    let record = h.deliveries.confirm_delivery(delivery.id).await.unwrap().unwrap();
    let settlement = h.deliveries.settlement();

    h.gateway.fail_transfers(true);
    let err = settlement.process_payout(record.payout.id, &gtbank()).await.unwrap_err();
    assert!(matches!(err, SettlementError::Gateway(_)));
    let payout = h.db.fetch_payout(record.payout.id).await.unwrap().unwrap();
    assert_eq!(payout.status, PayoutStatus::Failed);
    assert!(h.has_alert(record.payout.order_id, "payout", Severity::High).await);

    h.gateway.fail_transfers(false);
    let payout = settlement.process_payout(record.payout.id, &gtbank()).await.unwrap();
    assert_eq!(payout.status, PayoutStatus::Paid);
    assert!(payout.transfer_reference.is_some());
    let transfers = h.gateway.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].reference, format!("PAYOUT-{}", payout.id));
    assert_eq!(transfers[0].amount, Kobo::from_naira(5_000));

    let err = settlement.process_payout(record.payout.id, &gtbank()).await.unwrap_err();
    assert!(matches!(err, SettlementError::PayoutNotPending(_)));
    h.tear_down().await;
}

#[tokio::test]
async fn withdrawal_debits_the_wallet() {
    let h = Harness::new().await;
    let (_order, delivery, rider) = h.delivered_order().await;
    h.deliveries.confirm_delivery(delivery.id).await.unwrap();
    let owner = WalletOwner::Rider(rider.id);

    let withdrawal = h.withdrawals.withdraw(owner, Kobo::from_naira(1_000), &gtbank()).await.unwrap();
    assert!(withdrawal.reference.starts_with("WDR-"));
    let wallet = h.db.fetch_wallet(owner).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Kobo::from_naira(200));
    assert_eq!(wallet.total_withdrawn, Kobo::from_naira(1_000));
    let entries = h.db.fetch_wallet_transactions(wallet.id).await.unwrap();
    assert_eq!(entries.last().unwrap().tx_type, TransactionType::Withdrawal);
    assert!(h.deliveries.settlement().wallet_is_consistent(owner).await.unwrap());

    let err = h.withdrawals.withdraw(owner, Kobo::from_naira(500), &gtbank()).await.unwrap_err();
    assert!(matches!(err, WithdrawalError::InsufficientFunds { .. }));
    let err = h.withdrawals.withdraw(owner, Kobo::from(0), &gtbank()).await.unwrap_err();
    assert!(matches!(err, WithdrawalError::InvalidAmount(_)));
    h.tear_down().await;
}

#[tokio::test]
async fn failed_transfer_restores_the_balance() {
    let h = Harness::new().await;
    let (_order, delivery, rider) = h.delivered_order().await;
    h.deliveries.confirm_delivery(delivery.id).await.unwrap();
    let owner = WalletOwner::Rider(rider.id);

    h.gateway.fail_transfers(true);
    let err = h.withdrawals.withdraw(owner, Kobo::from_naira(1_000), &gtbank()).await.unwrap_err();
    assert!(matches!(err, WithdrawalError::TransferFailed(_)));
    let wallet = h.db.fetch_wallet(owner).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Kobo::from_naira(1_200));
    assert_eq!(wallet.total_withdrawn, Kobo::default());
    let entries = h.db.fetch_wallet_transactions(wallet.id).await.unwrap();
    let types = entries.iter().map(|e| e.tx_type).collect::<Vec<_>>();
    assert_eq!(types, vec![TransactionType::Credit, TransactionType::Withdrawal, TransactionType::Credit]);
    assert!(h.deliveries.settlement().wallet_is_consistent(owner).await.unwrap());

    h.gateway.fail_account_lookup(true);
    let err = h.withdrawals.withdraw(owner, Kobo::from_naira(100), &gtbank()).await.unwrap_err();
    assert!(matches!(err, WithdrawalError::AccountVerification(_)));
    h.tear_down().await;
}

#[tokio::test]
async fn rider_without_wallet_cannot_withdraw() {
    let h = Harness::new().await;
    let rider = dispatch_engine::test_utils::seed::seed_rider(&h.db, "Ify", "+2348050000002", RiderStatus::Available).await;
    let err = h.withdrawals.withdraw(WalletOwner::Rider(rider.id), Kobo::from_naira(100), &gtbank()).await.unwrap_err();
    assert!(matches!(err, WithdrawalError::WalletNotFound(_)));
    h.tear_down().await;
}

#[tokio::test]
async fn ledger_rows_cannot_be_rewritten() {
    let h = Harness::new().await;
    let (_, delivery, _) = h.delivered_order().await;
    h.deliveries.confirm_delivery(delivery.id).await.unwrap().expect("escrow should be released");
    let pool = h.db.pool();
    for sql in [
        "UPDATE wallet_transactions SET amount = amount + 1",
        "DELETE FROM wallet_transactions",
        "UPDATE delivery_events SET note = 'edited'",
        "DELETE FROM delivery_events",
        "UPDATE delivery_fee_transactions SET rider_amount = total_fee, platform_amount = 0",
        "DELETE FROM delivery_fee_transactions",
    ] {
        let result = sqlx::query(sql).execute(pool).await;
        assert!(result.is_err(), "{sql} should have been refused");
    }
    h.tear_down().await;
}
