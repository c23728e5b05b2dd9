use chrono::{Duration, Utc};
use dispatch_common::Kobo;
use dispatch_engine::{
    api::reconciliation_api::Sweep,
    db_types::{DeliveryStatus, EscrowStatus, FulfillmentStatus, PaymentStatus, RiderStatus, Severity},
    test_utils::seed::{fetch_product, seed_order, seed_rider, CUSTOMER},
    DeliveryManagement,
    LeaseManagement,
    OrderManagement,
    SettlementManagement,
};

mod support;

use support::Harness;

#[tokio::test]
async fn expired_orders_are_cancelled_and_their_stock_returned() {
    let h = Harness::new().await;
    let product = h.product(10).await;
    let order = seed_order(&h.db, h.merchant.id, &[(&product, 4)], Kobo::from_naira(1_500), true).await;
    assert!(order.stock_reserved);
    assert_eq!(fetch_product(&h.db, product.id).await.stock, 6);

    let now = Utc::now();
    let report = h.sweeps.expire_unpaid_orders(now).await.unwrap();
    assert_eq!(report.candidates, 0);

    let later = now + Duration::minutes(31);
    let report = h.sweeps.expire_unpaid_orders(later).await.unwrap();
    assert_eq!((report.candidates, report.processed, report.failed), (1, 1, 0));
    let expired = h.db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(expired.payment_status, PaymentStatus::Failed);
    assert_eq!(expired.status, FulfillmentStatus::Cancelled);
    assert!(h.notifier.received(CUSTOMER, "did not receive payment in time"));

    let report = h.sweeps.cleanup_reserved_stock(later).await.unwrap();
    assert_eq!(report.processed, 1);
    assert_eq!(fetch_product(&h.db, product.id).await.stock, 10);
    let report = h.sweeps.cleanup_reserved_stock(later).await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(fetch_product(&h.db, product.id).await.stock, 10);
    h.tear_down().await;
}

#[tokio::test]
async fn cleanup_expires_orders_the_timeout_sweep_missed() {
    let h = Harness::new().await;
    let product = h.product(10).await;
    let order = seed_order(&h.db, h.merchant.id, &[(&product, 2)], Kobo::from_naira(1_500), true).await;
    let report = h.sweeps.cleanup_reserved_stock(Utc::now() + Duration::minutes(31)).await.unwrap();
    assert_eq!(report.processed, 1);
    let order = h.db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, FulfillmentStatus::Cancelled);
    assert!(!order.stock_reserved);
    assert_eq!(fetch_product(&h.db, product.id).await.stock, 10);
    h.tear_down().await;
}

#[tokio::test]
async fn declined_orders_holding_stock_are_closed_after_their_window() {
    let h = Harness::new().await;
    let product = h.product(10).await;
    let order = seed_order(&h.db, h.merchant.id, &[(&product, 4)], Kobo::from_naira(1_500), true).await;
    assert_eq!(fetch_product(&h.db, product.id).await.stock, 6);
    h.webhook("charge.failed", &order.payment_reference, order.total_amount).await.unwrap();
    let declined = h.db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!((declined.payment_status, declined.status), (PaymentStatus::Failed, FulfillmentStatus::Pending));
    assert!(declined.stock_reserved);

    // Still inside the payment window: the customer may try again
    let report = h.sweeps.expire_unpaid_orders(Utc::now()).await.unwrap();
    assert_eq!(report.candidates, 0);
    assert_eq!(h.sweeps.cleanup_reserved_stock(Utc::now()).await.unwrap().candidates, 0);

    let later = Utc::now() + Duration::days(3);
    let report = h.sweeps.expire_unpaid_orders(later).await.unwrap();
    assert_eq!((report.candidates, report.processed, report.failed), (1, 1, 0));
    let report = h.sweeps.cleanup_reserved_stock(later).await.unwrap();
    assert_eq!((report.candidates, report.processed, report.failed), (1, 1, 0));

    let closed = h.db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!((closed.payment_status, closed.status), (PaymentStatus::Failed, FulfillmentStatus::Cancelled));
    assert!(!closed.stock_reserved);
    assert_eq!(fetch_product(&h.db, product.id).await.stock, 10);
    h.tear_down().await;
}

#[tokio::test]
async fn cleanup_alone_returns_stock_of_declined_orders() {
    let h = Harness::new().await;
    let product = h.product(10).await;
    let order = seed_order(&h.db, h.merchant.id, &[(&product, 3)], Kobo::from_naira(1_500), true).await;
    h.webhook("charge.failed", &order.payment_reference, order.total_amount).await.unwrap();

    let report = h.sweeps.cleanup_reserved_stock(Utc::now() + Duration::days(3)).await.unwrap();
    assert_eq!((report.candidates, report.processed), (1, 1));
    let closed = h.db.fetch_order(order.id).await.unwrap().unwrap();
    assert_eq!(closed.status, FulfillmentStatus::Cancelled);
    assert!(!closed.stock_reserved);
    assert_eq!(fetch_product(&h.db, product.id).await.stock, 10);
    h.tear_down().await;
}

#[tokio::test]
async fn paid_reservations_are_kept() {
    let h = Harness::new().await;
    let product = h.product(10).await;
    let order = seed_order(&h.db, h.merchant.id, &[(&product, 3)], Kobo::from_naira(1_500), true).await;
    let confirmed = h.pay(&order).await;
    assert!(!confirmed.order.stock_reserved);
    assert_eq!(fetch_product(&h.db, product.id).await.stock, 7);

    let later = Utc::now() + Duration::hours(2);
    h.sweeps.expire_unpaid_orders(later).await.unwrap();
    h.sweeps.cleanup_reserved_stock(later).await.unwrap();
    assert_eq!(fetch_product(&h.db, product.id).await.stock, 7);
    h.tear_down().await;
}

#[tokio::test]
async fn stuck_deliveries_are_reassigned() {
    let h = Harness::new().await;
    let first = seed_rider(&h.db, "Tunde", "+2348050000001", RiderStatus::Available).await;
    let product = h.product(10).await;
    let order = h.order(&product, 1).await;
    let delivery = h.pay(&order).await.delivery.unwrap();
    assert_eq!(delivery.rider_id, Some(first.id));
    let second = seed_rider(&h.db, "Ify", "+2348050000002", RiderStatus::Available).await;

    let report = h.sweeps.reassign_stuck_deliveries(Utc::now()).await.unwrap();
    assert_eq!(report.candidates, 0);

    let report = h.sweeps.reassign_stuck_deliveries(Utc::now() + Duration::minutes(31)).await.unwrap();
    assert_eq!(report.processed, 1);
    let delivery = h.db.fetch_delivery(delivery.id).await.unwrap().unwrap();
    assert_eq!(delivery.status, DeliveryStatus::Assigned);
    assert_eq!(delivery.rider_id, Some(second.id));
    assert_eq!(h.db.fetch_rider(first.id).await.unwrap().unwrap().status, RiderStatus::Available);
    assert_eq!(h.db.fetch_rider(second.id).await.unwrap().unwrap().status, RiderStatus::Busy);
    assert!(h.notifier.received(&first.phone, "reassigned"));
    assert!(h.notifier.received(&second.phone, &delivery.delivery_number));
    let (_, events) = h.deliveries.delivery_details(delivery.id).await.unwrap();
    assert!(events.iter().any(|e| e.note.as_deref().is_some_and(|n| n.contains("rider not responding"))));
    h.tear_down().await;
}

#[tokio::test]
async fn stuck_delivery_stays_put_when_nobody_is_free() {
    let h = Harness::new().await;
    let rider = seed_rider(&h.db, "Tunde", "+2348050000001", RiderStatus::Available).await;
    let product = h.product(10).await;
    let order = h.order(&product, 1).await;
    let delivery = h.pay(&order).await.delivery.unwrap();

    let report = h.sweeps.reassign_stuck_deliveries(Utc::now() + Duration::minutes(31)).await.unwrap();
    assert_eq!((report.candidates, report.processed), (1, 0));
    let delivery = h.db.fetch_delivery(delivery.id).await.unwrap().unwrap();
    assert_eq!(delivery.rider_id, Some(rider.id));
    assert!(h.has_alert(order.id, "delivery", Severity::High).await);
    h.tear_down().await;
}

#[tokio::test]
async fn waiting_deliveries_get_a_rider_when_one_appears() {
    let h = Harness::new().await;
    let product = h.product(10).await;
    let first = h.order(&product, 1).await;
    let second = h.order(&product, 1).await;
    let d1 = h.pay(&first).await.delivery.unwrap();
    let d2 = h.pay(&second).await.delivery.unwrap();
    assert_eq!(d1.status, DeliveryStatus::Pending);
    assert_eq!(d2.status, DeliveryStatus::Pending);

    let rider = seed_rider(&h.db, "Tunde", "+2348050000001", RiderStatus::Available).await;
    let report = h.sweeps.reassign_stuck_deliveries(Utc::now()).await.unwrap();
    assert_eq!((report.candidates, report.processed), (2, 1));
    let d1 = h.db.fetch_delivery(d1.id).await.unwrap().unwrap();
    assert_eq!(d1.rider_id, Some(rider.id));
    let d2 = h.db.fetch_delivery(d2.id).await.unwrap().unwrap();
    assert_eq!(d2.status, DeliveryStatus::Pending);
    h.tear_down().await;
}

#[tokio::test]
async fn escrow_is_auto_released_after_the_deadline() {
    let h = Harness::new().await;
    let (order, delivery, rider) = h.delivered_order().await;

    let report = h.sweeps.auto_release_escrows(Utc::now()).await.unwrap();
    assert_eq!(report.candidates, 0);

    let report = h.sweeps.auto_release_escrows(Utc::now() + Duration::hours(49)).await.unwrap();
    assert_eq!((report.candidates, report.processed, report.failed), (1, 1, 0));
    let delivery = h.db.fetch_delivery(delivery.id).await.unwrap().unwrap();
    assert!(delivery.customer_confirmed);
    let escrow = h.db.fetch_escrow_for_order(order.id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Released);
    let payout = h.db.fetch_payout_for_order(order.id).await.unwrap().unwrap();
    assert_eq!(payout.amount, Kobo::from_naira(5_000));
    let wallet = h.db.fetch_wallet(dispatch_engine::db_types::WalletOwner::Rider(rider.id)).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Kobo::from_naira(1_200));

    // A late confirmation from the customer is harmless
    assert!(h.deliveries.confirm_delivery(delivery.id).await.unwrap().is_none());
    let report = h.sweeps.auto_release_escrows(Utc::now() + Duration::hours(50)).await.unwrap();
    assert_eq!(report.candidates, 0);
    h.tear_down().await;
}

#[tokio::test]
async fn one_failed_release_does_not_stop_the_sweep() {
    let h = Harness::new().await;
    let (stuck, _, _) = h.delivered_order().await;
    let rider = seed_rider(&h.db, "Ify", "+2348050000002", RiderStatus::Available).await;
    let product = h.product(10).await;
    let order = h.order(&product, 1).await;
    let delivery = h.pay(&order).await.delivery.unwrap();
    let _ = h.deliver(delivery.id, rider.id).await;

    let pool = h.db.pool();
    sqlx::query(&format!(
        "CREATE TRIGGER refuse_payout BEFORE INSERT ON payouts WHEN NEW.order_id = {} \
         BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
        stuck.id
    ))
    .execute(pool)
    .await
    .unwrap();

    let report = h.sweeps.auto_release_escrows(Utc::now() + Duration::hours(49)).await.unwrap();
    assert_eq!((report.candidates, report.processed, report.failed), (2, 1, 1));
    let escrow = h.db.fetch_escrow_for_order(stuck.id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Held);
    assert!(h.has_alert(stuck.id, "settlement", Severity::High).await);
    let escrow = h.db.fetch_escrow_for_order(order.id).await.unwrap().unwrap();
    assert_eq!(escrow.status, EscrowStatus::Released);

    sqlx::query("DROP TRIGGER refuse_payout").execute(pool).await.unwrap();
    let report = h.sweeps.auto_release_escrows(Utc::now() + Duration::hours(49)).await.unwrap();
    assert_eq!((report.candidates, report.processed, report.failed), (1, 1, 0));
    h.tear_down().await;
}

#[tokio::test]
async fn sweeps_skip_while_another_instance_holds_the_lease() {
    let h = Harness::new().await;
    let ttl = Duration::minutes(5);
    assert!(h.db.try_acquire_lease(Sweep::PaymentTimeout.name(), "instance-b", ttl).await.unwrap());

    let report = h.sweeps.run(Sweep::PaymentTimeout, "instance-a").await.unwrap();
    assert!(report.is_none());
    // Other sweeps have their own leases
    assert!(h.sweeps.run(Sweep::AutoRelease, "instance-a").await.unwrap().is_some());

    h.db.release_lease(Sweep::PaymentTimeout.name(), "instance-b").await.unwrap();
    let report = h.sweeps.run(Sweep::PaymentTimeout, "instance-a").await.unwrap();
    assert!(report.is_some());
    // The lease is released after the run
    assert!(h.db.try_acquire_lease(Sweep::PaymentTimeout.name(), "instance-b", ttl).await.unwrap());
    h.tear_down().await;
}

#[tokio::test]
async fn expired_leases_can_be_taken_over() {
    let h = Harness::new().await;
    assert!(h.db.try_acquire_lease("stock_cleanup", "instance-b", Duration::seconds(-1)).await.unwrap());
    assert!(h.db.try_acquire_lease("stock_cleanup", "instance-a", Duration::minutes(5)).await.unwrap());
    assert!(!h.db.try_acquire_lease("stock_cleanup", "instance-b", Duration::minutes(5)).await.unwrap());
    h.tear_down().await;
}
