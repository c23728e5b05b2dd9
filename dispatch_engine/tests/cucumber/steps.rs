use chrono::{Duration, Utc};
use cucumber::{then, when};
use dispatch_common::Kobo;
use dispatch_engine::{
    api::webhook_objects::WebhookOutcome,
    db_types::{DeliveryStatus, EscrowStatus, FulfillmentStatus, PaymentStatus, PayoutStatus, RiderStatus, Severity, WalletOwner},
    test_utils::seed::{charge_event, fetch_product, seed_order, sign},
    ActivityManagement,
    DeliveryManagement,
    OrderManagement,
    SettlementManagement,
};

use crate::cucumber::DispatchWorld;

#[when(expr = "the customer orders {int} of {string} with a ₦{int} delivery fee")]
async fn place_order(world: &mut DispatchWorld, quantity: i64, product: String, fee: i64) {
    let system = world.system_mut();
    let product = system.product(&product).clone();
    let merchant_id = system.merchant().id;
    let order = seed_order(&system.db, merchant_id, &[(&product, quantity)], Kobo::from_naira(fee), false).await;
    system.order = Some(order);
}

async fn send_webhook(world: &mut DispatchWorld, amount: Kobo) {
    let system = world.system_mut();
    let body = charge_event("charge.success", &system.order().payment_reference, amount);
    let signature = sign(&body);
    let outcome = system.payments.handle_webhook(&body, Some(&signature)).await.expect("Error handling webhook");
    if let WebhookOutcome::Confirmed(confirmed) = &outcome {
        system.delivery = confirmed.delivery.clone();
    }
    system.last_outcome = Some(outcome);
}

#[when(expr = "the payment webhook reports ₦{int} paid")]
async fn webhook_paid(world: &mut DispatchWorld, amount: i64) {
    send_webhook(world, Kobo::from_naira(amount)).await;
}

#[when("the same payment webhook arrives again")]
async fn webhook_again(world: &mut DispatchWorld) {
    let amount = world.system().order().total_amount;
    send_webhook(world, amount).await;
}

#[when(expr = "{word} delivers the order")]
async fn deliver(world: &mut DispatchWorld, rider: String) {
    let system = world.system_mut();
    let rider_id = system.rider(&rider).id;
    let delivery_id = system.delivery().id;
    for status in [DeliveryStatus::PickedUp, DeliveryStatus::InTransit, DeliveryStatus::Delivered] {
        let transition = system
            .deliveries
            .update_delivery_status(delivery_id, rider_id, status, None)
            .await
            .expect("Error updating the delivery");
        system.delivery = Some(transition.delivery);
    }
}

#[when(expr = "the auto-release sweep runs {int} hours later")]
async fn auto_release(world: &mut DispatchWorld, hours: i64) {
    let system = world.system();
    let now = Utc::now() + Duration::hours(hours);
    system.sweeps.auto_release_escrows(now).await.expect("Error running the auto-release sweep");
}

#[when(expr = "the stuck-delivery sweep runs {int} minutes later")]
async fn stuck_deliveries(world: &mut DispatchWorld, minutes: i64) {
    let system = world.system();
    let now = Utc::now() + Duration::minutes(minutes);
    system.sweeps.reassign_stuck_deliveries(now).await.expect("Error running the stuck-delivery sweep");
}

#[then(expr = "the order total is ₦{int}")]
async fn order_total(world: &mut DispatchWorld, total: i64) {
    assert_eq!(world.system().order().total_amount, Kobo::from_naira(total));
}

#[then(expr = "the order is {word} and {word}")]
async fn order_status(world: &mut DispatchWorld, payment: String, fulfilment: String) {
    let system = world.system();
    let order = system.db.fetch_order(system.order().id).await.expect("Error fetching order").expect("Order is gone");
    assert_eq!(order.payment_status, payment.parse::<PaymentStatus>().expect("Not a payment status"));
    assert_eq!(order.status, fulfilment.parse::<FulfillmentStatus>().expect("Not a fulfilment status"));
}

#[then(expr = "one escrow of ₦{int} is {word}")]
async fn escrow_held(world: &mut DispatchWorld, amount: i64, status: String) {
    let system = world.system();
    let escrow = system
        .db
        .fetch_escrow_for_order(system.order().id)
        .await
        .expect("Error fetching escrow")
        .expect("No escrow for the order");
    assert_eq!(escrow.amount, Kobo::from_naira(amount));
    assert_eq!(escrow.status, status.parse::<EscrowStatus>().expect("Not an escrow status"));
}

#[then("no escrow exists for the order")]
async fn no_escrow(world: &mut DispatchWorld) {
    let system = world.system();
    let escrow = system.db.fetch_escrow_for_order(system.order().id).await.expect("Error fetching escrow");
    assert!(escrow.is_none(), "Expected no escrow, found {escrow:?}");
}

#[then(expr = "the delivery is {word}")]
async fn delivery_status(world: &mut DispatchWorld, status: String) {
    let system = world.system();
    let delivery =
        system.db.fetch_delivery(system.delivery().id).await.expect("Error fetching delivery").expect("Delivery is gone");
    assert_eq!(delivery.status, status.parse::<DeliveryStatus>().expect("Not a delivery status"));
}

#[then(expr = "the delivery is assigned to {word}")]
async fn delivery_rider(world: &mut DispatchWorld, rider: String) {
    let system = world.system();
    let delivery =
        system.db.fetch_delivery(system.delivery().id).await.expect("Error fetching delivery").expect("Delivery is gone");
    assert_eq!(delivery.status, DeliveryStatus::Assigned);
    assert_eq!(delivery.rider_id, Some(system.rider(&rider).id));
}

#[then("the customer has confirmed the delivery")]
async fn delivery_confirmed(world: &mut DispatchWorld) {
    let system = world.system();
    let delivery =
        system.db.fetch_delivery(system.delivery().id).await.expect("Error fetching delivery").expect("Delivery is gone");
    assert!(delivery.customer_confirmed);
}

#[then(expr = "rider {word} is {word}")]
async fn rider_status(world: &mut DispatchWorld, rider: String, status: String) {
    let system = world.system();
    let rider = system.db.fetch_rider(system.rider(&rider).id).await.expect("Error fetching rider").expect("Rider is gone");
    assert_eq!(rider.status, status.parse::<RiderStatus>().expect("Not a rider status"));
}

#[then("a payment anomaly is logged for the order")]
async fn anomaly_logged(world: &mut DispatchWorld) {
    let system = world.system();
    let entries = system.db.fetch_activity_for_order(system.order().id).await.expect("Error fetching activity");
    assert!(
        entries.iter().any(|e| e.category == "payment" && e.severity == Severity::High),
        "No payment anomaly in {entries:?}"
    );
}

#[then("the webhook is ignored as a duplicate")]
async fn duplicate(world: &mut DispatchWorld) {
    let outcome = world.system().last_outcome.as_ref().expect("No webhook has been sent");
    assert!(matches!(outcome, WebhookOutcome::Duplicate), "Expected a duplicate, got {outcome:?}");
}

#[then("the payment is refunded")]
async fn refunded(world: &mut DispatchWorld) {
    let system = world.system();
    let reference = &system.order().payment_reference;
    assert!(system.gateway.refunds().iter().any(|(r, _)| r == reference), "No refund for {reference}");
}

#[then(expr = "{string} has {int} in stock")]
async fn stock_level(world: &mut DispatchWorld, product: String, stock: i64) {
    let system = world.system();
    let product = fetch_product(&system.db, system.product(&product).id).await;
    assert_eq!(product.stock, stock);
}

#[then(expr = "the merchant has a pending payout of ₦{int}")]
async fn merchant_payout(world: &mut DispatchWorld, amount: i64) {
    let system = world.system();
    let payout = system
        .db
        .fetch_payout_for_order(system.order().id)
        .await
        .expect("Error fetching payout")
        .expect("No payout for the order");
    assert_eq!(payout.merchant_id, system.merchant().id);
    assert_eq!(payout.status, PayoutStatus::Pending);
    assert_eq!(payout.amount, Kobo::from_naira(amount));
}

#[then(expr = "the wallet of {word} holds ₦{int}")]
async fn rider_wallet(world: &mut DispatchWorld, rider: String, amount: i64) {
    let system = world.system();
    let owner = WalletOwner::Rider(system.rider(&rider).id);
    let wallet = system.db.fetch_wallet(owner).await.expect("Error fetching wallet").expect("Rider has no wallet");
    assert_eq!(wallet.balance, Kobo::from_naira(amount));
}

#[then(expr = "the platform wallet holds ₦{int}")]
async fn platform_wallet(world: &mut DispatchWorld, amount: i64) {
    let system = world.system();
    let wallet =
        system.db.fetch_wallet(WalletOwner::Platform).await.expect("Error fetching wallet").expect("No platform wallet");
    assert_eq!(wallet.balance, Kobo::from_naira(amount));
}

#[then(expr = "the customer was told {string}")]
async fn customer_told(world: &mut DispatchWorld, fragment: String) {
    let system = world.system();
    let customer = &system.order().customer_id;
    assert!(system.notifier.received(customer, &fragment), "The customer never received \"{fragment}\"");
}
