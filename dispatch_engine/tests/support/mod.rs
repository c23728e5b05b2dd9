#![allow(dead_code)]
use dispatch_common::{Kobo, Secret};
use dispatch_engine::{
    api::webhook_objects::{ConfirmedOrder, WebhookOutcome},
    db_types::{ActivityEntry, Delivery, DeliveryStatus, Merchant, Order, Product, Rider, RiderStatus, Severity},
    events::EventProducers,
    test_utils::{
        fakes::{FakeGateway, FakeInvoices, FakeNotifier},
        prepare_env::{prepare_test_env, random_db_path, tear_down},
        seed::{charge_event, ikeja_pickup, seed_merchant, seed_order, seed_product, seed_rider, sign, WEBHOOK_SECRET},
    },
    ActivityManagement,
    CheckoutApi,
    DeliveryApi,
    EngineConfig,
    PaymentFlowApi,
    PaymentFlowError,
    ReconciliationApi,
    SqliteDatabase,
    SqliteIdempotencyCache,
    WithdrawalApi,
};

pub type Payments = PaymentFlowApi<SqliteDatabase, SqliteIdempotencyCache, FakeGateway, FakeNotifier, FakeInvoices>;

/// A fresh database with one merchant (with a pickup location) and every engine API wired to recording fakes.
pub struct Harness {
    pub db: SqliteDatabase,
    pub gateway: FakeGateway,
    pub notifier: FakeNotifier,
    pub invoices: FakeInvoices,
    pub config: EngineConfig,
    pub merchant: Merchant,
    pub payments: Payments,
    pub deliveries: DeliveryApi<SqliteDatabase, FakeGateway, FakeNotifier>,
    pub sweeps: ReconciliationApi<SqliteDatabase, FakeGateway, FakeNotifier>,
    pub checkout: CheckoutApi<SqliteDatabase, FakeGateway>,
    pub withdrawals: WithdrawalApi<SqliteDatabase, FakeGateway>,
}

impl Harness {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let gateway = FakeGateway::new();
        let notifier = FakeNotifier::new();
        let invoices = FakeInvoices::new();
        let config = EngineConfig::for_tests();
        let producers = EventProducers::default();
        let cache = SqliteIdempotencyCache::new(db.clone());
        let payments = PaymentFlowApi::new(
            db.clone(),
            cache,
            gateway.clone(),
            notifier.clone(),
            invoices.clone(),
            producers.clone(),
            config.clone(),
            Secret::new(WEBHOOK_SECRET.to_string()),
        );
        let deliveries =
            DeliveryApi::new(db.clone(), gateway.clone(), notifier.clone(), producers.clone(), config.clone());
        let sweeps =
            ReconciliationApi::new(db.clone(), gateway.clone(), notifier.clone(), producers.clone(), config.clone());
        let checkout = CheckoutApi::new(db.clone(), gateway.clone(), config.clone());
        let withdrawals = WithdrawalApi::new(db.clone(), gateway.clone(), producers);
        let merchant = seed_merchant(&db, "Mama Nkechi Provisions", Some(ikeja_pickup())).await;
        Self {
            db,
            gateway,
            notifier,
            invoices,
            config,
            merchant,
            payments,
            deliveries,
            sweeps,
            checkout,
            withdrawals,
        }
    }

    /// A product priced at ₦3,000 retail and ₦2,500 wholesale.
    pub async fn product(&self, stock: i64) -> Product {
        seed_product(&self.db, self.merchant.id, "Peak Milk Tin (Carton)", 3_000, 2_500, stock).await
    }

    /// An unpaid order for `qty` units of `product`, with a ₦1,500 delivery fee.
    pub async fn order(&self, product: &Product, qty: i64) -> Order {
        seed_order(&self.db, self.merchant.id, &[(product, qty)], Kobo::from_naira(1_500), false).await
    }

    pub async fn webhook(&self, event: &str, reference: &str, amount: Kobo) -> Result<WebhookOutcome, PaymentFlowError> {
        let body = charge_event(event, reference, amount);
        let signature = sign(&body);
        self.payments.handle_webhook(&body, Some(&signature)).await
    }

    /// Pays for the order in full and returns the confirmation.
    pub async fn pay(&self, order: &Order) -> ConfirmedOrder {
        match self.webhook("charge.success", &order.payment_reference, order.total_amount).await {
            Ok(WebhookOutcome::Confirmed(confirmed)) => *confirmed,
            other => panic!("Expected the payment to be confirmed, got {other:?}"),
        }
    }

    /// The assigned rider takes the delivery all the way to `DELIVERED`.
    pub async fn deliver(&self, delivery_id: i64, rider_id: i64) -> Delivery {
        let mut delivery = None;
        for status in [DeliveryStatus::PickedUp, DeliveryStatus::InTransit, DeliveryStatus::Delivered] {
            let transition = self
                .deliveries
                .update_delivery_status(delivery_id, rider_id, status, None)
                .await
                .unwrap_or_else(|e| panic!("Could not move delivery {delivery_id} to {status}. {e}"));
            delivery = Some(transition.delivery);
        }
        delivery.expect("at least one transition")
    }

    /// A rider, and a paid order for two units that the rider has delivered but the customer has not yet confirmed.
    pub async fn delivered_order(&self) -> (Order, Delivery, Rider) {
        let rider = seed_rider(&self.db, "Tunde", "+2348050000001", RiderStatus::Available).await;
        let product = self.product(10).await;
        let order = self.order(&product, 2).await;
        let confirmed = self.pay(&order).await;
        let delivery = confirmed.delivery.expect("a delivery should have been created");
        let delivery = self.deliver(delivery.id, rider.id).await;
        (confirmed.order, delivery, rider)
    }

    pub async fn activity_for(&self, order_id: i64) -> Vec<ActivityEntry> {
        self.db.fetch_activity_for_order(order_id).await.expect("Error fetching activity")
    }

    pub async fn has_alert(&self, order_id: i64, category: &str, severity: Severity) -> bool {
        self.activity_for(order_id).await.iter().any(|a| a.category == category && a.severity == severity)
    }

    pub async fn tear_down(self) {
        tear_down(self.db).await;
    }
}
