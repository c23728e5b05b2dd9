use std::collections::HashMap;

use cucumber::World;
use dispatch_common::Secret;
use dispatch_engine::{
    api::webhook_objects::WebhookOutcome,
    db_types::{Delivery, Merchant, Order, Product, Rider},
    events::EventProducers,
    test_utils::{
        fakes::{FakeGateway, FakeInvoices, FakeNotifier},
        prepare_env::{prepare_test_env, random_db_path},
        seed::WEBHOOK_SECRET,
    },
    DeliveryApi,
    EngineConfig,
    PaymentFlowApi,
    ReconciliationApi,
    SqliteDatabase,
    SqliteIdempotencyCache,
};
use log::*;

#[derive(Default, Debug, World)]
pub struct DispatchWorld {
    pub system: Option<DispatchSystem>,
}

impl DispatchWorld {
    pub fn system(&self) -> &DispatchSystem {
        self.system.as_ref().expect("System not initialised. Start the scenario with 'Given a fresh install'")
    }

    pub fn system_mut(&mut self) -> &mut DispatchSystem {
        self.system.as_mut().expect("System not initialised. Start the scenario with 'Given a fresh install'")
    }
}

/// Everything a scenario touches: the store, the engine APIs wired to recording fakes, and the named things the
/// steps have created so far.
pub struct DispatchSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub gateway: FakeGateway,
    pub notifier: FakeNotifier,
    pub payments: PaymentFlowApi<SqliteDatabase, SqliteIdempotencyCache, FakeGateway, FakeNotifier, FakeInvoices>,
    pub deliveries: DeliveryApi<SqliteDatabase, FakeGateway, FakeNotifier>,
    pub sweeps: ReconciliationApi<SqliteDatabase, FakeGateway, FakeNotifier>,
    pub merchant: Option<Merchant>,
    pub products: HashMap<String, Product>,
    pub riders: HashMap<String, Rider>,
    pub order: Option<Order>,
    pub delivery: Option<Delivery>,
    pub last_outcome: Option<WebhookOutcome>,
}

impl std::fmt::Debug for DispatchSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DispatchSystem({})", self.db_path)
    }
}

impl DispatchSystem {
    pub async fn new() -> Self {
        let db_path = random_db_path();
        prepare_test_env(&db_path).await;
        let db = SqliteDatabase::new_with_url(&db_path, 1).await.expect("Error creating connection to database");
        debug!("🚀️ Created database: {db_path}");
        let gateway = FakeGateway::new();
        let notifier = FakeNotifier::new();
        let config = EngineConfig::for_tests();
        let producers = EventProducers::default();
        let payments = PaymentFlowApi::new(
            db.clone(),
            SqliteIdempotencyCache::new(db.clone()),
            gateway.clone(),
            notifier.clone(),
            FakeInvoices::new(),
            producers.clone(),
            config.clone(),
            Secret::new(WEBHOOK_SECRET.to_string()),
        );
        let deliveries =
            DeliveryApi::new(db.clone(), gateway.clone(), notifier.clone(), producers.clone(), config.clone());
        let sweeps = ReconciliationApi::new(db.clone(), gateway.clone(), notifier.clone(), producers, config);
        Self {
            db_path,
            db,
            gateway,
            notifier,
            payments,
            deliveries,
            sweeps,
            merchant: None,
            products: HashMap::new(),
            riders: HashMap::new(),
            order: None,
            delivery: None,
            last_outcome: None,
        }
    }

    pub fn merchant(&self) -> &Merchant {
        self.merchant.as_ref().expect("No merchant has been set up")
    }

    pub fn product(&self, name: &str) -> &Product {
        self.products.get(name).unwrap_or_else(|| panic!("No product called {name}"))
    }

    pub fn rider(&self, name: &str) -> &Rider {
        self.riders.get(name).unwrap_or_else(|| panic!("No rider called {name}"))
    }

    pub fn order(&self) -> &Order {
        self.order.as_ref().expect("No order has been placed")
    }

    pub fn delivery(&self) -> &Delivery {
        self.delivery.as_ref().expect("No delivery has been created")
    }
}
