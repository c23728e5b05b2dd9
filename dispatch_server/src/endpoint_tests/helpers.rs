use std::{future::poll_fn, net::IpAddr, pin::Pin, time::Duration};

use actix_web::{
    body::{BoxBody, MessageBody},
    http::StatusCode,
    test,
    test::TestRequest,
    web,
    web::{Bytes, ServiceConfig},
    App,
    HttpResponse,
};
use dispatch_common::{Kobo, Secret};
use dispatch_engine::{
    db_types::{Delivery, Merchant, Order, Product, Rider, RiderStatus},
    events::EventHandlers,
    test_utils::{
        fakes::{FakeGateway, FakeInvoices, FakeNotifier},
        prepare_env::{prepare_test_env, random_db_path, tear_down},
        seed::{charge_event, ikeja_pickup, seed_merchant, seed_order, seed_product, seed_rider, sign, WEBHOOK_SECRET},
    },
    ActivityApi,
    DeliveryApi,
    EngineConfig,
    PaymentFlowApi,
    SqliteDatabase,
    SqliteIdempotencyCache,
};
use log::debug;

use crate::{
    alerts::create_event_hooks,
    connections::ConnectionRegistry,
    routes::SIGNATURE_HEADER,
    server::{admin_scope, api_scope, webhook_scope},
};

pub const ADMIN_KEY: &str = "test-admin-key-do-not-use";

pub type Payments = PaymentFlowApi<SqliteDatabase, SqliteIdempotencyCache, FakeGateway, FakeNotifier, FakeInvoices>;
pub type Deliveries = DeliveryApi<SqliteDatabase, FakeGateway, FakeNotifier>;

/// A fresh database, the engine APIs wired to recording fakes, and the live feeds wired to the event hooks.
pub struct TestServer {
    pub db: SqliteDatabase,
    pub notifier: FakeNotifier,
    pub merchant: Merchant,
    pub payments: Payments,
    pub deliveries: Deliveries,
    pub activity: ActivityApi<SqliteDatabase>,
    pub registry: ConnectionRegistry,
}

impl TestServer {
    pub async fn new() -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let gateway = FakeGateway::new();
        let notifier = FakeNotifier::new();
        let config = EngineConfig::for_tests();
        let registry = ConnectionRegistry::new();
        let handlers = EventHandlers::new(16, create_event_hooks(registry.clone(), None));
        let producers = handlers.producers();
        handlers.start_handlers().await;
        let payments = PaymentFlowApi::new(
            db.clone(),
            SqliteIdempotencyCache::new(db.clone()),
            gateway,
            notifier.clone(),
            FakeInvoices::new(),
            producers.clone(),
            config,
            Secret::new(WEBHOOK_SECRET.to_string()),
        );
        let deliveries = payments.deliveries().clone();
        let activity = ActivityApi::new(db.clone(), producers);
        let merchant = seed_merchant(&db, "Iya Basira Foodstuff", Some(ikeja_pickup())).await;
        Self { db, notifier, merchant, payments, deliveries, activity, registry }
    }

    /// Registers every route, with the same scopes the server uses, and no webhook whitelist.
    pub fn configure(&self) -> impl FnOnce(&mut ServiceConfig) {
        self.configure_with_whitelist(None)
    }

    pub fn configure_with_whitelist(&self, whitelist: Option<Vec<IpAddr>>) -> impl FnOnce(&mut ServiceConfig) {
        let payments = self.payments.clone();
        let deliveries = self.deliveries.clone();
        let activity = self.activity.clone();
        let registry = self.registry.clone();
        move |cfg: &mut ServiceConfig| {
            let webhooks =
                webhook_scope::<SqliteDatabase, SqliteIdempotencyCache, FakeGateway, FakeNotifier, FakeInvoices>(
                    whitelist, false, false,
                );
            cfg.app_data(web::Data::new(payments))
                .app_data(web::Data::new(deliveries))
                .app_data(web::Data::new(activity))
                .app_data(web::Data::new(registry))
                .service(webhooks)
                .service(admin_scope::<SqliteDatabase, FakeGateway, FakeNotifier>(Secret::new(ADMIN_KEY.to_string())))
                .service(api_scope::<SqliteDatabase, FakeGateway, FakeNotifier>());
        }
    }

    pub async fn product(&self, stock: i64) -> Product {
        seed_product(&self.db, self.merchant.id, "Ofada Rice (5kg)", 9_000, 7_500, stock).await
    }

    pub async fn rider(&self, name: &str, phone: &str) -> Rider {
        seed_rider(&self.db, name, phone, RiderStatus::Available).await
    }

    /// An unpaid order for two units, with a ₦1,000 delivery fee.
    pub async fn order(&self) -> Order {
        let product = self.product(20).await;
        seed_order(&self.db, self.merchant.id, &[(&product, 2)], Kobo::from_naira(1_000), false).await
    }

    /// A paid order whose delivery has been assigned to a freshly seeded rider.
    pub async fn assigned_delivery(&self) -> (Order, Delivery, Rider) {
        let rider = self.rider("Chinedu", "+2348050000011").await;
        let order = self.order().await;
        let body = charge_event("charge.success", &order.payment_reference, order.total_amount);
        self.payments.handle_webhook(&body, Some(&sign(&body))).await.expect("Payment should be accepted");
        let (delivery, _) = self.delivery_for(order.id).await;
        assert_eq!(delivery.rider_id, Some(rider.id), "the only rider should have been assigned");
        (order, delivery, rider)
    }

    /// Like [`Self::assigned_delivery`], with the rider having reported the delivery as `DELIVERED`.
    pub async fn delivered(&self) -> (Order, Delivery, Rider) {
        let (order, delivery, rider) = self.assigned_delivery().await;
        for status in ["PICKED_UP", "IN_TRANSIT", "DELIVERED"] {
            let payload = format!(r#"{{"rider_id": {}, "status": "{status}"}}"#, rider.id);
            let req = json_post(&format!("/api/deliveries/{}/status", delivery.id), &payload);
            let (code, body) = send(req, self.configure()).await;
            assert_eq!(code, StatusCode::OK, "{status}: {body}");
        }
        let (delivery, _) = self.delivery_for(order.id).await;
        (order, delivery, rider)
    }

    pub async fn delivery_for(&self, order_id: i64) -> (Delivery, Order) {
        let summary = self.deliveries.order_summary(order_id).await.expect("Error fetching order summary");
        (summary.delivery.expect("The order has no delivery"), summary.order)
    }

    pub async fn tear_down(self) {
        tear_down(self.db).await;
    }
}

pub fn json_post(path: &str, body: &str) -> TestRequest {
    TestRequest::post().uri(path).insert_header(("Content-Type", "application/json")).set_payload(body.to_string())
}

pub fn admin(req: TestRequest) -> TestRequest {
    req.insert_header(("X-Admin-Key", ADMIN_KEY))
}

/// A signed webhook call, as the payment gateway would make it.
pub fn webhook_request(body: Vec<u8>) -> TestRequest {
    let signature = sign(&body);
    TestRequest::post()
        .uri("/webhook/paystack")
        .insert_header(("Content-Type", "application/json"))
        .insert_header((SIGNATURE_HEADER, signature))
        .set_payload(body)
}

/// Sends the request and returns the status and body. Errors raised by middleware are rendered the way the server
/// would render them.
pub async fn send<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let res = call(req, configure).await;
    let status = res.status();
    let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
    debug!("Response: {status} {body}");
    (status, body)
}

pub async fn call<F>(req: TestRequest, configure: F) -> HttpResponse<BoxBody>
where F: FnOnce(&mut ServiceConfig) {
    let service = test::init_service(App::new().configure(configure)).await;
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => res.into_parts().1.map_into_boxed_body(),
        Err(e) => e.error_response(),
    }
}

/// Reads the next chunk of a streaming body, waiting at most a second for it.
pub async fn next_chunk(body: &mut BoxBody) -> Option<Bytes> {
    let chunk = poll_fn(|cx| Pin::new(&mut *body).poll_next(cx));
    tokio::time::timeout(Duration::from_secs(1), chunk).await.ok().flatten().and_then(Result::ok)
}

pub fn json(body: &str) -> serde_json::Value {
    serde_json::from_str(body).unwrap_or_else(|e| panic!("Response is not JSON: {e}. {body}"))
}
