use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use dispatch_common::{Kobo, Secret};
use dispatch_engine::{
    db_types::PaymentStatus,
    events::EventProducers,
    test_utils::{
        fakes::{FakeGateway, FakeInvoices, FakeNotifier},
        seed::{charge_event, CUSTOMER, WEBHOOK_SECRET},
    },
    EngineConfig,
    LedgerError,
    PaymentFlowApi,
    SqliteDatabase,
};

use super::{
    helpers::{json, send, webhook_request, TestServer},
    mocks::MockCache,
};
use crate::{routes::SIGNATURE_HEADER, server::webhook_scope};

#[actix_web::test]
async fn confirmed_payment() {
    let server = TestServer::new().await;
    let order = server.order().await;
    let body = charge_event("charge.success", &order.payment_reference, order.total_amount);
    let (status, body) = send(webhook_request(body), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let response = json(&body);
    assert_eq!(response["success"], true);
    assert_eq!(response["message"], format!("order {} confirmed", order.order_number));
    let summary = server.deliveries.order_summary(order.id).await.unwrap();
    assert_eq!(summary.order.payment_status, PaymentStatus::Paid);
    assert!(summary.escrow.is_some());
    assert!(server.notifier.received(CUSTOMER, &order.order_number));
    server.tear_down().await;
}

#[actix_web::test]
async fn replayed_event_is_acknowledged_once() {
    let server = TestServer::new().await;
    let order = server.order().await;
    let body = charge_event("charge.success", &order.payment_reference, order.total_amount);
    let (status, _) = send(webhook_request(body.clone()), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(webhook_request(body), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["message"], "duplicate event");
    server.tear_down().await;
}

#[actix_web::test]
async fn unknown_reference_is_acknowledged() {
    let server = TestServer::new().await;
    let body = charge_event("charge.success", "DSP-20240101000000-NOSUCHREF0", Kobo::from_naira(5_000));
    let (status, body) = send(webhook_request(body), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["message"], "unknown reference");
    server.tear_down().await;
}

#[actix_web::test]
async fn bad_signature() {
    let server = TestServer::new().await;
    let order = server.order().await;
    let body = charge_event("charge.success", &order.payment_reference, order.total_amount);
    let req = TestRequest::post()
        .uri("/webhook/paystack")
        .insert_header((SIGNATURE_HEADER, "0".repeat(128)))
        .set_payload(body.clone());
    let (status, response) = send(req, server.configure()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json(&response)["error"], "Could not read request body: The webhook signature is invalid");

    let req = TestRequest::post().uri("/webhook/paystack").set_payload(body);
    let (status, _) = send(req, server.configure()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let summary = server.deliveries.order_summary(order.id).await.unwrap();
    assert_eq!(summary.order.payment_status, PaymentStatus::Pending);
    server.tear_down().await;
}

#[actix_web::test]
async fn malformed_payload() {
    let server = TestServer::new().await;
    let (status, _) = send(webhook_request(b"{\"event\": ".to_vec()), server.configure()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    server.tear_down().await;
}

#[actix_web::test]
async fn whitelist() {
    let server = TestServer::new().await;
    let whitelist = Some(vec!["52.31.139.75".parse().unwrap()]);
    let body = charge_event("transfer.success", "TRF_1ptvuv321ahaa7q", Kobo::from_naira(100));

    let req = webhook_request(body.clone()).peer_addr("10.1.1.1:5000".parse().unwrap());
    let (status, _) = send(req, server.configure_with_whitelist(whitelist.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let req = webhook_request(body).peer_addr("52.31.139.75:443".parse().unwrap());
    let (status, body) = send(req, server.configure_with_whitelist(whitelist)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["message"], "ignored");
    server.tear_down().await;
}

#[actix_web::test]
async fn idempotency_store_failure_asks_for_a_retry() {
    let server = TestServer::new().await;
    let mut cache = MockCache::new();
    cache
        .expect_set_if_absent()
        .times(1)
        .returning(|_, _| Err(LedgerError::DatabaseError("database is locked".into())));
    cache.expect_release().never();
    let order = server.order().await;
    let body = charge_event("charge.success", &order.payment_reference, order.total_amount);
    let (status, _) = send(webhook_request(body), configure_with_cache(server.db.clone(), cache)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let summary = server.deliveries.order_summary(order.id).await.unwrap();
    assert_eq!(summary.order.payment_status, PaymentStatus::Pending);
    server.tear_down().await;
}

#[actix_web::test]
async fn claimed_key_is_a_duplicate() {
    let server = TestServer::new().await;
    let mut cache = MockCache::new();
    cache.expect_set_if_absent().times(1).returning(|_, _| Ok(false));
    let order = server.order().await;
    let body = charge_event("charge.success", &order.payment_reference, order.total_amount);
    let (status, body) = send(webhook_request(body), configure_with_cache(server.db.clone(), cache)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["message"], "duplicate event");
    let summary = server.deliveries.order_summary(order.id).await.unwrap();
    assert_eq!(summary.order.payment_status, PaymentStatus::Pending);
    server.tear_down().await;
}

fn configure_with_cache(db: SqliteDatabase, cache: MockCache) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg: &mut ServiceConfig| {
        let api = PaymentFlowApi::new(
            db,
            cache,
            FakeGateway::new(),
            FakeNotifier::new(),
            FakeInvoices::new(),
            EventProducers::default(),
            EngineConfig::for_tests(),
            Secret::new(WEBHOOK_SECRET.to_string()),
        );
        cfg.app_data(web::Data::new(api)).service(webhook_scope::<
            SqliteDatabase,
            MockCache,
            FakeGateway,
            FakeNotifier,
            FakeInvoices,
        >(None, false, false));
    }
}
