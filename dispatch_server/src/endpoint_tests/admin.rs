use actix_web::{http::StatusCode, test::TestRequest};
use dispatch_engine::db_types::{DeliveryStatus, FulfillmentStatus, NewActivity, RiderStatus, Severity};

use super::helpers::{admin, call, json, json_post, next_chunk, send, TestServer};

#[actix_web::test]
async fn admin_routes_require_the_key() {
    let server = TestServer::new().await;
    let (status, body) = send(TestRequest::get().uri("/api/admin/activity"), server.configure()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json(&body)["error"], "The request could not be authenticated. The X-Admin-Key header is required.");

    let req = TestRequest::get().uri("/api/admin/activity").insert_header(("X-Admin-Key", "let-me-in"));
    let (status, _) = send(req, server.configure()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(admin(TestRequest::get().uri("/api/admin/activity")), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json(&body).as_array().is_some());
    server.tear_down().await;
}

#[actix_web::test]
async fn recent_activity_is_newest_first() {
    let server = TestServer::new().await;
    for i in 1..=3 {
        let entry = NewActivity::new("payout", Severity::Medium, format!("Payout {i} is slow"));
        server.activity.record(entry).await.unwrap();
    }
    let req = admin(TestRequest::get().uri("/api/admin/activity?limit=2"));
    let (status, body) = send(req, server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let entries = json(&body);
    let entries = entries.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["message"], "Payout 3 is slow");
    assert_eq!(entries[1]["message"], "Payout 2 is slow");
    server.tear_down().await;
}

#[actix_web::test]
async fn order_report() {
    let server = TestServer::new().await;
    let (order, delivery, _) = server.delivered().await;
    let req = admin(TestRequest::get().uri(&format!("/api/admin/orders/{}", order.id)));
    let (status, body) = send(req, server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let report = json(&body);
    assert_eq!(report["order"]["order_number"], order.order_number.as_str());
    assert_eq!(report["order"]["status"], "DELIVERED");
    assert_eq!(report["items"].as_array().unwrap().len(), 1);
    assert_eq!(report["escrow"]["status"], "HELD");
    assert_eq!(report["delivery"]["id"], delivery.id);
    assert_eq!(report["delivery_events"].as_array().unwrap().len(), 4);
    assert!(report["payout"].is_null());
    assert!(report["activity"].as_array().is_some());

    let (status, _) = send(admin(TestRequest::get().uri("/api/admin/orders/9999")), server.configure()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    server.tear_down().await;
}

#[actix_web::test]
async fn manual_escrow_release() {
    let server = TestServer::new().await;
    let (order, _, _) = server.delivered().await;
    let path = format!("/api/admin/orders/{}/release", order.id);
    let (status, body) = send(admin(json_post(&path, "")), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let settlement = json(&body);
    assert_eq!(settlement["escrow"]["status"], "RELEASED");
    assert_eq!(settlement["payout"]["status"], "PENDING");

    let (status, _) = send(admin(json_post(&path, "")), server.configure()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(admin(json_post("/api/admin/orders/9999/release", "")), server.configure()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    server.tear_down().await;
}

#[actix_web::test]
async fn cancel_delivery_frees_the_rider() {
    let server = TestServer::new().await;
    let (order, delivery, rider) = server.assigned_delivery().await;
    let path = format!("/api/admin/deliveries/{}/cancel", delivery.id);
    let (status, body) = send(admin(json_post(&path, r#"{"reason": "customer unreachable"}"#)), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let transition = json(&body);
    assert_eq!(transition["delivery"]["status"], "CANCELLED");
    assert_eq!(transition["order"]["status"], "CANCELLED");
    assert_eq!(transition["freed_rider"]["id"], rider.id);
    assert_eq!(transition["freed_rider"]["status"], "AVAILABLE");

    let (delivery, order) = server.delivery_for(order.id).await;
    assert_eq!(delivery.status, DeliveryStatus::Cancelled);
    assert_eq!(order.status, FulfillmentStatus::Cancelled);
    assert!(server.notifier.received(&rider.phone, "cancelled"));

    let (status, _) = send(admin(json_post(&path, "")), server.configure()).await;
    assert_eq!(status, StatusCode::CONFLICT, "a cancelled delivery cannot be cancelled again");
    server.tear_down().await;
}

#[actix_web::test]
async fn reassign_delivery() {
    let server = TestServer::new().await;
    let (order, delivery, rider) = server.assigned_delivery().await;
    let path = format!("/api/admin/deliveries/{}/reassign", delivery.id);

    let (status, body) = send(admin(json_post(&path, "")), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["reassigned"], false, "nobody else is available");

    let other = server.rider("Emeka", "+2348050000022").await;
    let (status, body) = send(admin(json_post(&path, r#"{"reason": "bike broke down"}"#)), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let result = json(&body);
    assert_eq!(result["reassigned"], true);
    assert_eq!(result["new_rider"]["id"], other.id);
    assert_eq!(result["previous_rider"]["id"], rider.id);
    assert_eq!(result["previous_rider"]["status"], RiderStatus::Available.as_str());

    let (delivery, _) = server.delivery_for(order.id).await;
    assert_eq!(delivery.rider_id, Some(other.id));
    server.tear_down().await;
}

#[actix_web::test]
async fn alert_feed() {
    let server = TestServer::new().await;
    let req = TestRequest::get().uri("/api/admin/alerts/stream?client=ops-desk");
    let (status, _) = send(req, server.configure()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let res = call(admin(TestRequest::get().uri("/api/admin/alerts/stream?client=ops-desk")), server.configure()).await;
    assert_eq!(res.status(), StatusCode::OK);
    let content_type = res.headers().get("Content-Type").and_then(|v| v.to_str().ok()).map(String::from);
    assert_eq!(content_type.as_deref(), Some("text/event-stream"));
    let mut body = res.into_body();
    assert_eq!(next_chunk(&mut body).await.unwrap(), ": connected\n\n");

    let low = NewActivity::new("delivery", Severity::Low, "Rider is 5 minutes away");
    server.activity.record(low).await.unwrap();
    let high = NewActivity::new("payout", Severity::Critical, "Transfer to GTBank failed").for_order(7);
    server.activity.record(high).await.unwrap();
    let chunk = next_chunk(&mut body).await.expect("the alert should have been pushed");
    let event = String::from_utf8_lossy(&chunk);
    assert!(event.starts_with("data: "));
    let alert = json(event.trim_start_matches("data: ").trim_end());
    assert_eq!(alert["type"], "alert");
    assert_eq!(alert["entry"]["severity"], "CRITICAL");
    assert_eq!(alert["entry"]["message"], "Transfer to GTBank failed");
    assert_eq!(alert["entry"]["order_id"], 7);
    server.tear_down().await;
}
