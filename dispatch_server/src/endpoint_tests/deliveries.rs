use actix_web::http::StatusCode;
use dispatch_engine::db_types::{DeliveryStatus, FulfillmentStatus};

use super::helpers::{json, json_post, send, TestServer};

#[actix_web::test]
async fn rider_goes_offline_and_back() {
    let server = TestServer::new().await;
    let rider = server.rider("Bayo", "+2348050000021").await;
    let path = format!("/api/riders/{}/status", rider.id);
    let (status, body) = send(json_post(&path, r#"{"online": false}"#), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "OFFLINE");
    let (status, body) = send(json_post(&path, r#"{"online": true}"#), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["status"], "AVAILABLE");

    let (status, _) = send(json_post("/api/riders/9999/status", r#"{"online": true}"#), server.configure()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    server.tear_down().await;
}

#[actix_web::test]
async fn busy_rider_cannot_go_offline() {
    let server = TestServer::new().await;
    let (_, _, rider) = server.assigned_delivery().await;
    let path = format!("/api/riders/{}/status", rider.id);
    let (status, body) = send(json_post(&path, r#"{"online": false}"#), server.configure()).await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    server.tear_down().await;
}

#[actix_web::test]
async fn rider_location() {
    let server = TestServer::new().await;
    let rider = server.rider("Bayo", "+2348050000021").await;
    let path = format!("/api/riders/{}/location", rider.id);
    let (status, body) = send(json_post(&path, r#"{"lat": 6.4541, "lng": 3.3947}"#), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let rider = json(&body);
    assert_eq!(rider["current_lat"], 6.4541);
    assert_eq!(rider["current_lng"], 3.3947);

    let (status, _) = send(json_post(&path, r#"{"lat": 96.0, "lng": 3.3947}"#), server.configure()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(json_post(&path, r#"{"lat": "north"}"#), server.configure()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    server.tear_down().await;
}

#[actix_web::test]
async fn only_the_assigned_rider_reports_progress() {
    let server = TestServer::new().await;
    let (order, delivery, rider) = server.assigned_delivery().await;
    let other = server.rider("Emeka", "+2348050000022").await;
    let path = format!("/api/deliveries/{}/status", delivery.id);

    let payload = format!(r#"{{"rider_id": {}, "status": "PICKED_UP"}}"#, other.id);
    let (status, _) = send(json_post(&path, &payload), server.configure()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let payload = format!(r#"{{"rider_id": {}, "status": "DELIVERED"}}"#, rider.id);
    let (status, _) = send(json_post(&path, &payload), server.configure()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let payload = format!(r#"{{"rider_id": {}, "status": "CANCELLED"}}"#, rider.id);
    let (status, _) = send(json_post(&path, &payload), server.configure()).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let payload = format!(r#"{{"rider_id": {}, "status": "PICKED_UP", "note": "Collected 2 bags"}}"#, rider.id);
    let (status, body) = send(json_post(&path, &payload), server.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let transition = json(&body);
    assert_eq!(transition["from"], "ASSIGNED");
    assert_eq!(transition["delivery"]["status"], "PICKED_UP");
    assert_eq!(transition["order"]["status"], "SHIPPED");

    let (delivery, order) = server.delivery_for(order.id).await;
    assert_eq!(delivery.status, DeliveryStatus::PickedUp);
    assert_eq!(order.status, FulfillmentStatus::Shipped);
    server.tear_down().await;
}

#[actix_web::test]
async fn customer_confirmation_releases_escrow_once() {
    let server = TestServer::new().await;
    let (_, delivery, _) = server.assigned_delivery().await;
    let path = format!("/api/deliveries/{}/confirm", delivery.id);
    let (status, _) = send(json_post(&path, ""), server.configure()).await;
    assert_eq!(status, StatusCode::CONFLICT, "an undelivered order cannot be confirmed");

    let server_delivered = TestServer::new().await;
    let (order, delivery, _) = server_delivered.delivered().await;
    assert_eq!(delivery.status, DeliveryStatus::Delivered);
    let path = format!("/api/deliveries/{}/confirm", delivery.id);
    let (status, body) = send(json_post(&path, ""), server_delivered.configure()).await;
    assert_eq!(status, StatusCode::OK);
    let confirmation = json(&body);
    assert_eq!(confirmation["delivery_id"], delivery.id);
    assert_eq!(confirmation["settlement"]["escrow"]["status"], "RELEASED");
    assert_eq!(confirmation["settlement"]["payout"]["order_id"], order.id);

    let (status, body) = send(json_post(&path, ""), server_delivered.configure()).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json(&body)["settlement"].is_null());

    let (status, _) = send(json_post("/api/deliveries/9999/confirm", ""), server_delivered.configure()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    server.tear_down().await;
    server_delivered.tear_down().await;
}
