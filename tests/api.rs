//! HTTP-level tests driving the router over a real TCP socket.

#![allow(clippy::panic)]

mod common;

use booking_gateway::domain::{ActorId, Booking, BookingStatus, PaymentStatus};
use booking_gateway::payment::GatewayOp;
use reqwest::StatusCode;
use serde_json::{Value, json};

use common::{TestApp, intent_event, spawn_app};

async fn error_code(response: reqwest::Response) -> u64 {
    let Ok(body) = response.json::<Value>().await else {
        panic!("error body should be JSON");
    };
    let Some(code) = body.pointer("/error/code").and_then(Value::as_u64) else {
        panic!("error code missing in {body}");
    };
    code
}

async fn booking_of(response: reqwest::Response) -> Booking {
    let Ok(booking) = response.json::<Booking>().await else {
        panic!("booking body");
    };
    booking
}

async fn accept(app: &TestApp, booking: &Booking) -> reqwest::Response {
    app.post(
        &format!("/api/v1/bookings/{}/accept", booking.id),
        app.provider,
        json!({}),
    )
    .await
}

#[tokio::test]
async fn health_is_served_at_root_and_under_api() {
    let app = spawn_app().await;
    for path in ["/health", "/api/v1/health"] {
        let Ok(response) = app.client.get(app.url(path)).send().await else {
            panic!("health should answer");
        };
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn booking_is_visible_to_its_parties_only() {
    let app = spawn_app().await;
    let customer = ActorId::new();
    let booking = app.create_booking(customer, "09:00", "10:00").await;
    assert_eq!(booking.status, BookingStatus::AwaitingPayment);
    assert_eq!(booking.total_cents, 11_000);

    let path = format!("/api/v1/bookings/{}", booking.id);
    assert_eq!(app.get(&path, customer).await.status(), StatusCode::OK);
    assert_eq!(app.get(&path, app.provider).await.status(), StatusCode::OK);

    let stranger = app.get(&path, ActorId::new()).await;
    assert_eq!(stranger.status(), StatusCode::FORBIDDEN);
    assert_eq!(error_code(stranger).await, 1101);

    let Ok(anonymous) = app.client.get(app.url(&path)).send().await else {
        panic!("request should reach the server");
    };
    assert_eq!(anonymous.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn inverted_slot_is_rejected() {
    let app = spawn_app().await;
    let response = app
        .post(
            "/api/v1/bookings",
            ActorId::new(),
            json!({
                "provider_id": app.provider_id,
                "service_id": app.service_id,
                "date": "2026-01-15",
                "time_start": "15:00",
                "time_end": "14:00",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, 1001);
}

#[tokio::test]
async fn overlapping_paid_bookings_first_accept_wins() {
    let app = spawn_app().await;
    let (alice, bob) = (ActorId::new(), ActorId::new());
    let first = app.create_booking(alice, "14:00", "15:00").await;
    let second = app.create_booking(bob, "14:30", "15:30").await;
    app.secure_funds(alice, first.id).await;
    app.secure_funds(bob, second.id).await;

    let accepted = accept(&app, &first).await;
    assert_eq!(accepted.status(), StatusCode::OK);
    assert_eq!(booking_of(accepted).await.status, BookingStatus::Confirmed);

    let refused = accept(&app, &second).await;
    assert_eq!(refused.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(refused).await, 2101);
}

#[tokio::test]
async fn accept_waits_for_payment_and_is_idempotent() {
    let app = spawn_app().await;
    let customer = ActorId::new();
    let booking = app.create_booking(customer, "11:00", "12:00").await;

    let early = accept(&app, &booking).await;
    assert_eq!(early.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(early).await, 2102);

    app.secure_funds(customer, booking.id).await;
    let first = accept(&app, &booking).await;
    assert_eq!(first.status(), StatusCode::OK);
    let confirmed = booking_of(first).await;
    assert_eq!(confirmed.status, BookingStatus::Confirmed);
    assert_eq!(confirmed.payment_status, PaymentStatus::Captured);

    let again = accept(&app, &booking).await;
    assert_eq!(again.status(), StatusCode::OK);
    assert_eq!(booking_of(again).await.status, BookingStatus::Confirmed);
    assert_eq!(app.gateway.effects(GatewayOp::Capture).await, 1);
}

#[tokio::test]
async fn expiry_webhook_expires_and_duplicate_is_noop() {
    let app = spawn_app().await;
    let customer = ActorId::new();
    let booking = app.create_booking(customer, "16:00", "17:00").await;
    let intent = app.secure_funds(customer, booking.id).await;

    let payload = intent_event(
        "evt_expired",
        "payment_intent.canceled",
        &intent,
        booking.id,
        json!({ "cancellation_reason": "automatic" }),
    );
    let first = app.deliver(&payload).await;
    assert_eq!(first.status(), StatusCode::OK);
    let Ok(ack) = first.json::<Value>().await else {
        panic!("ack body");
    };
    assert_eq!(ack.get("outcome").and_then(Value::as_str), Some("applied"));

    let path = format!("/api/v1/bookings/{}", booking.id);
    let expired = booking_of(app.get(&path, customer).await).await;
    assert_eq!(expired.status, BookingStatus::Expired);

    let duplicate = app.deliver(&payload).await;
    assert_eq!(duplicate.status(), StatusCode::OK);
    let Ok(ack) = duplicate.json::<Value>().await else {
        panic!("ack body");
    };
    assert_eq!(ack.get("outcome").and_then(Value::as_str), Some("duplicate"));
    assert_eq!(booking_of(app.get(&path, customer).await).await, expired);
}

#[tokio::test]
async fn declining_unpaid_booking_is_invalid() {
    let app = spawn_app().await;
    let booking = app.create_booking(ActorId::new(), "08:00", "09:00").await;
    let response = app
        .post(
            &format!("/api/v1/bookings/{}/decline", booking.id),
            app.provider,
            json!({ "reason": "closed" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(error_code(response).await, 2102);
}

#[tokio::test]
async fn declining_paid_booking_releases_the_hold() {
    let app = spawn_app().await;
    let customer = ActorId::new();
    let booking = app.create_booking(customer, "13:00", "14:00").await;
    app.secure_funds(customer, booking.id).await;

    let response = app
        .post(
            &format!("/api/v1/bookings/{}/decline", booking.id),
            app.provider,
            json!({ "reason": "double booked" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let declined = booking_of(response).await;
    assert_eq!(declined.status, BookingStatus::Declined);
    assert_eq!(declined.payment_status, PaymentStatus::Released);
    assert_eq!(declined.reason.as_deref(), Some("double booked"));
    assert_eq!(app.gateway.effects(GatewayOp::Cancel).await, 1);
}

#[tokio::test]
async fn unsigned_webhook_is_rejected() {
    let app = spawn_app().await;
    let Ok(response) = app
        .client
        .post(app.url("/api/v1/webhooks/payments"))
        .header("stripe-signature", "t=1,v1=deadbeef")
        .body(r#"{"id":"evt_1","type":"payment_intent.succeeded","data":{"object":{"id":"pi_1"}}}"#)
        .send()
        .await
    else {
        panic!("request should reach the server");
    };
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_code(response).await, 1002);
}

#[tokio::test]
async fn provider_lists_own_schedule() {
    let app = spawn_app().await;
    let customer = ActorId::new();
    app.create_booking(customer, "10:00", "11:00").await;
    app.create_booking(customer, "08:00", "09:00").await;

    let path = format!("/api/v1/providers/{}/bookings?date=2026-01-15", app.provider_id);
    let response = app.get(&path, app.provider).await;
    assert_eq!(response.status(), StatusCode::OK);
    let Ok(body) = response.json::<Value>().await else {
        panic!("list body");
    };
    let Some(data) = body.get("data").and_then(Value::as_array) else {
        panic!("data array in {body}");
    };
    let starts: Vec<&str> = data
        .iter()
        .filter_map(|b| b.get("time_start").and_then(Value::as_str))
        .collect();
    assert_eq!(starts, vec!["08:00:00", "10:00:00"]);

    assert_eq!(app.get(&path, customer).await.status(), StatusCode::FORBIDDEN);
}
