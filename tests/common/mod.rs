//! Shared harness: a memory-backed app on an ephemeral port.

#![allow(dead_code, clippy::panic)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use booking_gateway::api::build_app;
use booking_gateway::app_state::AppState;
use booking_gateway::config::GatewayConfig;
use booking_gateway::domain::{
    ActorId, Booking, BookingId, PayoutAccount, ProviderId, ServiceId, ServiceOffering,
};
use booking_gateway::payment::signature::sign_payload;
use booking_gateway::payment::{FakeGateway, PaymentGateway};
use booking_gateway::persistence::BookingStore;
use booking_gateway::persistence::memory::MemoryStore;
use chrono::Utc;
use serde_json::{Value, json};

pub const WEBHOOK_SECRET: &str = "whsec_integration";

pub struct TestApp {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub provider: ActorId,
    pub provider_id: ProviderId,
    pub service_id: ServiceId,
}

pub fn config(block_pending_overlap: bool) -> GatewayConfig {
    let vars: HashMap<&str, String> = HashMap::from([
        ("STORAGE_BACKEND", "memory".to_string()),
        ("STRIPE_WEBHOOK_SECRET", WEBHOOK_SECRET.to_string()),
        ("GATEWAY_RETRY_BASE_MS", "1".to_string()),
        ("PLATFORM_FEE_BPS", "1000".to_string()),
        ("BLOCK_PENDING_OVERLAP", block_pending_overlap.to_string()),
    ]);
    let Ok(config) = GatewayConfig::from_lookup(|key| vars.get(key).cloned()) else {
        panic!("test config should load");
    };
    config
}

/// Services only, no HTTP listener.
pub async fn state(block_pending_overlap: bool) -> (AppState, Arc<MemoryStore>, Arc<FakeGateway>, ProviderId, ServiceId) {
    let store = Arc::new(MemoryStore::new());
    let provider_id = ProviderId::new();
    let service_id = ServiceId::new();
    store
        .insert_service(ServiceOffering {
            id: service_id,
            provider_id,
            price_cents: 10_000,
            duration_minutes: 60,
            active: true,
        })
        .await;
    store
        .insert_payout_account(PayoutAccount {
            provider_id,
            account_id: "acct_provider".into(),
        })
        .await;
    let gateway = Arc::new(FakeGateway::new());
    let state = AppState::from_config(
        &config(block_pending_overlap),
        Arc::clone(&store) as Arc<dyn BookingStore>,
        Arc::clone(&gateway) as Arc<dyn PaymentGateway>,
    );
    (state, store, gateway, provider_id, service_id)
}

pub async fn spawn_app() -> TestApp {
    let (state, store, gateway, provider_id, service_id) = state(false).await;
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind should succeed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("listener has an address");
    };
    let app = build_app(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    TestApp {
        addr,
        client: reqwest::Client::new(),
        state,
        store,
        gateway,
        provider: ActorId::from_uuid(*provider_id.as_uuid()),
        provider_id,
        service_id,
    }
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub async fn post(&self, path: &str, actor: ActorId, body: Value) -> reqwest::Response {
        let Ok(response) = self
            .client
            .post(self.url(path))
            .header("x-actor-id", actor.to_string())
            .json(&body)
            .send()
            .await
        else {
            panic!("POST {path} should reach the server");
        };
        response
    }

    pub async fn get(&self, path: &str, actor: ActorId) -> reqwest::Response {
        let Ok(response) = self
            .client
            .get(self.url(path))
            .header("x-actor-id", actor.to_string())
            .send()
            .await
        else {
            panic!("GET {path} should reach the server");
        };
        response
    }

    /// Creates a booking on 2026-01-15 from `start` ("HH:MM") for one hour.
    pub async fn create_booking(&self, customer: ActorId, start: &str, end: &str) -> Booking {
        let response = self
            .post(
                "/api/v1/bookings",
                customer,
                json!({
                    "provider_id": self.provider_id,
                    "service_id": self.service_id,
                    "date": "2026-01-15",
                    "time_start": start,
                    "time_end": end,
                }),
            )
            .await;
        assert_eq!(response.status(), reqwest::StatusCode::CREATED);
        let Ok(booking) = response.json::<Booking>().await else {
            panic!("booking body");
        };
        booking
    }

    /// Starts an intent payment and returns its id.
    pub async fn start_payment(&self, customer: ActorId, booking: BookingId) -> String {
        let response = self
            .post(
                &format!("/api/v1/bookings/{booking}/payment"),
                customer,
                json!({ "mode": "intent" }),
            )
            .await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let Ok(body) = response.json::<Value>().await else {
            panic!("payment body");
        };
        let Some(intent) = body.get("artifact_id").and_then(Value::as_str) else {
            panic!("artifact id in {body}");
        };
        intent.to_string()
    }

    pub async fn deliver(&self, payload: &[u8]) -> reqwest::Response {
        let Ok(signature) = sign_payload(payload, WEBHOOK_SECRET, Utc::now().timestamp()) else {
            panic!("signing should succeed");
        };
        let Ok(response) = self
            .client
            .post(self.url("/api/v1/webhooks/payments"))
            .header("stripe-signature", signature)
            .header("content-type", "application/json")
            .body(payload.to_vec())
            .send()
            .await
        else {
            panic!("webhook should reach the server");
        };
        response
    }

    /// Pays for a booking end to end: intent, then the gateway's hold event.
    pub async fn secure_funds(&self, customer: ActorId, booking: BookingId) -> String {
        let intent = self.start_payment(customer, booking).await;
        let payload = intent_event(
            &format!("evt_hold_{booking}"),
            "payment_intent.amount_capturable_updated",
            &intent,
            booking,
            json!({}),
        );
        let response = self.deliver(&payload).await;
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        intent
    }
}

/// A signed-ready gateway event about a payment intent.
pub fn intent_event(id: &str, kind: &str, intent: &str, booking: BookingId, extra: Value) -> Vec<u8> {
    let mut object = json!({
        "id": intent,
        "object": "payment_intent",
        "metadata": { "booking_id": booking.to_string() },
    });
    if let (Some(target), Some(fields)) = (object.as_object_mut(), extra.as_object()) {
        for (k, v) in fields {
            target.insert(k.clone(), v.clone());
        }
    }
    json!({ "id": id, "type": kind, "data": { "object": object } })
        .to_string()
        .into_bytes()
}
