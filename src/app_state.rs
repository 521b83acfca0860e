//! Shared application state injected into all Axum handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::domain::EventBus;
use crate::payment::{PaymentGateway, RetryPolicy};
use crate::persistence::BookingStore;
use crate::service::{
    BookingService, CheckoutUrls, ConflictDetector, PaymentOrchestrator, Pricing,
    WebhookDispatcher,
};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
///
/// Every service is cheap to clone: they share the store, gateway and
/// event bus through `Arc`s.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Booking creation, reads and guarded transitions.
    pub bookings: BookingService,
    /// Payment-dependent transitions.
    pub payments: PaymentOrchestrator,
    /// Inbound gateway webhooks.
    pub webhooks: WebhookDispatcher,
    /// Event bus for the operator WebSocket feed.
    pub event_bus: EventBus,
}

impl AppState {
    /// Wires state around an orchestrator; the booking service and event
    /// bus are the ones the orchestrator commits through.
    #[must_use]
    pub fn new(payments: PaymentOrchestrator, webhook_secret: String, tolerance_secs: i64) -> Self {
        let bookings = payments.bookings().clone();
        let event_bus = bookings.event_bus().clone();
        let webhooks = WebhookDispatcher::new(payments.clone(), webhook_secret, tolerance_secs);
        Self {
            bookings,
            payments,
            webhooks,
            event_bus,
        }
    }

    /// Builds every service from configuration around the chosen store and
    /// gateway.
    #[must_use]
    pub fn from_config(
        config: &GatewayConfig,
        store: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let event_bus = EventBus::new(config.event_bus_capacity);
        let conflicts = ConflictDetector::new(Arc::clone(&store), config.block_pending_overlap);
        let bookings = BookingService::new(
            store,
            conflicts,
            event_bus,
            Pricing {
                platform_fee_bps: config.platform_fee_bps,
                currency: config.currency.clone(),
            },
        );
        let payments = PaymentOrchestrator::new(
            bookings,
            gateway,
            RetryPolicy::new(
                config.gateway_max_attempts,
                Duration::from_millis(config.gateway_retry_base_ms),
            ),
            CheckoutUrls {
                success_url: config.checkout_success_url.clone(),
                cancel_url: config.checkout_cancel_url.clone(),
            },
        );
        Self::new(
            payments,
            config.stripe_webhook_secret.clone(),
            config.webhook_tolerance_secs,
        )
    }
}
