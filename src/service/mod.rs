//! Service layer: business logic orchestration.
//!
//! [`BookingService`] owns booking creation and guarded transitions,
//! [`PaymentOrchestrator`] couples those transitions to gateway money
//! movement, and [`WebhookDispatcher`] feeds gateway notifications back in.
//! All of them emit events through the [`super::domain::EventBus`].

pub mod booking_service;
pub mod conflict;
pub mod payment_orchestrator;
pub mod webhook_dispatcher;

pub use booking_service::{BookingService, Commit, CreateBooking, Pricing};
pub use conflict::ConflictDetector;
pub use payment_orchestrator::{CheckoutUrls, PaymentMode, PaymentOrchestrator, PaymentSession};
pub use webhook_dispatcher::{WebhookDispatcher, WebhookOutcome};
