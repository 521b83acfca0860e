//! Payment-gateway collaborator.
//!
//! The booking core talks to the gateway only through [`PaymentGateway`].
//! Every money-moving call carries a caller-derived idempotency key; the
//! gateway guarantees that repeating a call with the same key has at most
//! one financial effect.

pub mod fake;
pub mod retry;
pub mod signature;
pub mod stripe;

use std::fmt;

use async_trait::async_trait;

use crate::domain::BookingId;

pub use fake::{FakeGateway, GatewayCall, GatewayOp};
pub use retry::RetryPolicy;
pub use stripe::StripeGateway;

/// Gateway failures, classified by what the caller may do about them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentGatewayError {
    /// The hold lapsed (or was voided) before capture.
    #[error("authorization expired: {0}")]
    AuthorizationExpired(String),

    /// The customer's card or bank declined the charge.
    #[error("payment declined: {0}")]
    Declined(String),

    /// The gateway rejected the request for any other definite reason.
    #[error("gateway rejected request: {0}")]
    Rejected(String),

    /// Network failure, timeout or gateway-side 5xx. Safe to retry with the
    /// same idempotency key.
    #[error("gateway unavailable: {0}")]
    Transient(String),
}

impl PaymentGatewayError {
    /// Only transient failures are retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A manual-capture charge on behalf of a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    /// Booking the charge pays for; carried as gateway metadata.
    pub booking_id: BookingId,
    /// Amount in minor units.
    pub amount_cents: i64,
    /// Lowercase ISO 4217 code.
    pub currency: String,
    /// Provider payout account receiving the funds.
    pub destination_account: String,
    /// Platform's cut, kept on transfer.
    pub application_fee_cents: i64,
    /// Idempotency key for the creation call.
    pub idempotency_key: String,
}

/// A created payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRef {
    /// Gateway intent id.
    pub id: String,
    /// Secret the client uses to confirm the intent.
    pub client_secret: Option<String>,
}

/// A hosted checkout session request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// The underlying charge.
    pub charge: ChargeRequest,
    /// Redirect after a successful payment.
    pub success_url: String,
    /// Redirect when the customer abandons checkout.
    pub cancel_url: String,
}

/// A created hosted checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRef {
    /// Gateway session id.
    pub id: String,
    /// URL to send the customer to.
    pub url: String,
}

/// Operations the booking core needs from the payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync + fmt::Debug {
    /// Creates a manual-capture payment intent.
    ///
    /// # Errors
    ///
    /// Any [`PaymentGatewayError`] the gateway reports.
    async fn authorize(&self, request: &ChargeRequest) -> Result<PaymentRef, PaymentGatewayError>;

    /// Captures a previously authorized intent.
    ///
    /// # Errors
    ///
    /// [`PaymentGatewayError::AuthorizationExpired`] if the hold lapsed.
    async fn capture(&self, reference: &str, idempotency_key: &str)
    -> Result<(), PaymentGatewayError>;

    /// Voids an uncaptured intent or expires an open checkout session.
    ///
    /// # Errors
    ///
    /// Any [`PaymentGatewayError`] the gateway reports.
    async fn cancel(&self, reference: &str, idempotency_key: &str)
    -> Result<(), PaymentGatewayError>;

    /// Refunds a captured intent in full.
    ///
    /// # Errors
    ///
    /// Any [`PaymentGatewayError`] the gateway reports.
    async fn refund(&self, reference: &str, idempotency_key: &str)
    -> Result<(), PaymentGatewayError>;

    /// Creates a hosted checkout session whose intent uses manual capture.
    ///
    /// # Errors
    ///
    /// Any [`PaymentGatewayError`] the gateway reports.
    async fn create_hosted_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionRef, PaymentGatewayError>;
}
