//! Booking error types with HTTP status code mapping.
//!
//! [`BookingError`] is the single error type callers of the booking API see.
//! Storage and payment-gateway errors are translated into it at the service
//! boundary; each variant maps to a numeric code and an HTTP status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::BookingStatus;
use crate::payment::PaymentGatewayError;
use crate::persistence::StoreError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2101,
///     "message": "booking conflict: slot overlaps a confirmed booking",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Whether repeating the same request unchanged may succeed.
    pub retryable: bool,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Error taxonomy of the booking core.
///
/// # Error Code Ranges
///
/// | Range     | Category              | HTTP Status                     |
/// |-----------|-----------------------|---------------------------------|
/// | 1000–1099 | Validation            | 400 Bad Request                 |
/// | 1100–1199 | Authorization         | 403 Forbidden                   |
/// | 2000–2099 | Not Found             | 404 Not Found                   |
/// | 2100–2199 | Conflict / State      | 409 Conflict                    |
/// | 3000–3999 | Server / Upstream     | 500 / 503                       |
/// | 4000–4999 | Payment               | 402 Payment Required / 422      |
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    /// Malformed interval, missing fields, or otherwise unusable input.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown booking, service, or provider.
    #[error("not found: {0}")]
    ResourceMissing(String),

    /// The actor is not a party to the booking in the required role.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The slot overlaps a committed booking for the same provider.
    ///
    /// Never safe to retry unchanged; retry with a different slot.
    #[error("booking conflict: {0}")]
    BookingConflict(String),

    /// The event is not legal from the booking's current state.
    #[error("invalid state transition: cannot apply {event} to booking in state {from}")]
    InvalidStateTransition {
        /// Status the booking was in.
        from: BookingStatus,
        /// Name of the rejected event.
        event: &'static str,
    },

    /// The payment hold lapsed before capture; the booking is now expired.
    #[error("payment authorization expired: {0}")]
    PaymentAuthorizationExpired(String),

    /// The gateway rejected the charge.
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// The provider has not finished payout onboarding.
    #[error("provider {0} has no payout account; the provider must complete payment onboarding")]
    PayoutAccountMissing(crate::domain::ProviderId),

    /// Transient storage or network failure.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Webhook signature verification failed.
    #[error("invalid signature: {0}")]
    SignatureInvalid(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BookingError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::SignatureInvalid(_) => 1002,
            Self::PermissionDenied(_) => 1101,
            Self::ResourceMissing(_) => 2001,
            Self::BookingConflict(_) => 2101,
            Self::InvalidStateTransition { .. } => 2102,
            Self::Internal(_) => 3000,
            Self::UpstreamUnavailable(_) => 3001,
            Self::PaymentAuthorizationExpired(_) => 4001,
            Self::PaymentFailed(_) => 4002,
            Self::PayoutAccountMissing(_) => 4003,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::SignatureInvalid(_) => StatusCode::BAD_REQUEST,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::ResourceMissing(_) => StatusCode::NOT_FOUND,
            Self::BookingConflict(_) | Self::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            Self::PaymentAuthorizationExpired(_) | Self::PaymentFailed(_) => {
                StatusCode::PAYMENT_REQUIRED
            }
            Self::PayoutAccountMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the identical request may succeed if retried later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => {
                Self::BookingConflict("slot overlaps a confirmed booking".to_string())
            }
            StoreError::StaleState { current } => Self::InvalidStateTransition {
                from: current,
                event: "update",
            },
            StoreError::NotFound(what) => Self::ResourceMissing(what),
            StoreError::Unavailable(msg) => Self::UpstreamUnavailable(msg),
            StoreError::Corrupt(msg) => Self::Internal(msg),
        }
    }
}

impl From<PaymentGatewayError> for BookingError {
    fn from(err: PaymentGatewayError) -> Self {
        match err {
            PaymentGatewayError::AuthorizationExpired(msg) => {
                Self::PaymentAuthorizationExpired(msg)
            }
            PaymentGatewayError::Declined(msg) | PaymentGatewayError::Rejected(msg) => {
                Self::PaymentFailed(msg)
            }
            PaymentGatewayError::Transient(msg) => Self::UpstreamUnavailable(msg),
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.error_code(), "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                retryable: self.is_retryable(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
