//! Stripe gateway over the REST API (form-encoded, no SDK).
//!
//! Charges are destination charges with `capture_method=manual`: the hold
//! is placed when the customer pays and captured when the provider accepts.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use super::{
    ChargeRequest, PaymentGateway, PaymentGatewayError, PaymentRef, SessionRef, SessionRequest,
};

/// Production API base.
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Stripe client.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    /// Builds a client with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// [`PaymentGatewayError::Rejected`] if the HTTP client cannot be built.
    pub fn new(
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, PaymentGatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentGatewayError::Rejected(format!("http client: {e}")))?;
        Ok(Self {
            client,
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post(
        &self,
        path: &str,
        idempotency_key: &str,
        form: &[(&str, String)],
    ) -> Result<Value, PaymentGatewayError> {
        let response = self
            .client
            .post(format!("{}{path}", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await
            .map_err(|e| PaymentGatewayError::Transient(e.to_string()))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PaymentGatewayError::Transient(format!("unreadable response: {e}")))?;

        if status.is_success() {
            Ok(body)
        } else {
            let err = classify_error(status, &body);
            tracing::debug!(path, status = status.as_u16(), error = %err, "stripe request failed");
            Err(err)
        }
    }
}

/// Maps a non-2xx Stripe response onto [`PaymentGatewayError`].
fn classify_error(status: StatusCode, body: &Value) -> PaymentGatewayError {
    let text = |pointer: &str| text_at(body, pointer);
    let message = match text("/error/message") {
        "" => "unknown stripe error".to_string(),
        m => m.to_string(),
    };

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return PaymentGatewayError::Transient(message);
    }

    let intent_status = text("/error/payment_intent/status");
    match (text("/error/type"), text("/error/code")) {
        (_, "idempotency_key_in_use") => PaymentGatewayError::Transient(message),
        (_, "payment_intent_unexpected_state") if intent_status == "canceled" => {
            PaymentGatewayError::AuthorizationExpired(message)
        }
        (_, "charge_expired_for_capture") => PaymentGatewayError::AuthorizationExpired(message),
        ("card_error", _) | (_, "card_declined") => PaymentGatewayError::Declined(message),
        _ => PaymentGatewayError::Rejected(message),
    }
}

fn text_at<'a>(body: &'a Value, pointer: &str) -> &'a str {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn string_field(body: &Value, field: &str) -> Result<String, PaymentGatewayError> {
    body.get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| PaymentGatewayError::Rejected(format!("response missing {field}: {body}")))
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn authorize(&self, request: &ChargeRequest) -> Result<PaymentRef, PaymentGatewayError> {
        let form = [
            ("amount", request.amount_cents.to_string()),
            ("currency", request.currency.clone()),
            ("capture_method", "manual".to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("application_fee_amount", request.application_fee_cents.to_string()),
            ("transfer_data[destination]", request.destination_account.clone()),
            ("metadata[booking_id]", request.booking_id.to_string()),
        ];
        let body = self
            .post("/v1/payment_intents", &request.idempotency_key, &form)
            .await?;
        Ok(PaymentRef {
            id: string_field(&body, "id")?,
            client_secret: body
                .get("client_secret")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    async fn capture(
        &self,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<(), PaymentGatewayError> {
        self.post(
            &format!("/v1/payment_intents/{reference}/capture"),
            idempotency_key,
            &[],
        )
        .await
        .map(|_| ())
    }

    async fn cancel(&self, reference: &str, idempotency_key: &str) -> Result<(), PaymentGatewayError> {
        // An unpaid checkout session has no intent to void yet.
        let path = if reference.starts_with("cs_") {
            format!("/v1/checkout/sessions/{reference}/expire")
        } else {
            format!("/v1/payment_intents/{reference}/cancel")
        };
        self.post(&path, idempotency_key, &[]).await.map(|_| ())
    }

    async fn refund(&self, reference: &str, idempotency_key: &str) -> Result<(), PaymentGatewayError> {
        let form = [
            ("payment_intent", reference.to_string()),
            ("reverse_transfer", "true".to_string()),
            ("refund_application_fee", "true".to_string()),
        ];
        self.post("/v1/refunds", idempotency_key, &form)
            .await
            .map(|_| ())
    }

    async fn create_hosted_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionRef, PaymentGatewayError> {
        let charge = &request.charge;
        let booking_id = charge.booking_id.to_string();
        let form = [
            ("mode", "payment".to_string()),
            ("client_reference_id", booking_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", charge.currency.clone()),
            ("line_items[0][price_data][unit_amount]", charge.amount_cents.to_string()),
            ("line_items[0][price_data][product_data][name]", format!("Booking {booking_id}")),
            ("payment_intent_data[capture_method]", "manual".to_string()),
            (
                "payment_intent_data[application_fee_amount]",
                charge.application_fee_cents.to_string(),
            ),
            (
                "payment_intent_data[transfer_data][destination]",
                charge.destination_account.clone(),
            ),
            ("payment_intent_data[metadata][booking_id]", booking_id.clone()),
            ("metadata[booking_id]", booking_id),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
        ];
        let body = self
            .post("/v1/checkout/sessions", &charge.idempotency_key, &form)
            .await?;
        Ok(SessionRef {
            id: string_field(&body, "id")?,
            url: string_field(&body, "url")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        let body = json!({"error": {"message": "boom"}});
        assert!(classify_error(StatusCode::BAD_GATEWAY, &body).is_transient());
        assert!(classify_error(StatusCode::TOO_MANY_REQUESTS, &body).is_transient());
    }

    #[test]
    fn card_errors_are_declines() {
        let body = json!({"error": {"type": "card_error", "code": "card_declined", "message": "Your card was declined."}});
        assert_eq!(
            classify_error(StatusCode::PAYMENT_REQUIRED, &body),
            PaymentGatewayError::Declined("Your card was declined.".into())
        );
    }

    #[test]
    fn capture_on_canceled_intent_is_expiry() {
        let body = json!({"error": {
            "type": "invalid_request_error",
            "code": "payment_intent_unexpected_state",
            "message": "This PaymentIntent could not be captured because it has a status of canceled.",
            "payment_intent": {"status": "canceled"}
        }});
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, &body),
            PaymentGatewayError::AuthorizationExpired(_)
        ));
    }

    #[test]
    fn other_client_errors_are_rejections() {
        let body = json!({"error": {"type": "invalid_request_error", "code": "resource_missing", "message": "No such destination"}});
        assert!(matches!(
            classify_error(StatusCode::BAD_REQUEST, &body),
            PaymentGatewayError::Rejected(_)
        ));
    }

    #[test]
    fn concurrent_idempotent_request_is_transient() {
        let body = json!({"error": {"type": "idempotency_error", "code": "idempotency_key_in_use", "message": "in use"}});
        assert!(classify_error(StatusCode::CONFLICT, &body).is_transient());
    }

    #[test]
    fn missing_field_is_rejection() {
        assert!(matches!(
            string_field(&json!({}), "id"),
            Err(PaymentGatewayError::Rejected(_))
        ));
    }
}
