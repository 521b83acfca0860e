//! Scripted in-process gateway.
//!
//! Backs the memory storage profile for local runs and every test. It
//! honours idempotency keys the way a real gateway does: a key that already
//! succeeded replays its stored result without a second financial effect.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ChargeRequest, PaymentGateway, PaymentGatewayError, PaymentRef, SessionRef, SessionRequest,
};

/// Gateway operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOp {
    /// `authorize`
    Authorize,
    /// `capture`
    Capture,
    /// `cancel`
    Cancel,
    /// `refund`
    Refund,
    /// `create_hosted_session`
    CreateSession,
}

/// One call as received, replays included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCall {
    /// Operation.
    pub op: GatewayOp,
    /// Artifact acted on; the booking id for creation calls.
    pub reference: String,
    /// Idempotency key supplied by the caller.
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
enum Stored {
    Payment(PaymentRef),
    Session(SessionRef),
    Done,
}

#[derive(Debug, Default)]
struct FakeState {
    calls: Vec<GatewayCall>,
    completed: HashMap<String, (GatewayOp, Stored)>,
    failures: HashMap<GatewayOp, VecDeque<PaymentGatewayError>>,
}

/// In-memory [`PaymentGateway`] with scripted failures.
#[derive(Debug, Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    /// Creates a gateway where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next non-replayed `op` call fail with `error`.
    /// Queued failures are consumed in order.
    pub async fn fail_next(&self, op: GatewayOp, error: PaymentGatewayError) {
        self.state
            .lock()
            .await
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Every call received so far.
    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of distinct successful `op` effects (replays excluded).
    pub async fn effects(&self, op: GatewayOp) -> usize {
        self.state
            .lock()
            .await
            .completed
            .values()
            .filter(|(done, _)| *done == op)
            .count()
    }

    async fn execute(
        &self,
        op: GatewayOp,
        reference: &str,
        idempotency_key: &str,
        produce: impl FnOnce() -> Stored,
    ) -> Result<Stored, PaymentGatewayError> {
        let mut state = self.state.lock().await;
        state.calls.push(GatewayCall {
            op,
            reference: reference.to_string(),
            idempotency_key: idempotency_key.to_string(),
        });

        if let Some((done, stored)) = state.completed.get(idempotency_key) {
            if *done != op {
                return Err(PaymentGatewayError::Rejected(format!(
                    "idempotency key {idempotency_key} reused for a different request"
                )));
            }
            return Ok(stored.clone());
        }
        if let Some(error) = state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(error);
        }

        let stored = produce();
        state
            .completed
            .insert(idempotency_key.to_string(), (op, stored.clone()));
        Ok(stored)
    }
}

fn unexpected(op: GatewayOp) -> PaymentGatewayError {
    PaymentGatewayError::Rejected(format!("unexpected stored result for {op:?}"))
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn authorize(&self, request: &ChargeRequest) -> Result<PaymentRef, PaymentGatewayError> {
        let stored = self
            .execute(
                GatewayOp::Authorize,
                &request.booking_id.to_string(),
                &request.idempotency_key,
                || {
                    let id = format!("pi_fake_{}", Uuid::new_v4().simple());
                    Stored::Payment(PaymentRef {
                        client_secret: Some(format!("{id}_secret")),
                        id,
                    })
                },
            )
            .await?;
        match stored {
            Stored::Payment(payment) => Ok(payment),
            _ => Err(unexpected(GatewayOp::Authorize)),
        }
    }

    async fn capture(
        &self,
        reference: &str,
        idempotency_key: &str,
    ) -> Result<(), PaymentGatewayError> {
        self.execute(GatewayOp::Capture, reference, idempotency_key, || Stored::Done)
            .await
            .map(|_| ())
    }

    async fn cancel(&self, reference: &str, idempotency_key: &str) -> Result<(), PaymentGatewayError> {
        self.execute(GatewayOp::Cancel, reference, idempotency_key, || Stored::Done)
            .await
            .map(|_| ())
    }

    async fn refund(&self, reference: &str, idempotency_key: &str) -> Result<(), PaymentGatewayError> {
        self.execute(GatewayOp::Refund, reference, idempotency_key, || Stored::Done)
            .await
            .map(|_| ())
    }

    async fn create_hosted_session(
        &self,
        request: &SessionRequest,
    ) -> Result<SessionRef, PaymentGatewayError> {
        let stored = self
            .execute(
                GatewayOp::CreateSession,
                &request.charge.booking_id.to_string(),
                &request.charge.idempotency_key,
                || {
                    let id = format!("cs_fake_{}", Uuid::new_v4().simple());
                    Stored::Session(SessionRef {
                        url: format!("https://checkout.fake/pay/{id}"),
                        id,
                    })
                },
            )
            .await?;
        match stored {
            Stored::Session(session) => Ok(session),
            _ => Err(unexpected(GatewayOp::CreateSession)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::BookingId;

    fn charge(key: &str) -> ChargeRequest {
        ChargeRequest {
            booking_id: BookingId::new(),
            amount_cents: 11_000,
            currency: "usd".into(),
            destination_account: "acct_1".into(),
            application_fee_cents: 1_000,
            idempotency_key: key.into(),
        }
    }

    #[tokio::test]
    async fn replayed_key_returns_same_intent() {
        let gateway = FakeGateway::new();
        let (Ok(first), Ok(second)) = (
            gateway.authorize(&charge("k1")).await,
            gateway.authorize(&charge("k1")).await,
        ) else {
            panic!("authorize should succeed");
        };
        assert_eq!(first, second);
        assert_eq!(gateway.effects(GatewayOp::Authorize).await, 1);
        assert_eq!(gateway.calls().await.len(), 2);
    }

    #[tokio::test]
    async fn scripted_failure_is_consumed_once() {
        let gateway = FakeGateway::new();
        gateway
            .fail_next(GatewayOp::Capture, PaymentGatewayError::Transient("503".into()))
            .await;
        assert!(gateway.capture("pi_1", "cap").await.is_err());
        assert!(gateway.capture("pi_1", "cap").await.is_ok());
        assert!(gateway.capture("pi_1", "cap").await.is_ok());
        assert_eq!(gateway.effects(GatewayOp::Capture).await, 1);
    }

    #[tokio::test]
    async fn key_reuse_across_operations_is_rejected() {
        let gateway = FakeGateway::new();
        assert!(gateway.capture("pi_1", "shared").await.is_ok());
        assert!(matches!(
            gateway.refund("pi_1", "shared").await,
            Err(PaymentGatewayError::Rejected(_))
        ));
    }
}
