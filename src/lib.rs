//! # booking-gateway
//!
//! REST and WebSocket service for booking provider time slots, with
//! conflict-free scheduling and a payment-driven booking lifecycle.
//!
//! A booking is created `awaiting_payment`, moves to `pending_acceptance`
//! once the payment gateway reports funds held, and becomes `confirmed`
//! when the provider accepts (capturing the funds). No two confirmed
//! bookings of a provider ever overlap: the storage layer enforces it at
//! commit time, whatever the interleaving of requests.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)      Payment gateway (webhooks)
//!     │                               │
//!     ├── REST Handlers (api/)        │
//!     ├── Operator feed (ws/)         │
//!     │                               │
//!     ├── BookingService ─── PaymentOrchestrator ─── WebhookDispatcher
//!     │        │                   │
//!     │   ConflictDetector    PaymentGateway (payment/)
//!     │        │
//!     ├── EventBus, state machine (domain/)
//!     │
//!     └── BookingStore (persistence/): PostgreSQL or in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod payment;
pub mod persistence;
pub mod service;
pub mod ws;
