//! Domain layer: booking model, interval arithmetic, state machine, events.
//!
//! Everything here is free of I/O. Services in [`crate::service`] combine
//! these types with the storage and payment-gateway collaborators.

pub mod booking;
pub mod domain_event;
pub mod event_bus;
pub mod ids;
pub mod interval;
pub mod state_machine;

pub use booking::{Booking, BookingStatus, NewBooking, PaymentStatus, PayoutAccount, ServiceOffering};
pub use domain_event::DomainEvent;
pub use event_bus::EventBus;
pub use ids::{ActorId, BookingId, CustomerId, ProviderId, ServiceId};
pub use interval::TimeInterval;
pub use state_machine::{BookingEvent, Transition};
