use async_trait::async_trait;
use uuid::Uuid;
use ryde_shared::events::{
    topics, BookingCancelledEvent, BookingCompletedEvent, BookingConfirmedEvent, BookingCreatedEvent,
};

/// Lifecycle change, emitted after the transaction that caused it committed.
#[derive(Debug, Clone)]
pub enum BookingEvent {
    Created(BookingCreatedEvent),
    Confirmed(BookingConfirmedEvent),
    Cancelled(BookingCancelledEvent),
    Completed(BookingCompletedEvent),
}

impl BookingEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            BookingEvent::Created(_) => topics::BOOKING_CREATED,
            BookingEvent::Confirmed(_) => topics::BOOKING_CONFIRMED,
            BookingEvent::Cancelled(_) => topics::BOOKING_CANCELLED,
            BookingEvent::Completed(_) => topics::BOOKING_COMPLETED,
        }
    }

    pub fn booking_id(&self) -> Uuid {
        match self {
            BookingEvent::Created(e) => e.booking_id,
            BookingEvent::Confirmed(e) => e.booking_id,
            BookingEvent::Cancelled(e) => e.booking_id,
            BookingEvent::Completed(e) => e.booking_id,
        }
    }

    pub fn trip_id(&self) -> Uuid {
        match self {
            BookingEvent::Created(e) => e.trip_id,
            BookingEvent::Confirmed(e) => e.trip_id,
            BookingEvent::Cancelled(e) => e.trip_id,
            BookingEvent::Completed(e) => e.trip_id,
        }
    }

    /// Whether the trip's seat map changed.
    pub fn moves_seats(&self) -> bool {
        match self {
            BookingEvent::Created(_) => true,
            BookingEvent::Cancelled(e) => e.seats_released > 0,
            BookingEvent::Confirmed(_) | BookingEvent::Completed(_) => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        match self {
            BookingEvent::Created(e) => serde_json::to_string(e),
            BookingEvent::Confirmed(e) => serde_json::to_string(e),
            BookingEvent::Cancelled(e) => serde_json::to_string(e),
            BookingEvent::Completed(e) => serde_json::to_string(e),
        }
    }
}

/// Best-effort delivery of lifecycle events; failures must not fail the transition.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: BookingEvent);
}

/// Discards everything.
pub struct NoopSink;

#[async_trait]
impl EventSink for NoopSink {
    async fn emit(&self, _event: BookingEvent) {}
}
