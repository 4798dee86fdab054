use uuid::Uuid;

/// Kafka topics for booking lifecycle events.
pub mod topics {
    pub const BOOKING_CREATED: &str = "booking.created";
    pub const BOOKING_CONFIRMED: &str = "booking.confirmed";
    pub const BOOKING_CANCELLED: &str = "booking.cancelled";
    pub const BOOKING_COMPLETED: &str = "booking.completed";
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCreatedEvent {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub user_id: Uuid,
    pub payment_reference: String,
    pub seat_numbers: Vec<u32>,
    pub price: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingConfirmedEvent {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub payment_reference: String,
    pub source: String, // callback, webhook, poll, admin
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCancelledEvent {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub reason: String,
    pub seats_released: u32,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BookingCompletedEvent {
    pub booking_id: Uuid,
    pub trip_id: Uuid,
    pub timestamp: i64,
}

/// Pushed to seat-map subscribers whenever a trip's occupancy changes.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SeatMapChangedEvent {
    pub trip_id: Uuid,
    pub available_seats: u32,
    pub taken_seats: Vec<u32>,
    pub changed_at: i64,
}
