use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{opts, Encoder, IntCounter, IntCounterVec, Registry, TextEncoder};
use crate::error::AppError;
use crate::state::AppState;

/// Booking counters exported on `/metrics`.
pub struct Metrics {
    registry: Registry,
    bookings_created: IntCounter,
    bookings_cancelled: IntCounterVec,
    payment_results: IntCounterVec,
    seat_conflicts: IntCounter,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let bookings_created = IntCounter::new("ryde_bookings_created_total", "Bookings created")?;
        let bookings_cancelled = IntCounterVec::new(
            opts!("ryde_bookings_cancelled_total", "Bookings cancelled, by reason"),
            &["reason"],
        )?;
        let payment_results = IntCounterVec::new(
            opts!("ryde_payment_results_total", "Payment results applied, by source and effect"),
            &["source", "effect"],
        )?;
        let seat_conflicts = IntCounter::new("ryde_seat_conflicts_total", "Reservations rejected for taken seats")?;

        registry.register(Box::new(bookings_created.clone()))?;
        registry.register(Box::new(bookings_cancelled.clone()))?;
        registry.register(Box::new(payment_results.clone()))?;
        registry.register(Box::new(seat_conflicts.clone()))?;

        Ok(Self {
            registry,
            bookings_created,
            bookings_cancelled,
            payment_results,
            seat_conflicts,
        })
    }

    pub fn booking_created(&self) {
        self.bookings_created.inc();
    }

    pub fn booking_cancelled(&self, reason: &str) {
        self.bookings_cancelled.with_label_values(&[reason]).inc();
    }

    pub fn payment_result(&self, source: &str, effect: &str) {
        self.payment_results.with_label_values(&[source, effect]).inc();
    }

    pub fn seat_conflict(&self) {
        self.seat_conflicts.inc();
    }

    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .export()
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
