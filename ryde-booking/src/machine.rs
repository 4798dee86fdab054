//! Booking lifecycle transitions.
//!
//! Every function here is pure over a [`Booking`] and the [`TripLedger`] of its trip. The
//! caller holds the trip lock and persists the results; nothing here touches storage.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use ryde_catalog::{pricing, schedule, TripLedger};
use ryde_core::payment::PaymentOutcome;
use crate::error::BookingResult;
use crate::models::{Booking, BookingStatus, PaymentStatus};

/// Business rules that parameterize the lifecycle.
#[derive(Debug, Clone)]
pub struct BookingRules {
    pub cancellation_cutoff: Duration,
    pub payment_timeout: Duration,
    pub conflict_window: Duration,
    pub currency: String,
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            cancellation_cutoff: Duration::hours(12),
            payment_timeout: Duration::minutes(30),
            conflict_window: schedule::default_window(),
            currency: "NGN".to_string(),
        }
    }
}

/// What applying a payment result did to the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEffect {
    Confirmed,
    Cancelled { released: u32 },
    Unchanged,
}

/// What settling a booking against the clock did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Completed,
    Expired { released: u32 },
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Cannot cancel within {cutoff_hours} hours of departure ({hours_left} hours left)")]
    TooCloseToDeparture {
        hours_left: i64,
        cutoff_hours: i64,
    },

    #[error("Only paid bookings can be cancelled")]
    NotPayable,

    #[error("Booking is already cancelled")]
    AlreadyCancelled,

    #[error("Cannot cancel a booking whose trip has already departed")]
    PastBooking,

    #[error("Booking payment is already finalized")]
    AlreadyFinalized,

    #[error("Payment already processed or invalid")]
    NotPending,
}

/// Create a pending booking and reserve its seats on the ledger.
///
/// The price is checked before any seat is touched, and a rejected reservation leaves the
/// ledger unchanged.
pub fn create(
    ledger: &mut TripLedger,
    user_id: Uuid,
    seat_numbers: &[u32],
    expected_price: i64,
    payment_reference: String,
    now: DateTime<Utc>,
) -> BookingResult<Booking> {
    let quoted = pricing::quote(ledger.trip().seat_price, seat_numbers.len())?;
    pricing::ensure_expected(quoted, expected_price)?;

    let booking_id = Uuid::new_v4();
    ledger.reserve(booking_id, seat_numbers)?;

    Ok(Booking::new(
        booking_id,
        user_id,
        ledger.trip_id(),
        seat_numbers.to_vec(),
        quoted,
        payment_reference,
        now,
    ))
}

/// Apply a provider-reported payment result.
///
/// Idempotent: once payment succeeded or the booking left `pending`, further results are
/// absorbed as [`PaymentEffect::Unchanged`].
pub fn apply_payment_result(
    booking: &mut Booking,
    ledger: &mut TripLedger,
    outcome: PaymentOutcome,
    now: DateTime<Utc>,
) -> PaymentEffect {
    if booking.status != BookingStatus::Pending || booking.payment_status != PaymentStatus::Pending {
        if outcome == PaymentOutcome::Successful && booking.status == BookingStatus::Cancelled {
            tracing::warn!(
                booking_id = %booking.id,
                reference = %booking.payment_reference,
                "Payment succeeded for a cancelled booking; refund required"
            );
        }
        return PaymentEffect::Unchanged;
    }

    match outcome {
        PaymentOutcome::Successful => {
            booking.transition(BookingStatus::Confirmed, PaymentStatus::Successful, now);
            PaymentEffect::Confirmed
        }
        PaymentOutcome::Failed => {
            booking.transition(BookingStatus::Cancelled, PaymentStatus::Failed, now);
            let released = ledger.release(booking.id);
            PaymentEffect::Cancelled { released }
        }
    }
}

/// Passenger-initiated cancellation of a paid booking. Returns the number of seats freed.
pub fn cancel(
    booking: &mut Booking,
    ledger: &mut TripLedger,
    now: DateTime<Utc>,
    cutoff: Duration,
) -> Result<u32, TransitionError> {
    let departure = ledger.trip().departure_time;

    if booking.status == BookingStatus::Cancelled {
        return Err(TransitionError::AlreadyCancelled);
    }
    if booking.status == BookingStatus::Completed || departure <= now {
        return Err(TransitionError::PastBooking);
    }
    if booking.payment_status != PaymentStatus::Successful {
        return Err(TransitionError::NotPayable);
    }
    let left = departure - now;
    if left < cutoff {
        return Err(TransitionError::TooCloseToDeparture {
            hours_left: left.num_hours(),
            cutoff_hours: cutoff.num_hours(),
        });
    }

    booking.transition(BookingStatus::Cancelled, booking.payment_status, now);
    Ok(ledger.release(booking.id))
}

/// Status a booking should have at `now`, ignoring what is stored.
pub fn derive_status(
    booking: &Booking,
    departure_time: DateTime<Utc>,
    now: DateTime<Utc>,
    payment_timeout: Duration,
) -> BookingStatus {
    match booking.status {
        BookingStatus::Confirmed if departure_time < now => BookingStatus::Completed,
        BookingStatus::Pending
            if departure_time < now || booking.created_at + payment_timeout < now =>
        {
            BookingStatus::Cancelled
        }
        status => status,
    }
}

/// Persistable form of [`derive_status`]: completes departed confirmed bookings and
/// expires unpaid ones, releasing their seats.
pub fn settle(
    booking: &mut Booking,
    ledger: &mut TripLedger,
    now: DateTime<Utc>,
    payment_timeout: Duration,
) -> Settlement {
    let derived = derive_status(booking, ledger.trip().departure_time, now, payment_timeout);
    match (booking.status, derived) {
        (BookingStatus::Confirmed, BookingStatus::Completed) => {
            booking.transition(BookingStatus::Completed, booking.payment_status, now);
            Settlement::Completed
        }
        (BookingStatus::Pending, BookingStatus::Cancelled) => {
            booking.transition(BookingStatus::Cancelled, PaymentStatus::Failed, now);
            Settlement::Expired {
                released: ledger.release(booking.id),
            }
        }
        _ => Settlement::Unchanged,
    }
}
