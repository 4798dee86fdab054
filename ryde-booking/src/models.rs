use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use ryde_catalog::Trip;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Successful,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Successful => "successful",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "successful" => Ok(PaymentStatus::Successful),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status '{}'", other)),
        }
    }
}

/// Channel a payment result arrived through.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentSource {
    Callback,
    Webhook,
    Poll,
    Admin,
    Initialize,
}

impl PaymentSource {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentSource::Callback => "callback",
            PaymentSource::Webhook => "webhook",
            PaymentSource::Poll => "poll",
            PaymentSource::Admin => "admin",
            PaymentSource::Initialize => "initialize",
        }
    }
}

/// A passenger's claim on seats of one trip.
///
/// `seat_numbers` is the seat selection made at creation; the trip ledger stays the
/// authority on which seats are currently held.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub trip_id: Uuid,
    pub seat_numbers: Vec<u32>,
    pub seat_count: u32,
    pub price: i64,
    pub payment_reference: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        id: Uuid,
        user_id: Uuid,
        trip_id: Uuid,
        mut seat_numbers: Vec<u32>,
        price: i64,
        payment_reference: String,
        now: DateTime<Utc>,
    ) -> Self {
        seat_numbers.sort_unstable();
        Self {
            id,
            user_id,
            trip_id,
            seat_count: seat_numbers.len() as u32,
            seat_numbers,
            price,
            payment_reference,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending and confirmed bookings own seat assignments.
    pub fn holds_seats(&self) -> bool {
        matches!(self.status, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_awaiting_payment(&self) -> bool {
        self.status == BookingStatus::Pending && self.payment_status == PaymentStatus::Pending
    }

    pub(crate) fn transition(&mut self, status: BookingStatus, payment_status: PaymentStatus, now: DateTime<Utc>) {
        self.status = status;
        self.payment_status = payment_status;
        self.updated_at = now;
    }
}

/// The one outward representation of a booking; `status` is the status derived at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingView {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub payment_reference: String,
    pub seat_numbers: Vec<u32>,
    pub seat_count: u32,
    pub price: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub departure_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl BookingView {
    pub fn project(booking: &Booking, trip: &Trip, currency: &str) -> Self {
        Self {
            id: booking.id,
            trip_id: booking.trip_id,
            payment_reference: booking.payment_reference.clone(),
            seat_numbers: booking.seat_numbers.clone(),
            seat_count: booking.seat_count,
            price: booking.price,
            currency: currency.to_string(),
            status: booking.status,
            payment_status: booking.payment_status,
            departure_time: trip.departure_time,
            created_at: booking.created_at,
        }
    }
}
