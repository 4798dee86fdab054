//! Vehicle double-booking rule for trip scheduling.
//!
//! A bus conflicts with a proposed departure when it already has another trip on the same
//! calendar date (UTC) departing within the window on either side, bounds inclusive.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use crate::trip::Trip;

pub const DEFAULT_CONFLICT_WINDOW_HOURS: i64 = 2;

pub fn default_window() -> Duration {
    Duration::hours(DEFAULT_CONFLICT_WINDOW_HOURS)
}

/// First trip of `bus_id` clashing with `proposed`; `exclude` skips the trip being edited.
pub fn conflicting_trip<'a>(
    existing: &'a [Trip],
    bus_id: Uuid,
    proposed: DateTime<Utc>,
    window: Duration,
    exclude: Option<Uuid>,
) -> Option<&'a Trip> {
    existing.iter().find(|trip| {
        trip.bus_id == bus_id
            && Some(trip.id) != exclude
            && trip.departure_time.date_naive() == proposed.date_naive()
            && (trip.departure_time - proposed).abs() <= window
    })
}

pub fn has_conflict(
    existing: &[Trip],
    bus_id: Uuid,
    proposed: DateTime<Utc>,
    window: Duration,
    exclude: Option<Uuid>,
) -> bool {
    conflicting_trip(existing, bus_id, proposed, window, exclude).is_some()
}
