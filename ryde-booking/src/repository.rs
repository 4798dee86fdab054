use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use uuid::Uuid;
use ryde_catalog::{Bus, Park, Route, Trip, TripLedger};
use ryde_core::search::TripSummary;
use ryde_core::{CoreError, CoreResult};
use crate::models::Booking;

/// Exclusive handle on one trip, open for the duration of a single transaction.
///
/// Everything staged through the handle becomes visible atomically on [`TripLock::commit`];
/// dropping the handle rolls it back and releases the lock.
#[async_trait]
pub trait TripLock: Send {
    fn ledger(&self) -> &TripLedger;
    fn ledger_mut(&mut self) -> &mut TripLedger;

    /// Booking of this trip as seen inside the transaction.
    async fn booking(&mut self, booking_id: Uuid) -> CoreResult<Option<Booking>>;

    /// Pending and confirmed bookings of this trip.
    async fn active_bookings(&mut self) -> CoreResult<Vec<Booking>>;

    async fn reference_taken(&mut self, reference: &str) -> CoreResult<bool>;

    /// Hold `bus_id` against concurrent scheduling until commit and return its trips
    /// departing on `date`, this one included.
    async fn lock_bus_schedule(&mut self, bus_id: Uuid, date: NaiveDate) -> CoreResult<Vec<Trip>>;

    /// Insert or replace a booking on commit.
    fn stage_booking(&mut self, booking: Booking);

    /// Remove the trip and its remaining bookings on commit.
    fn stage_trip_deletion(&mut self);

    async fn commit(self: Box<Self>) -> CoreResult<()>;
}

/// Filter for public trip search; all bounds are optional.
#[derive(Debug, Clone, Default)]
pub struct TripQuery {
    pub origin_park_id: Option<Uuid>,
    pub destination_park_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub departing_after: Option<DateTime<Utc>>,
}

/// Outcome of an atomic check-and-insert of a new trip.
#[derive(Debug, Clone)]
pub enum ScheduleOutcome {
    Scheduled(Trip),
    Conflict(Trip),
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn lock_trip(&self, trip_id: Uuid) -> CoreResult<Box<dyn TripLock>>;

    async fn trip(&self, trip_id: Uuid) -> CoreResult<Option<Trip>>;

    /// Unlocked, consistent snapshot of a trip's seat map.
    async fn seat_map(&self, trip_id: Uuid) -> CoreResult<Option<TripLedger>>;

    async fn booking(&self, booking_id: Uuid) -> CoreResult<Option<Booking>>;

    async fn booking_by_reference(&self, reference: &str) -> CoreResult<Option<Booking>>;

    async fn bookings_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Booking>>;

    /// Bookings whose stored status may be behind the clock: unpaid past the timeout,
    /// or pending/confirmed on a departed trip.
    async fn stale_bookings(&self, now: DateTime<Utc>, payment_timeout: Duration) -> CoreResult<Vec<Booking>>;

    /// Insert `trip` unless its bus already runs a conflicting trip.
    async fn schedule_trip(&self, trip: Trip, window: Duration) -> CoreResult<ScheduleOutcome>;

    async fn search_trips(&self, query: &TripQuery) -> CoreResult<Vec<TripSummary>>;

    async fn upcoming_trips_for_park(&self, park_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<Trip>>;
}

/// Parks, buses and routes are managed elsewhere and only read here.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn park(&self, park_id: Uuid) -> CoreResult<Option<Park>>;
    async fn bus(&self, bus_id: Uuid) -> CoreResult<Option<Bus>>;
    async fn route(&self, route_id: Uuid) -> CoreResult<Option<Route>>;
}

/// Park that owns a trip: the origin park of its route.
pub async fn managing_park(catalog: &dyn CatalogRepository, trip: &Trip) -> CoreResult<Park> {
    let route = catalog
        .route(trip.route_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("route {}", trip.route_id)))?;
    catalog
        .park(route.origin_park_id)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("park {}", route.origin_park_id)))
}
