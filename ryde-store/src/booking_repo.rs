//! Postgres implementation of the booking store.
//!
//! The trip row is the lock: `SELECT ... FOR UPDATE` inside a transaction serializes every
//! writer of that trip, and the transaction is the commit/rollback boundary.

use std::collections::HashMap;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use ryde_booking::repository::{ScheduleOutcome, TripQuery};
use ryde_booking::{Booking, BookingStore, TripLock};
use ryde_catalog::{schedule, SeatAssignment, Trip, TripLedger};
use ryde_core::search::TripSummary;
use ryde_core::{CoreError, CoreResult};

const TRIP_COLUMNS: &str =
    "id, route_id, bus_id, departure_time, seat_price, total_seats, available_seats, created_at";

const BOOKING_COLUMNS: &str = "id, user_id, trip_id, seat_numbers, seat_count, price, payment_reference, \
     status, payment_status, created_at, updated_at";

pub(crate) fn storage(e: sqlx::Error) -> CoreError {
    CoreError::StorageError(e.to_string())
}

fn to_u32(value: i32, column: &str) -> CoreResult<u32> {
    u32::try_from(value).map_err(|_| CoreError::StorageError(format!("negative {}: {}", column, value)))
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct TripRow {
    id: Uuid,
    route_id: Uuid,
    bus_id: Uuid,
    departure_time: DateTime<Utc>,
    seat_price: i64,
    total_seats: i32,
    available_seats: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<TripRow> for Trip {
    type Error = CoreError;

    fn try_from(row: TripRow) -> CoreResult<Self> {
        Ok(Trip {
            id: row.id,
            route_id: row.route_id,
            bus_id: row.bus_id,
            departure_time: row.departure_time,
            seat_price: row.seat_price,
            total_seats: to_u32(row.total_seats, "total_seats")?,
            available_seats: to_u32(row.available_seats, "available_seats")?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    trip_id: Uuid,
    seat_numbers: Vec<i32>,
    seat_count: i32,
    price: i64,
    payment_reference: String,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = CoreError;

    fn try_from(row: BookingRow) -> CoreResult<Self> {
        let seat_numbers = row
            .seat_numbers
            .into_iter()
            .map(|seat| to_u32(seat, "seat_number"))
            .collect::<CoreResult<Vec<u32>>>()?;
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            trip_id: row.trip_id,
            seat_numbers,
            seat_count: to_u32(row.seat_count, "seat_count")?,
            price: row.price,
            payment_reference: row.payment_reference,
            status: row.status.parse().map_err(CoreError::StorageError)?,
            payment_status: row.payment_status.parse().map_err(CoreError::StorageError)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn bookings(rows: Vec<BookingRow>) -> CoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

fn trips(rows: Vec<TripRow>) -> CoreResult<Vec<Trip>> {
    rows.into_iter().map(Trip::try_from).collect()
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    trip_id: Uuid,
    route_id: Uuid,
    bus_id: Uuid,
    origin_park_id: Uuid,
    destination_park_id: Uuid,
    departure_time: DateTime<Utc>,
    seat_price: i64,
    total_seats: i32,
    available_seats: i32,
}

impl TryFrom<SummaryRow> for TripSummary {
    type Error = CoreError;

    fn try_from(row: SummaryRow) -> CoreResult<Self> {
        Ok(TripSummary {
            trip_id: row.trip_id,
            route_id: row.route_id,
            bus_id: row.bus_id,
            origin_park_id: row.origin_park_id,
            destination_park_id: row.destination_park_id,
            departure_time: row.departure_time,
            seat_price: row.seat_price,
            total_seats: to_u32(row.total_seats, "total_seats")?,
            available_seats: to_u32(row.available_seats, "available_seats")?,
        })
    }
}

async fn load_assignments(tx: &mut Transaction<'static, Postgres>, trip_id: Uuid) -> CoreResult<Vec<SeatAssignment>> {
    let rows: Vec<(i32, Uuid)> = sqlx::query_as("SELECT seat_number, booking_id FROM seat_assignments WHERE trip_id = $1")
        .bind(trip_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(storage)?;
    rows.into_iter()
        .map(|(seat, booking_id)| {
            Ok(SeatAssignment {
                trip_id,
                seat_number: to_u32(seat, "seat_number")?,
                booking_id,
            })
        })
        .collect()
}

async fn trips_for_bus_on_date(
    executor: &mut sqlx::PgConnection,
    bus_id: Uuid,
    date: NaiveDate,
) -> CoreResult<Vec<Trip>> {
    let rows: Vec<TripRow> = sqlx::query_as(&format!(
        "SELECT {} FROM trips \
         WHERE bus_id = $1 AND (departure_time AT TIME ZONE 'UTC')::date = $2 \
         ORDER BY departure_time",
        TRIP_COLUMNS
    ))
    .bind(bus_id)
    .bind(date)
    .fetch_all(executor)
    .await
    .map_err(storage)?;
    trips(rows)
}

/// The bus row serializes scheduling per vehicle, for new trips and for moved ones alike.
async fn lock_bus(executor: &mut sqlx::PgConnection, bus_id: Uuid) -> CoreResult<()> {
    let bus: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM buses WHERE id = $1 FOR UPDATE")
        .bind(bus_id)
        .fetch_optional(executor)
        .await
        .map_err(storage)?;
    match bus {
        Some(_) => Ok(()),
        None => Err(CoreError::NotFound(format!("bus {}", bus_id))),
    }
}

#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgTripLock {
    tx: Transaction<'static, Postgres>,
    ledger: TripLedger,
    staged: HashMap<Uuid, Booking>,
    delete: bool,
}

#[async_trait]
impl TripLock for PgTripLock {
    fn ledger(&self) -> &TripLedger {
        &self.ledger
    }

    fn ledger_mut(&mut self) -> &mut TripLedger {
        &mut self.ledger
    }

    async fn booking(&mut self, booking_id: Uuid) -> CoreResult<Option<Booking>> {
        if let Some(staged) = self.staged.get(&booking_id) {
            return Ok(Some(staged.clone()));
        }
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE id = $1 AND trip_id = $2",
            BOOKING_COLUMNS
        ))
        .bind(booking_id)
        .bind(self.ledger.trip_id())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(storage)?;
        row.map(Booking::try_from).transpose()
    }

    async fn active_bookings(&mut self) -> CoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE trip_id = $1 AND status IN ('pending', 'confirmed')",
            BOOKING_COLUMNS
        ))
        .bind(self.ledger.trip_id())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(storage)?;

        let mut merged: HashMap<Uuid, Booking> = bookings(rows)?.into_iter().map(|b| (b.id, b)).collect();
        merged.extend(self.staged.iter().map(|(id, b)| (*id, b.clone())));
        Ok(merged.into_values().filter(Booking::holds_seats).collect())
    }

    async fn reference_taken(&mut self, reference: &str) -> CoreResult<bool> {
        if self.staged.values().any(|b| b.payment_reference == reference) {
            return Ok(true);
        }
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM bookings WHERE payment_reference = $1)")
            .bind(reference)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(storage)
    }

    async fn lock_bus_schedule(&mut self, bus_id: Uuid, date: NaiveDate) -> CoreResult<Vec<Trip>> {
        lock_bus(&mut self.tx, bus_id).await?;
        trips_for_bus_on_date(&mut self.tx, bus_id, date).await
    }

    fn stage_booking(&mut self, booking: Booking) {
        self.staged.insert(booking.id, booking);
    }

    fn stage_trip_deletion(&mut self) {
        self.delete = true;
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let PgTripLock { mut tx, ledger, staged, delete } = *self;
        let trip_id = ledger.trip_id();

        if delete {
            // bookings and seat assignments cascade
            sqlx::query("DELETE FROM trips WHERE id = $1")
                .bind(trip_id)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
            return tx.commit().await.map_err(storage);
        }

        let trip = ledger.trip();
        sqlx::query(
            "UPDATE trips SET bus_id = $2, departure_time = $3, seat_price = $4, total_seats = $5, available_seats = $6 \
             WHERE id = $1",
        )
        .bind(trip.id)
        .bind(trip.bus_id)
        .bind(trip.departure_time)
        .bind(trip.seat_price)
        .bind(trip.total_seats as i32)
        .bind(trip.available_seats as i32)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        for booking in staged.values() {
            let seat_numbers: Vec<i32> = booking.seat_numbers.iter().map(|s| *s as i32).collect();
            sqlx::query(
                "INSERT INTO bookings (id, user_id, trip_id, seat_numbers, seat_count, price, payment_reference, \
                                       status, payment_status, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (id) DO UPDATE SET \
                     status = EXCLUDED.status, \
                     payment_status = EXCLUDED.payment_status, \
                     updated_at = EXCLUDED.updated_at",
            )
            .bind(booking.id)
            .bind(booking.user_id)
            .bind(booking.trip_id)
            .bind(seat_numbers)
            .bind(booking.seat_count as i32)
            .bind(booking.price)
            .bind(&booking.payment_reference)
            .bind(booking.status.as_str())
            .bind(booking.payment_status.as_str())
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        let diff = ledger.diff();
        if !diff.removed.is_empty() {
            let removed: Vec<i32> = diff.removed.iter().map(|s| *s as i32).collect();
            sqlx::query("DELETE FROM seat_assignments WHERE trip_id = $1 AND seat_number = ANY($2)")
                .bind(trip_id)
                .bind(removed)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
        }
        for assignment in &diff.added {
            sqlx::query("INSERT INTO seat_assignments (trip_id, seat_number, booking_id) VALUES ($1, $2, $3)")
                .bind(assignment.trip_id)
                .bind(assignment.seat_number as i32)
                .bind(assignment.booking_id)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn lock_trip(&self, trip_id: Uuid) -> CoreResult<Box<dyn TripLock>> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        let row: Option<TripRow> = sqlx::query_as(&format!("SELECT {} FROM trips WHERE id = $1 FOR UPDATE", TRIP_COLUMNS))
            .bind(trip_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;
        let trip = match row {
            Some(row) => Trip::try_from(row)?,
            None => return Err(CoreError::NotFound(format!("trip {}", trip_id))),
        };
        let assignments = load_assignments(&mut tx, trip_id).await?;

        Ok(Box::new(PgTripLock {
            tx,
            ledger: TripLedger::new(trip, assignments),
            staged: HashMap::new(),
            delete: false,
        }))
    }

    async fn trip(&self, trip_id: Uuid) -> CoreResult<Option<Trip>> {
        let row: Option<TripRow> = sqlx::query_as(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(trip_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(Trip::try_from).transpose()
    }

    async fn seat_map(&self, trip_id: Uuid) -> CoreResult<Option<TripLedger>> {
        // one snapshot for counter and assignments
        let mut tx = self.pool.begin().await.map_err(storage)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        let row: Option<TripRow> = sqlx::query_as(&format!("SELECT {} FROM trips WHERE id = $1", TRIP_COLUMNS))
            .bind(trip_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let trip = Trip::try_from(row)?;
        let assignments = load_assignments(&mut tx, trip_id).await?;
        tx.commit().await.map_err(storage)?;
        Ok(Some(TripLedger::new(trip, assignments)))
    }

    async fn booking(&self, booking_id: Uuid) -> CoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS))
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.map(Booking::try_from).transpose()
    }

    async fn booking_by_reference(&self, reference: &str) -> CoreResult<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {} FROM bookings WHERE payment_reference = $1", BOOKING_COLUMNS))
                .bind(reference)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        row.map(Booking::try_from).transpose()
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
            BOOKING_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        bookings(rows)
    }

    async fn stale_bookings(&self, now: DateTime<Utc>, payment_timeout: Duration) -> CoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(
            "SELECT b.id, b.user_id, b.trip_id, b.seat_numbers, b.seat_count, b.price, b.payment_reference, \
                    b.status, b.payment_status, b.created_at, b.updated_at \
             FROM bookings b JOIN trips t ON t.id = b.trip_id \
             WHERE (b.status = 'pending' AND (b.created_at < $1 OR t.departure_time < $2)) \
                OR (b.status = 'confirmed' AND t.departure_time < $2)",
        )
        .bind(now - payment_timeout)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        bookings(rows)
    }

    async fn schedule_trip(&self, trip: Trip, window: Duration) -> CoreResult<ScheduleOutcome> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        lock_bus(&mut tx, trip.bus_id).await?;
        let same_day = trips_for_bus_on_date(&mut tx, trip.bus_id, trip.departure_time.date_naive()).await?;
        if let Some(existing) = schedule::conflicting_trip(&same_day, trip.bus_id, trip.departure_time, window, None) {
            return Ok(ScheduleOutcome::Conflict(existing.clone()));
        }

        sqlx::query(&format!(
            "INSERT INTO trips ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            TRIP_COLUMNS
        ))
        .bind(trip.id)
        .bind(trip.route_id)
        .bind(trip.bus_id)
        .bind(trip.departure_time)
        .bind(trip.seat_price)
        .bind(trip.total_seats as i32)
        .bind(trip.available_seats as i32)
        .bind(trip.created_at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        tx.commit().await.map_err(storage)?;

        Ok(ScheduleOutcome::Scheduled(trip))
    }

    async fn search_trips(&self, query: &TripQuery) -> CoreResult<Vec<TripSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT t.id AS trip_id, t.route_id, t.bus_id, r.origin_park_id, r.destination_park_id, \
                    t.departure_time, t.seat_price, t.total_seats, t.available_seats \
             FROM trips t JOIN routes r ON r.id = t.route_id \
             WHERE ($1::uuid IS NULL OR r.origin_park_id = $1) \
               AND ($2::uuid IS NULL OR r.destination_park_id = $2) \
               AND ($3::date IS NULL OR (t.departure_time AT TIME ZONE 'UTC')::date = $3) \
               AND ($4::timestamptz IS NULL OR t.departure_time >= $4) \
             ORDER BY t.departure_time",
        )
        .bind(query.origin_park_id)
        .bind(query.destination_park_id)
        .bind(query.date)
        .bind(query.departing_after)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter().map(TripSummary::try_from).collect()
    }

    async fn upcoming_trips_for_park(&self, park_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<Trip>> {
        let rows: Vec<TripRow> = sqlx::query_as(
            "SELECT t.id, t.route_id, t.bus_id, t.departure_time, t.seat_price, t.total_seats, \
                    t.available_seats, t.created_at \
             FROM trips t JOIN routes r ON r.id = t.route_id \
             WHERE r.origin_park_id = $1 AND t.departure_time > $2 \
             ORDER BY t.departure_time",
        )
        .bind(park_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        trips(rows)
    }
}
