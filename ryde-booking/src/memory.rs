//! In-process store used by tests and local runs without Postgres.

use std::collections::HashMap;
use std::sync::Arc;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;
use ryde_catalog::{schedule, Bus, Park, Route, SeatAssignment, Trip, TripLedger};
use ryde_core::search::TripSummary;
use ryde_core::{CoreError, CoreResult};
use crate::models::{Booking, BookingStatus};
use crate::repository::{BookingStore, CatalogRepository, ScheduleOutcome, TripLock, TripQuery};

#[derive(Default)]
struct State {
    parks: HashMap<Uuid, Park>,
    buses: HashMap<Uuid, Bus>,
    routes: HashMap<Uuid, Route>,
    trips: HashMap<Uuid, Trip>,
    seats: HashMap<Uuid, Vec<SeatAssignment>>,
    bookings: HashMap<Uuid, Booking>,
}

impl State {
    fn ledger(&self, trip_id: Uuid) -> Option<TripLedger> {
        let trip = self.trips.get(&trip_id)?.clone();
        let seats = self.seats.get(&trip_id).cloned().unwrap_or_default();
        Some(TripLedger::new(trip, seats))
    }
}

type MutexMap = Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

async fn entry_mutex(map: &MutexMap, id: Uuid) -> Arc<Mutex<()>> {
    map.lock().await.entry(id).or_default().clone()
}

/// Shared maps behind one `RwLock`, plus one mutex per trip that serializes writers and
/// one per bus that serializes scheduling.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    locks: MutexMap,
    bus_locks: MutexMap,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_park(&self, park: Park) {
        self.state.write().await.parks.insert(park.id, park);
    }

    pub async fn add_bus(&self, bus: Bus) {
        self.state.write().await.buses.insert(bus.id, bus);
    }

    pub async fn add_route(&self, route: Route) {
        self.state.write().await.routes.insert(route.id, route);
    }

    /// Seed a trip without running the conflict check.
    pub async fn add_trip(&self, trip: Trip) {
        let mut state = self.state.write().await;
        state.seats.entry(trip.id).or_default();
        state.trips.insert(trip.id, trip);
    }

}

struct MemoryTripLock {
    _guard: OwnedMutexGuard<()>,
    bus_guard: Option<OwnedMutexGuard<()>>,
    state: Arc<RwLock<State>>,
    locks: MutexMap,
    bus_locks: MutexMap,
    ledger: TripLedger,
    staged: HashMap<Uuid, Booking>,
    delete: bool,
}

#[async_trait]
impl TripLock for MemoryTripLock {
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
        let state = self.state.read().await;
        Ok(state
            .bookings
            .get(&booking_id)
            .filter(|b| b.trip_id == self.ledger.trip_id())
            .cloned())
    }

    async fn active_bookings(&mut self) -> CoreResult<Vec<Booking>> {
        let trip_id = self.ledger.trip_id();
        let state = self.state.read().await;
        let mut merged: HashMap<Uuid, Booking> = state
            .bookings
            .values()
            .filter(|b| b.trip_id == trip_id)
            .map(|b| (b.id, b.clone()))
            .collect();
        merged.extend(self.staged.iter().map(|(id, b)| (*id, b.clone())));
        Ok(merged.into_values().filter(Booking::holds_seats).collect())
    }

    async fn reference_taken(&mut self, reference: &str) -> CoreResult<bool> {
        if self.staged.values().any(|b| b.payment_reference == reference) {
            return Ok(true);
        }
        let state = self.state.read().await;
        Ok(state.bookings.values().any(|b| b.payment_reference == reference))
    }

    async fn lock_bus_schedule(&mut self, bus_id: Uuid, date: NaiveDate) -> CoreResult<Vec<Trip>> {
        if self.bus_guard.is_some() {
            return Err(CoreError::StorageError("bus schedule already locked in this transaction".into()));
        }
        self.bus_guard = Some(entry_mutex(&self.bus_locks, bus_id).await.lock_owned().await);

        let state = self.state.read().await;
        if !state.buses.contains_key(&bus_id) {
            return Err(CoreError::NotFound(format!("bus {}", bus_id)));
        }
        let mut trips: Vec<Trip> = state
            .trips
            .values()
            .filter(|t| t.bus_id == bus_id && t.departure_time.date_naive() == date)
            .cloned()
            .collect();
        trips.sort_by_key(|t| t.departure_time);
        Ok(trips)
    }

    fn stage_booking(&mut self, booking: Booking) {
        self.staged.insert(booking.id, booking);
    }

    fn stage_trip_deletion(&mut self) {
        self.delete = true;
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let this = *self;
        let trip_id = this.ledger.trip_id();
        let mut state = this.state.write().await;

        if this.delete {
            state.trips.remove(&trip_id);
            state.seats.remove(&trip_id);
            state.bookings.retain(|_, b| b.trip_id != trip_id);
            drop(state);
            this.locks.lock().await.remove(&trip_id);
            return Ok(());
        }

        for booking in this.staged.values() {
            let duplicate = state
                .bookings
                .values()
                .any(|b| b.id != booking.id && b.payment_reference == booking.payment_reference);
            if duplicate {
                return Err(CoreError::StorageError(format!(
                    "duplicate payment reference {}",
                    booking.payment_reference
                )));
            }
        }

        let (trip, seats) = this.ledger.into_parts();
        state.trips.insert(trip_id, trip);
        state.seats.insert(trip_id, seats);
        state.bookings.extend(this.staged);
        Ok(())
    }
}

fn is_stale(booking: &Booking, trip: Option<&Trip>, now: DateTime<Utc>, payment_timeout: Duration) -> bool {
    let departed = trip.map(|t| t.departure_time < now).unwrap_or(false);
    match booking.status {
        BookingStatus::Pending => departed || booking.created_at + payment_timeout < now,
        BookingStatus::Confirmed => departed,
        _ => false,
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn lock_trip(&self, trip_id: Uuid) -> CoreResult<Box<dyn TripLock>> {
        let guard = entry_mutex(&self.locks, trip_id).await.lock_owned().await;
        let ledger = self
            .state
            .read()
            .await
            .ledger(trip_id)
            .ok_or_else(|| CoreError::NotFound(format!("trip {}", trip_id)))?;

        Ok(Box::new(MemoryTripLock {
            _guard: guard,
            bus_guard: None,
            state: self.state.clone(),
            locks: self.locks.clone(),
            bus_locks: self.bus_locks.clone(),
            ledger,
            staged: HashMap::new(),
            delete: false,
        }))
    }

    async fn trip(&self, trip_id: Uuid) -> CoreResult<Option<Trip>> {
        Ok(self.state.read().await.trips.get(&trip_id).cloned())
    }

    async fn seat_map(&self, trip_id: Uuid) -> CoreResult<Option<TripLedger>> {
        Ok(self.state.read().await.ledger(trip_id))
    }

    async fn booking(&self, booking_id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(self.state.read().await.bookings.get(&booking_id).cloned())
    }

    async fn booking_by_reference(&self, reference: &str) -> CoreResult<Option<Booking>> {
        let state = self.state.read().await;
        Ok(state.bookings.values().find(|b| b.payment_reference == reference).cloned())
    }

    async fn bookings_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Booking>> {
        let state = self.state.read().await;
        let mut bookings: Vec<Booking> = state.bookings.values().filter(|b| b.user_id == user_id).cloned().collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookings)
    }

    async fn stale_bookings(&self, now: DateTime<Utc>, payment_timeout: Duration) -> CoreResult<Vec<Booking>> {
        let state = self.state.read().await;
        Ok(state
            .bookings
            .values()
            .filter(|b| is_stale(b, state.trips.get(&b.trip_id), now, payment_timeout))
            .cloned()
            .collect())
    }

    async fn schedule_trip(&self, trip: Trip, window: Duration) -> CoreResult<ScheduleOutcome> {
        let _bus = entry_mutex(&self.bus_locks, trip.bus_id).await.lock_owned().await;
        let mut state = self.state.write().await;
        let same_bus: Vec<Trip> = state.trips.values().filter(|t| t.bus_id == trip.bus_id).cloned().collect();

        if let Some(existing) = schedule::conflicting_trip(&same_bus, trip.bus_id, trip.departure_time, window, None) {
            return Ok(ScheduleOutcome::Conflict(existing.clone()));
        }

        state.seats.insert(trip.id, Vec::new());
        state.trips.insert(trip.id, trip.clone());
        Ok(ScheduleOutcome::Scheduled(trip))
    }

    async fn search_trips(&self, query: &TripQuery) -> CoreResult<Vec<TripSummary>> {
        let state = self.state.read().await;
        let mut results: Vec<TripSummary> = state
            .trips
            .values()
            .filter_map(|trip| state.routes.get(&trip.route_id).map(|route| (trip, route)))
            .filter(|(_, route)| query.origin_park_id.map_or(true, |id| route.origin_park_id == id))
            .filter(|(_, route)| query.destination_park_id.map_or(true, |id| route.destination_park_id == id))
            .filter(|(trip, _)| query.date.map_or(true, |d| trip.departure_time.date_naive() == d))
            .filter(|(trip, _)| query.departing_after.map_or(true, |after| trip.departure_time >= after))
            .map(|(trip, route)| TripSummary {
                trip_id: trip.id,
                route_id: route.id,
                bus_id: trip.bus_id,
                origin_park_id: route.origin_park_id,
                destination_park_id: route.destination_park_id,
                departure_time: trip.departure_time,
                seat_price: trip.seat_price,
                total_seats: trip.total_seats,
                available_seats: trip.available_seats,
            })
            .collect();
        results.sort_by_key(|s| s.departure_time);
        Ok(results)
    }

    async fn upcoming_trips_for_park(&self, park_id: Uuid, now: DateTime<Utc>) -> CoreResult<Vec<Trip>> {
        let state = self.state.read().await;
        let mut trips: Vec<Trip> = state
            .trips
            .values()
            .filter(|t| t.departure_time > now)
            .filter(|t| state.routes.get(&t.route_id).is_some_and(|r| r.origin_park_id == park_id))
            .cloned()
            .collect();
        trips.sort_by_key(|t| t.departure_time);
        Ok(trips)
    }
}

#[async_trait]
impl CatalogRepository for InMemoryStore {
    async fn park(&self, park_id: Uuid) -> CoreResult<Option<Park>> {
        Ok(self.state.read().await.parks.get(&park_id).cloned())
    }

    async fn bus(&self, bus_id: Uuid) -> CoreResult<Option<Bus>> {
        Ok(self.state.read().await.buses.get(&bus_id).cloned())
    }

    async fn route(&self, route_id: Uuid) -> CoreResult<Option<Route>> {
        Ok(self.state.read().await.routes.get(&route_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn trip(total_seats: u32) -> Trip {
        let now = Utc::now();
        Trip {
            id: Uuid::new_v4(),
            route_id: Uuid::new_v4(),
            bus_id: Uuid::new_v4(),
            departure_time: now + Duration::days(1),
            seat_price: 2_000_00,
            total_seats,
            available_seats: total_seats,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_dropped_lock_rolls_back() {
        let store = InMemoryStore::new();
        let t = trip(4);
        store.add_trip(t.clone()).await;

        {
            let mut lock = store.lock_trip(t.id).await.unwrap();
            lock.ledger_mut().reserve(Uuid::new_v4(), &[1, 2]).unwrap();
        }

        let snapshot = store.seat_map(t.id).await.unwrap().unwrap();
        assert_eq!(snapshot.available_seats(), 4);
    }

    #[tokio::test]
    async fn test_commit_publishes_ledger_and_bookings() {
        let store = InMemoryStore::new();
        let t = trip(4);
        store.add_trip(t.clone()).await;

        let mut lock = store.lock_trip(t.id).await.unwrap();
        let booking_id = Uuid::new_v4();
        lock.ledger_mut().reserve(booking_id, &[3]).unwrap();
        let booking = Booking::new(booking_id, Uuid::new_v4(), t.id, vec![3], 2_000_00, "REF-A".into(), Utc::now());
        lock.stage_booking(booking);
        assert!(lock.reference_taken("REF-A").await.unwrap());
        lock.commit().await.unwrap();

        assert_eq!(store.trip(t.id).await.unwrap().unwrap().available_seats, 3);
        assert!(store.booking_by_reference("REF-A").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lock_serializes_writers() {
        let store = InMemoryStore::new();
        let t = trip(4);
        store.add_trip(t.clone()).await;

        let first = store.lock_trip(t.id).await.unwrap();
        let contender = {
            let store = store.clone();
            tokio::spawn(async move { store.lock_trip(t.id).await.map(|_| ()) })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_bus_schedule_hold_blocks_new_trips_until_commit() {
        let store = InMemoryStore::new();
        let mut t = trip(4);
        t.departure_time = Utc.with_ymd_and_hms(2031, 1, 10, 8, 0, 0).unwrap();
        store.add_trip(t.clone()).await;
        store
            .add_bus(Bus { id: t.bus_id, park_id: Uuid::new_v4(), number_plate: "KJA-1".into(), total_seats: 4 })
            .await;

        let mut lock = store.lock_trip(t.id).await.unwrap();
        let same_day = lock.lock_bus_schedule(t.bus_id, t.departure_time.date_naive()).await.unwrap();
        assert_eq!(same_day.len(), 1);

        let mut clash = trip(4);
        clash.bus_id = t.bus_id;
        clash.departure_time = t.departure_time + Duration::hours(5);
        let contender = {
            let store = store.clone();
            tokio::spawn(async move { store.schedule_trip(clash, schedule::default_window()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        lock.ledger_mut().reschedule(t.departure_time + Duration::hours(4));
        lock.commit().await.unwrap();
        match contender.await.unwrap().unwrap() {
            ScheduleOutcome::Conflict(found) => assert_eq!(found.id, t.id),
            ScheduleOutcome::Scheduled(_) => panic!("expected a conflict with the moved trip"),
        }
    }

    #[tokio::test]
    async fn test_missing_trip() {
        let store = InMemoryStore::new();
        assert!(matches!(store.lock_trip(Uuid::new_v4()).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_schedule_trip_checks_conflicts_atomically() {
        let store = InMemoryStore::new();
        let existing = trip(18);
        store.add_trip(existing.clone()).await;

        let mut clash = trip(18);
        clash.bus_id = existing.bus_id;
        clash.departure_time = existing.departure_time + Duration::minutes(90);

        match store.schedule_trip(clash, schedule::default_window()).await.unwrap() {
            ScheduleOutcome::Conflict(found) => assert_eq!(found.id, existing.id),
            ScheduleOutcome::Scheduled(_) => panic!("expected a conflict"),
        }
    }
}
