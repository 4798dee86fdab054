use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use ryde_catalog::{schedule, Bus, Park, PricingError, Trip};
use ryde_core::identity::Actor;
use ryde_core::search::{TripSearchRequest, TripSummary};
use crate::error::{BookingError, BookingResult};
use crate::machine::BookingRules;
use crate::repository::{managing_park, BookingStore, CatalogRepository, ScheduleOutcome, TripQuery};

#[derive(Debug, Clone, Deserialize)]
pub struct TripDraft {
    pub route_id: Uuid,
    pub bus_id: Uuid,
    pub departure_time: DateTime<Utc>,
    pub seat_price: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripPatch {
    pub departure_time: Option<DateTime<Utc>>,
    pub seat_price: Option<i64>,
    pub bus_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripRejection {
    pub trip_index: usize,
    pub error: String,
}

/// Result of a batch: every entry is either created or rejected with its index.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    pub created_trips: Vec<Trip>,
    pub errors: Vec<TripRejection>,
}

/// Park-admin side of the catalog: scheduling, editing and removing trips.
pub struct TripScheduler {
    store: Arc<dyn BookingStore>,
    catalog: Arc<dyn CatalogRepository>,
    rules: BookingRules,
}

impl TripScheduler {
    pub fn new(store: Arc<dyn BookingStore>, catalog: Arc<dyn CatalogRepository>, rules: BookingRules) -> Self {
        Self { store, catalog, rules }
    }

    pub async fn create_trips(
        &self,
        actor: &Actor,
        park_id: Uuid,
        drafts: Vec<TripDraft>,
        now: DateTime<Utc>,
    ) -> BookingResult<BatchOutcome> {
        let park = self.park(park_id).await?;
        actor.ensure_manages_park(park.admin_id)?;
        if drafts.is_empty() {
            return Err(BookingError::validation("No trips provided"));
        }

        let mut outcome = BatchOutcome::default();
        for (trip_index, draft) in drafts.into_iter().enumerate() {
            match self.schedule_one(&park, draft, now).await {
                Ok(trip) => outcome.created_trips.push(trip),
                Err(e) if e.is_infrastructure() => return Err(e),
                Err(e) => outcome.errors.push(TripRejection {
                    trip_index,
                    error: e.to_string(),
                }),
            }
        }
        Ok(outcome)
    }

    async fn schedule_one(&self, park: &Park, draft: TripDraft, now: DateTime<Utc>) -> BookingResult<Trip> {
        let bus = self.bus(draft.bus_id).await?;
        if bus.park_id != park.id {
            return Err(BookingError::validation("Bus does not belong to this park"));
        }
        let route = self
            .catalog
            .route(draft.route_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("route {}", draft.route_id)))?;
        if route.origin_park_id != park.id {
            return Err(BookingError::validation("Route does not start at this park"));
        }
        if draft.seat_price <= 0 {
            return Err(PricingError::InvalidSeatPrice(draft.seat_price).into());
        }
        if draft.departure_time <= now {
            return Err(BookingError::validation("Departure time must be in the future"));
        }

        let trip = Trip::schedule(&route, &bus, draft.departure_time, draft.seat_price);
        match self.store.schedule_trip(trip, self.rules.conflict_window).await? {
            ScheduleOutcome::Scheduled(trip) => {
                info!(trip_id = %trip.id, bus = %bus.number_plate, departure = %trip.departure_time, "Trip scheduled");
                Ok(trip)
            }
            ScheduleOutcome::Conflict(existing) => Err(BookingError::ScheduleConflict {
                number_plate: bus.number_plate,
                departure: existing.departure_time,
            }),
        }
    }

    /// Change departure, price and/or vehicle. Existing bookings keep the price they were sold at.
    pub async fn update_trip(&self, actor: &Actor, trip_id: Uuid, patch: TripPatch, now: DateTime<Utc>) -> BookingResult<Trip> {
        let trip = self.trip(trip_id).await?;
        let park = managing_park(self.catalog.as_ref(), &trip).await?;
        actor.ensure_manages_park(park.admin_id)?;

        if let Some(price) = patch.seat_price {
            if price <= 0 {
                return Err(PricingError::InvalidSeatPrice(price).into());
            }
        }
        if patch.departure_time.is_some_and(|departure| departure <= now) {
            return Err(BookingError::validation("Departure time must be in the future"));
        }

        let new_bus = match patch.bus_id {
            Some(bus_id) if bus_id != trip.bus_id => {
                let bus = self.bus(bus_id).await?;
                if bus.park_id != park.id {
                    return Err(BookingError::validation("Bus does not belong to this park"));
                }
                Some(bus)
            }
            _ => None,
        };

        let mut lock = self.store.lock_trip(trip_id).await?;
        if patch.departure_time.is_some() || new_bus.is_some() {
            let bus = match &new_bus {
                Some(bus) => bus.clone(),
                None => self.bus(lock.ledger().trip().bus_id).await?,
            };
            let departure = patch.departure_time.unwrap_or(lock.ledger().trip().departure_time);
            // the bus stays locked until commit
            let same_day = lock.lock_bus_schedule(bus.id, departure.date_naive()).await?;
            if let Some(existing) =
                schedule::conflicting_trip(&same_day, bus.id, departure, self.rules.conflict_window, Some(trip_id))
            {
                return Err(BookingError::ScheduleConflict {
                    number_plate: bus.number_plate,
                    departure: existing.departure_time,
                });
            }
        }

        let ledger = lock.ledger_mut();
        if let Some(departure) = patch.departure_time {
            ledger.reschedule(departure);
        }
        if let Some(price) = patch.seat_price {
            ledger.reprice(price);
        }
        if let Some(bus) = &new_bus {
            ledger.reassign_bus(bus.id, bus.total_seats)?;
        }
        let updated = ledger.trip().clone();
        lock.commit().await?;

        info!(trip_id = %updated.id, "Trip updated");
        Ok(updated)
    }

    /// Remove a trip that no longer has pending or confirmed bookings.
    pub async fn delete_trip(&self, actor: &Actor, trip_id: Uuid) -> BookingResult<()> {
        let trip = self.trip(trip_id).await?;
        let park = managing_park(self.catalog.as_ref(), &trip).await?;
        actor.ensure_manages_park(park.admin_id)?;

        let mut lock = self.store.lock_trip(trip_id).await?;
        let active = lock.active_bookings().await?.len();
        if active > 0 {
            return Err(BookingError::TripInUse { active });
        }
        lock.stage_trip_deletion();
        lock.commit().await?;

        info!(trip_id = %trip_id, "Trip deleted");
        Ok(())
    }

    pub async fn park_trips(&self, actor: &Actor, park_id: Uuid, now: DateTime<Utc>) -> BookingResult<Vec<Trip>> {
        let park = self.park(park_id).await?;
        actor.ensure_manages_park(park.admin_id)?;
        Ok(self.store.upcoming_trips_for_park(park.id, now).await?)
    }

    /// Public search. Today's date only lists departures from now on; a date that does
    /// not parse matches nothing.
    pub async fn search(&self, request: &TripSearchRequest, now: DateTime<Utc>) -> BookingResult<Vec<TripSummary>> {
        let Ok(date) = request.travel_date() else {
            return Ok(Vec::new());
        };
        let query = TripQuery {
            origin_park_id: request.origin_park_id,
            destination_park_id: request.destination_park_id,
            date,
            departing_after: date.filter(|d| *d == now.date_naive()).map(|_| now),
        };
        Ok(self.store.search_trips(&query).await?)
    }

    async fn park(&self, park_id: Uuid) -> BookingResult<Park> {
        self.catalog
            .park(park_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("park {}", park_id)))
    }

    async fn bus(&self, bus_id: Uuid) -> BookingResult<Bus> {
        self.catalog
            .bus(bus_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("bus {}", bus_id)))
    }

    async fn trip(&self, trip_id: Uuid) -> BookingResult<Trip> {
        self.store
            .trip(trip_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("trip {}", trip_id)))
    }
}
