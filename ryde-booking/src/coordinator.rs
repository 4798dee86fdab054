use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;
use ryde_catalog::{Availability, LedgerError, Trip};
use ryde_core::identity::Actor;
use ryde_core::payment::PaymentOutcome;
use ryde_shared::events::{
    BookingCancelledEvent, BookingCompletedEvent, BookingConfirmedEvent, BookingCreatedEvent,
};
use crate::error::{BookingError, BookingResult};
use crate::events::{BookingEvent, EventSink, NoopSink};
use crate::machine::{self, BookingRules, PaymentEffect, Settlement, TransitionError};
use crate::models::{Booking, BookingView, PaymentSource};
use crate::reference;
use crate::repository::{managing_park, BookingStore, CatalogRepository};

#[derive(Debug, Clone, Deserialize)]
pub struct NewBooking {
    pub trip_id: Uuid,
    pub seat_numbers: Vec<u32>,
    pub expected_price: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub completed: usize,
    pub expired: usize,
    pub failed: usize,
}

/// Serializes every seat and booking mutation of a trip behind that trip's lock.
pub struct ReservationCoordinator {
    store: Arc<dyn BookingStore>,
    catalog: Arc<dyn CatalogRepository>,
    events: Arc<dyn EventSink>,
    rules: BookingRules,
}

impl ReservationCoordinator {
    pub fn new(store: Arc<dyn BookingStore>, catalog: Arc<dyn CatalogRepository>, rules: BookingRules) -> Self {
        Self {
            store,
            catalog,
            events: Arc::new(NoopSink),
            rules,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn rules(&self) -> &BookingRules {
        &self.rules
    }

    pub fn store(&self) -> &Arc<dyn BookingStore> {
        &self.store
    }

    /// Reserve seats and create a pending booking in one transaction.
    pub async fn create_booking(&self, actor: &Actor, request: NewBooking, now: DateTime<Utc>) -> BookingResult<BookingView> {
        let mut lock = self.store.lock_trip(request.trip_id).await?;
        let trip = lock.ledger().trip().clone();
        if trip.has_departed(now) {
            return Err(BookingError::validation("Trip has already departed"));
        }

        let bus = self
            .catalog
            .bus(trip.bus_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("bus {}", trip.bus_id)))?;
        let payment_reference = reference::unique_reference(lock.as_mut(), trip.departure_time, &bus.number_plate).await?;

        let booking = machine::create(
            lock.ledger_mut(),
            actor.user_id,
            &request.seat_numbers,
            request.expected_price,
            payment_reference,
            now,
        )?;
        let trip = lock.ledger().trip().clone();
        lock.stage_booking(booking.clone());
        lock.commit().await?;

        info!(
            booking_id = %booking.id,
            trip_id = %trip.id,
            reference = %booking.payment_reference,
            seats = ?booking.seat_numbers,
            "Booking created"
        );
        self.events
            .emit(BookingEvent::Created(BookingCreatedEvent {
                booking_id: booking.id,
                trip_id: trip.id,
                user_id: booking.user_id,
                payment_reference: booking.payment_reference.clone(),
                seat_numbers: booking.seat_numbers.clone(),
                price: booking.price,
                timestamp: now.timestamp(),
            }))
            .await;

        Ok(BookingView::project(&booking, &trip, &self.rules.currency))
    }

    /// Apply a provider-reported result to the booking carrying `reference`.
    /// The booking is settled against `now` first, so a result for a lapsed hold or a
    /// departed trip only persists the expiry. Duplicates and late results are absorbed as
    /// [`PaymentEffect::Unchanged`].
    pub async fn apply_payment_result(
        &self,
        reference: &str,
        outcome: PaymentOutcome,
        source: PaymentSource,
        now: DateTime<Utc>,
    ) -> BookingResult<(Booking, PaymentEffect)> {
        let found = self
            .store
            .booking_by_reference(reference)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("booking with reference {}", reference)))?;
        self.apply_to(found, outcome, source, now).await
    }

    async fn apply_to(
        &self,
        found: Booking,
        outcome: PaymentOutcome,
        source: PaymentSource,
        now: DateTime<Utc>,
    ) -> BookingResult<(Booking, PaymentEffect)> {
        let mut lock = self.store.lock_trip(found.trip_id).await?;
        let mut booking = lock
            .booking(found.id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("booking {}", found.id)))?;

        // a lapsed hold or a departed trip is settled before the result applies
        let settlement = machine::settle(&mut booking, lock.ledger_mut(), now, self.rules.payment_timeout);
        let effect = machine::apply_payment_result(&mut booking, lock.ledger_mut(), outcome, now);
        if settlement != Settlement::Unchanged {
            lock.stage_booking(booking.clone());
            lock.commit().await?;
            self.announce_settlement(&booking, settlement, now).await;
            return Ok((booking, effect));
        }
        if effect == PaymentEffect::Unchanged {
            info!(
                booking_id = %booking.id,
                reference = %booking.payment_reference,
                source = source.as_str(),
                outcome = ?outcome,
                "Payment result already applied, ignoring"
            );
            return Ok((booking, effect));
        }

        lock.stage_booking(booking.clone());
        lock.commit().await?;

        match effect {
            PaymentEffect::Confirmed => {
                info!(booking_id = %booking.id, reference = %booking.payment_reference, source = source.as_str(), "Booking confirmed");
                self.events
                    .emit(BookingEvent::Confirmed(BookingConfirmedEvent {
                        booking_id: booking.id,
                        trip_id: booking.trip_id,
                        payment_reference: booking.payment_reference.clone(),
                        source: source.as_str().to_string(),
                        timestamp: now.timestamp(),
                    }))
                    .await;
            }
            PaymentEffect::Cancelled { released } => {
                warn!(booking_id = %booking.id, reference = %booking.payment_reference, source = source.as_str(), released, "Payment failed, seats released");
                self.emit_cancelled(&booking, "payment_failed", released, now).await;
            }
            PaymentEffect::Unchanged => {}
        }
        Ok((booking, effect))
    }

    /// Cancellation by the owner or by the admin of the trip's park.
    pub async fn cancel_booking(&self, actor: &Actor, booking_id: Uuid, now: DateTime<Utc>) -> BookingResult<BookingView> {
        let found = self.find(booking_id).await?;
        self.authorize(actor, &found).await?;

        let mut lock = self.store.lock_trip(found.trip_id).await?;
        let mut booking = lock
            .booking(found.id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("booking {}", found.id)))?;

        let released = machine::cancel(&mut booking, lock.ledger_mut(), now, self.rules.cancellation_cutoff)?;
        let trip = lock.ledger().trip().clone();
        lock.stage_booking(booking.clone());
        lock.commit().await?;

        let reason = if actor.owns(booking.user_id) { "cancelled_by_user" } else { "cancelled_by_admin" };
        info!(booking_id = %booking.id, trip_id = %trip.id, released, reason, "Booking cancelled");
        self.emit_cancelled(&booking, reason, released, now).await;

        Ok(BookingView::project(&booking, &trip, &self.rules.currency))
    }

    /// Manual reconciliation by the managing park admin. A result that changes nothing is
    /// reported as [`TransitionError::AlreadyFinalized`].
    pub async fn admin_update_payment(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        outcome: PaymentOutcome,
        now: DateTime<Utc>,
    ) -> BookingResult<BookingView> {
        let found = self.find(booking_id).await?;
        let trip = self.trip(found.trip_id).await?;
        let park = managing_park(self.catalog.as_ref(), &trip).await?;
        actor.ensure_manages_park(park.admin_id)?;

        let (booking, effect) = self.apply_to(found, outcome, PaymentSource::Admin, now).await?;
        if effect == PaymentEffect::Unchanged {
            return Err(TransitionError::AlreadyFinalized.into());
        }
        self.view(&booking).await
    }

    /// Owner-scoped read with the derived status persisted.
    pub async fn booking_for(&self, actor: &Actor, booking_id: Uuid, now: DateTime<Utc>) -> BookingResult<BookingView> {
        let booking = self.owned_booking(actor, booking_id, now).await?;
        self.view(&booking).await
    }

    pub async fn booking_by_reference_for(&self, actor: &Actor, reference: &str, now: DateTime<Utc>) -> BookingResult<BookingView> {
        let booking = self
            .store
            .booking_by_reference(reference)
            .await?
            .ok_or_else(|| BookingError::not_found("booking"))?;
        actor.ensure_owner(booking.user_id, "booking")?;
        let (booking, trip, _) = self.refresh(booking, now).await?;
        Ok(BookingView::project(&booking, &trip, &self.rules.currency))
    }

    pub async fn bookings_for(&self, actor: &Actor, now: DateTime<Utc>) -> BookingResult<Vec<BookingView>> {
        let bookings = self.store.bookings_for_user(actor.user_id).await?;
        let mut views = Vec::with_capacity(bookings.len());
        for booking in bookings {
            let (booking, trip, _) = self.refresh(booking, now).await?;
            views.push(BookingView::project(&booking, &trip, &self.rules.currency));
        }
        Ok(views)
    }

    /// The caller's booking, refreshed. Foreign bookings look missing.
    pub async fn owned_booking(&self, actor: &Actor, booking_id: Uuid, now: DateTime<Utc>) -> BookingResult<Booking> {
        let booking = self.find(booking_id).await?;
        actor.ensure_owner(booking.user_id, "booking")?;
        let (booking, _, _) = self.refresh(booking, now).await?;
        Ok(booking)
    }

    pub async fn view(&self, booking: &Booking) -> BookingResult<BookingView> {
        let trip = self.trip(booking.trip_id).await?;
        Ok(BookingView::project(booking, &trip, &self.rules.currency))
    }

    pub async fn availability(&self, trip_id: Uuid) -> BookingResult<Availability> {
        let ledger = self
            .store
            .seat_map(trip_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("trip {}", trip_id)))?;
        Ok(ledger.availability())
    }

    /// Persist the status derived at `now`, if it differs from the stored one.
    pub async fn refresh(&self, booking: Booking, now: DateTime<Utc>) -> BookingResult<(Booking, Trip, Settlement)> {
        let trip = self.trip(booking.trip_id).await?;
        let derived = machine::derive_status(&booking, trip.departure_time, now, self.rules.payment_timeout);
        if derived == booking.status {
            return Ok((booking, trip, Settlement::Unchanged));
        }

        let mut lock = self.store.lock_trip(booking.trip_id).await?;
        let mut current = lock
            .booking(booking.id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("booking {}", booking.id)))?;
        let settlement = machine::settle(&mut current, lock.ledger_mut(), now, self.rules.payment_timeout);
        let trip = lock.ledger().trip().clone();
        if settlement == Settlement::Unchanged {
            return Ok((current, trip, settlement));
        }

        lock.stage_booking(current.clone());
        lock.commit().await?;

        self.announce_settlement(&current, settlement, now).await;
        Ok((current, trip, settlement))
    }

    async fn announce_settlement(&self, booking: &Booking, settlement: Settlement, now: DateTime<Utc>) {
        match settlement {
            Settlement::Completed => {
                info!(booking_id = %booking.id, trip_id = %booking.trip_id, "Booking completed");
                self.events
                    .emit(BookingEvent::Completed(BookingCompletedEvent {
                        booking_id: booking.id,
                        trip_id: booking.trip_id,
                        timestamp: now.timestamp(),
                    }))
                    .await;
            }
            Settlement::Expired { released } => {
                warn!(booking_id = %booking.id, trip_id = %booking.trip_id, released, "Unpaid booking expired, seats released");
                self.emit_cancelled(booking, "payment_timeout", released, now).await;
            }
            Settlement::Unchanged => {}
        }
    }

    /// Before handing a booking to the provider, make sure it still holds every seat it
    /// was created with. A booking that lost seats is cancelled and the rest released.
    pub async fn ensure_hold(&self, booking: &Booking, now: DateTime<Utc>) -> BookingResult<Booking> {
        let mut lock = self.store.lock_trip(booking.trip_id).await?;
        let mut current = lock
            .booking(booking.id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("booking {}", booking.id)))?;

        if !current.is_awaiting_payment() {
            return Err(TransitionError::NotPending.into());
        }
        if lock.ledger().holds(current.id, &current.seat_numbers) {
            return Ok(current);
        }

        let held = lock.ledger().seats_of(current.id);
        let conflicting: Vec<u32> = current.seat_numbers.iter().copied().filter(|s| !held.contains(s)).collect();
        let effect = machine::apply_payment_result(&mut current, lock.ledger_mut(), PaymentOutcome::Failed, now);
        lock.stage_booking(current.clone());
        lock.commit().await?;

        if let PaymentEffect::Cancelled { released } = effect {
            warn!(booking_id = %current.id, conflicting = ?conflicting, released, "Booking lost its seats before payment");
            self.emit_cancelled(&current, "seats_unavailable", released, now).await;
        }
        Err(LedgerError::SeatsUnavailable { conflicting }.into())
    }

    /// Settle every booking whose stored status is behind the clock.
    pub async fn sweep(&self, now: DateTime<Utc>) -> BookingResult<SweepReport> {
        let stale = self.store.stale_bookings(now, self.rules.payment_timeout).await?;
        let mut report = SweepReport::default();
        for booking in stale {
            let booking_id = booking.id;
            match self.refresh(booking, now).await {
                Ok((_, _, Settlement::Completed)) => report.completed += 1,
                Ok((_, _, Settlement::Expired { .. })) => report.expired += 1,
                Ok((_, _, Settlement::Unchanged)) => {}
                Err(e) => {
                    error!(booking_id = %booking_id, error = %e, "Failed to settle booking");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    async fn find(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.store
            .booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("booking {}", booking_id)))
    }

    async fn trip(&self, trip_id: Uuid) -> BookingResult<Trip> {
        self.store
            .trip(trip_id)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("trip {}", trip_id)))
    }

    /// Owner, or park admin of the trip's origin park. Passengers never learn that a
    /// foreign booking exists.
    async fn authorize(&self, actor: &Actor, booking: &Booking) -> BookingResult<()> {
        if actor.owns(booking.user_id) {
            return Ok(());
        }
        if !actor.is_park_admin() {
            return Err(BookingError::not_found(format!("booking {}", booking.id)));
        }
        let trip = self.trip(booking.trip_id).await?;
        let park = managing_park(self.catalog.as_ref(), &trip).await?;
        actor.ensure_manages_park(park.admin_id)?;
        Ok(())
    }

    async fn emit_cancelled(&self, booking: &Booking, reason: &str, released: u32, now: DateTime<Utc>) {
        self.events
            .emit(BookingEvent::Cancelled(BookingCancelledEvent {
                booking_id: booking.id,
                trip_id: booking.trip_id,
                reason: reason.to_string(),
                seats_released: released,
                timestamp: now.timestamp(),
            }))
            .await;
    }
}
