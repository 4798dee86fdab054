use uuid::Uuid;
use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};
use crate::trip::Trip;

/// Binds one seat of one trip to one booking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatAssignment {
    pub trip_id: Uuid,
    pub seat_number: u32,
    pub booking_id: Uuid,
}

/// Read-only seat map snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Availability {
    pub trip_id: Uuid,
    pub total_seats: u32,
    pub available_seats: u32,
    pub taken_seats: Vec<u32>,
    pub free_seats: Vec<u32>,
}

/// Assignment changes since the ledger was loaded, in the order a store must apply them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerDiff {
    pub removed: Vec<u32>,
    pub added: Vec<SeatAssignment>,
}

impl LedgerDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Seat counter and assignment set of a single trip.
///
/// A ledger is loaded while the trip lock is held and mutated in memory; the store
/// persists [`TripLedger::diff`] on commit. Requests are validated completely before
/// anything changes, so a failed reservation leaves the ledger untouched.
#[derive(Debug, Clone)]
pub struct TripLedger {
    trip: Trip,
    assignments: BTreeMap<u32, Uuid>,
    committed: BTreeMap<u32, Uuid>,
}

impl TripLedger {
    pub fn new(trip: Trip, assignments: impl IntoIterator<Item = SeatAssignment>) -> Self {
        let assignments: BTreeMap<u32, Uuid> = assignments
            .into_iter()
            .map(|a| (a.seat_number, a.booking_id))
            .collect();
        Self {
            trip,
            committed: assignments.clone(),
            assignments,
        }
    }

    pub fn trip(&self) -> &Trip {
        &self.trip
    }

    pub fn trip_id(&self) -> Uuid {
        self.trip.id
    }

    pub fn available_seats(&self) -> u32 {
        self.trip.available_seats
    }

    /// Claim `seats` for `booking_id`.
    pub fn reserve(&mut self, booking_id: Uuid, seats: &[u32]) -> Result<(), LedgerError> {
        if seats.is_empty() {
            return Err(LedgerError::EmptyRequest);
        }

        let mut requested = BTreeSet::new();
        for &seat in seats {
            if seat == 0 || seat > self.trip.total_seats {
                return Err(LedgerError::InvalidSeat {
                    seat,
                    total_seats: self.trip.total_seats,
                });
            }
            if !requested.insert(seat) {
                return Err(LedgerError::DuplicateSeat(seat));
            }
        }

        let conflicting: Vec<u32> = requested
            .iter()
            .copied()
            .filter(|seat| self.assignments.contains_key(seat))
            .collect();
        if !conflicting.is_empty() {
            return Err(LedgerError::SeatsUnavailable { conflicting });
        }

        let requested_count = requested.len() as u32;
        if requested_count > self.trip.available_seats {
            return Err(LedgerError::CapacityExceeded {
                requested: requested_count,
                available: self.trip.available_seats,
            });
        }

        for seat in requested {
            self.assignments.insert(seat, booking_id);
        }
        self.trip.available_seats -= requested_count;
        Ok(())
    }

    /// Drop every seat held by `booking_id` and return how many were freed.
    /// Releasing an already released booking frees nothing.
    pub fn release(&mut self, booking_id: Uuid) -> u32 {
        let before = self.assignments.len();
        self.assignments.retain(|_, holder| *holder != booking_id);
        let released = (before - self.assignments.len()) as u32;

        self.trip.available_seats += released;
        debug_assert!(
            self.trip.available_seats <= self.trip.total_seats,
            "seat counter of trip {} above capacity: {} of {}",
            self.trip.id,
            self.trip.available_seats,
            self.trip.total_seats
        );
        released
    }

    pub fn seats_of(&self, booking_id: Uuid) -> Vec<u32> {
        self.assignments
            .iter()
            .filter(|(_, holder)| **holder == booking_id)
            .map(|(seat, _)| *seat)
            .collect()
    }

    /// True if every seat in `seats` is still assigned to `booking_id`.
    pub fn holds(&self, booking_id: Uuid, seats: &[u32]) -> bool {
        seats
            .iter()
            .all(|seat| self.assignments.get(seat) == Some(&booking_id))
    }

    pub fn availability(&self) -> Availability {
        let taken_seats: Vec<u32> = self.assignments.keys().copied().collect();
        let free_seats = (1..=self.trip.total_seats)
            .filter(|seat| !self.assignments.contains_key(seat))
            .collect();
        Availability {
            trip_id: self.trip.id,
            total_seats: self.trip.total_seats,
            available_seats: self.trip.available_seats,
            taken_seats,
            free_seats,
        }
    }

    pub fn assignments(&self) -> impl Iterator<Item = SeatAssignment> + '_ {
        let trip_id = self.trip.id;
        self.assignments.iter().map(move |(seat, booking)| SeatAssignment {
            trip_id,
            seat_number: *seat,
            booking_id: *booking,
        })
    }

    pub fn reschedule(&mut self, departure_time: chrono::DateTime<chrono::Utc>) {
        self.trip.departure_time = departure_time;
    }

    pub fn reprice(&mut self, seat_price: i64) {
        self.trip.seat_price = seat_price;
    }

    /// Move the trip to another vehicle; every occupied seat number must exist on it.
    pub fn reassign_bus(&mut self, bus_id: Uuid, total_seats: u32) -> Result<(), LedgerError> {
        if let Some((&highest, _)) = self.assignments.iter().next_back() {
            if highest > total_seats {
                return Err(LedgerError::BusTooSmall {
                    highest_taken: highest,
                    total_seats,
                });
            }
        }
        self.trip.bus_id = bus_id;
        self.trip.total_seats = total_seats;
        self.trip.available_seats = total_seats - self.assignments.len() as u32;
        Ok(())
    }

    pub fn diff(&self) -> LedgerDiff {
        let removed = self
            .committed
            .iter()
            .filter(|(seat, holder)| self.assignments.get(seat) != Some(holder))
            .map(|(seat, _)| *seat)
            .collect();
        let added = self
            .assignments()
            .filter(|a| self.committed.get(&a.seat_number) != Some(&a.booking_id))
            .collect();
        LedgerDiff { removed, added }
    }

    pub fn into_parts(self) -> (Trip, Vec<SeatAssignment>) {
        let assignments = self.assignments().collect();
        (self.trip, assignments)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("No seats requested")]
    EmptyRequest,

    #[error("Seat {seat} does not exist on this bus (1..={total_seats})")]
    InvalidSeat {
        seat: u32,
        total_seats: u32,
    },

    #[error("Seat {0} requested more than once")]
    DuplicateSeat(u32),

    #[error("Seats {conflicting:?} are no longer available")]
    SeatsUnavailable {
        conflicting: Vec<u32>,
    },

    #[error("Insufficient seats: requested {requested}, available {available}")]
    CapacityExceeded {
        requested: u32,
        available: u32,
    },

    #[error("Bus has {total_seats} seats but seat {highest_taken} is already sold")]
    BusTooSmall {
        highest_taken: u32,
        total_seats: u32,
    },
}
