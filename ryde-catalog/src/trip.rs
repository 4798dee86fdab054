use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// A bus park (terminal). `admin_id` is the park admin allowed to schedule its trips.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Park {
    pub id: Uuid,
    pub name: String,
    pub admin_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bus {
    pub id: Uuid,
    pub park_id: Uuid,
    pub number_plate: String,
    pub total_seats: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Route {
    pub id: Uuid,
    pub origin_park_id: Uuid,
    pub destination_park_id: Uuid,
    pub distance_km: f64,
}

/// One scheduled departure of a bus on a route.
///
/// `available_seats` is owned by the ledger and only changes under the trip lock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trip {
    pub id: Uuid,
    pub route_id: Uuid,
    pub bus_id: Uuid,
    pub departure_time: DateTime<Utc>,
    /// Minor units per seat
    pub seat_price: i64,
    pub total_seats: u32,
    pub available_seats: u32,
    pub created_at: DateTime<Utc>,
}

impl Trip {
    /// A freshly scheduled trip starts with every seat of the bus free.
    pub fn schedule(route: &Route, bus: &Bus, departure_time: DateTime<Utc>, seat_price: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            route_id: route.id,
            bus_id: bus.id,
            departure_time,
            seat_price,
            total_seats: bus.total_seats,
            available_seats: bus.total_seats,
            created_at: Utc::now(),
        }
    }

    pub fn has_departed(&self, now: DateTime<Utc>) -> bool {
        self.departure_time <= now
    }

    pub fn occupied_seats(&self) -> u32 {
        self.total_seats.saturating_sub(self.available_seats)
    }
}
