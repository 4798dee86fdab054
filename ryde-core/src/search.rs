use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripSearchRequest {
    pub origin_park_id: Option<Uuid>,
    pub destination_park_id: Option<Uuid>,
    /// `YYYY-MM-DD`; kept raw so an unparseable value can yield an empty result
    pub date: Option<String>,
}

impl TripSearchRequest {
    /// `Ok(None)` when no date filter was given, `Err(())` when it does not parse.
    pub fn travel_date(&self) -> Result<Option<NaiveDate>, ()> {
        match &self.date {
            None => Ok(None),
            Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map(Some).map_err(|_| ()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripSummary {
    pub trip_id: Uuid,
    pub route_id: Uuid,
    pub bus_id: Uuid,
    pub origin_park_id: Uuid,
    pub destination_park_id: Uuid,
    pub departure_time: DateTime<Utc>,
    pub seat_price: i64,
    pub total_seats: u32,
    pub available_seats: u32,
}
