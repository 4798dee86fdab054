pub mod trip;
pub mod pricing;
pub mod ledger;
pub mod schedule;

pub use trip::{Bus, Park, Route, Trip};
pub use pricing::PricingError;
pub use ledger::{Availability, LedgerDiff, LedgerError, SeatAssignment, TripLedger};
