use chrono::{DateTime, Utc};
use ryde_catalog::{LedgerError, PricingError};
use ryde_core::payment::ProviderError;
use ryde_core::CoreError;
use crate::machine::TransitionError;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Pricing(#[from] PricingError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Bus {number_plate} already has a trip near {departure}")]
    ScheduleConflict {
        number_plate: String,
        departure: DateTime<Utc>,
    },

    #[error("Trip still has {active} active booking(s)")]
    TripInUse {
        active: usize,
    },

    #[error("Webhook signature missing or invalid")]
    InvalidSignature,
}

impl BookingError {
    pub fn validation(msg: impl Into<String>) -> Self {
        BookingError::Core(CoreError::ValidationError(msg.into()))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        BookingError::Core(CoreError::NotFound(what.into()))
    }

    /// Errors caused by infrastructure rather than by the request itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, BookingError::Core(CoreError::StorageError(_)))
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
