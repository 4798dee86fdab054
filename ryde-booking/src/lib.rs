pub mod error;
pub mod models;
pub mod machine;
pub mod reference;
pub mod repository;
pub mod memory;
pub mod coordinator;
pub mod orchestrator;
pub mod scheduler;
pub mod expiry;
pub mod events;

pub use error::{BookingError, BookingResult};
pub use models::{Booking, BookingStatus, BookingView, PaymentSource, PaymentStatus};
pub use machine::{BookingRules, PaymentEffect, Settlement, TransitionError};
pub use repository::{BookingStore, CatalogRepository, TripLock};
pub use memory::InMemoryStore;
pub use coordinator::{NewBooking, ReservationCoordinator, SweepReport};
pub use orchestrator::PaymentOrchestrator;
pub use events::{BookingEvent, EventSink, NoopSink};
pub use scheduler::TripScheduler;
pub use expiry::ExpirySweeper;
