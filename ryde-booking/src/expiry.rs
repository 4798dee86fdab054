use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tracing::{error, info};
use crate::coordinator::{ReservationCoordinator, SweepReport};
use crate::error::BookingResult;

/// Periodically settles bookings nobody is reading: expires unpaid ones and completes
/// departed ones.
pub struct ExpirySweeper {
    coordinator: Arc<ReservationCoordinator>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(coordinator: Arc<ReservationCoordinator>, interval: Duration) -> Self {
        Self { coordinator, interval }
    }

    pub async fn run_once(&self) -> BookingResult<SweepReport> {
        self.coordinator.sweep(Utc::now()).await
    }

    pub async fn run(self) {
        info!(interval_secs = self.interval.as_secs(), "Expiry sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(report) if report != SweepReport::default() => info!(
                    completed = report.completed,
                    expired = report.expired,
                    failed = report.failed,
                    "Sweep finished"
                ),
                Ok(_) => {}
                Err(e) => error!(error = %e, "Sweep failed"),
            }
        }
    }
}
