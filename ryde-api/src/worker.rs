use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use ryde_booking::{ExpirySweeper, ReservationCoordinator};

pub fn start_expiry_worker(coordinator: Arc<ReservationCoordinator>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(ExpirySweeper::new(coordinator, interval).run())
}
