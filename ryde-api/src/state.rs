use std::sync::Arc;
use tokio::sync::broadcast;
use ryde_booking::{PaymentOrchestrator, ReservationCoordinator, TripScheduler};
use ryde_shared::events::SeatMapChangedEvent;
use ryde_store::app_config::RateLimitConfig;
use ryde_store::RedisClient;
use crate::metrics::Metrics;
use crate::middleware::resiliency::CircuitBreaker;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ReservationCoordinator>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub scheduler: Arc<TripScheduler>,
    /// `None` disables rate limiting
    pub redis: Option<Arc<RedisClient>>,
    pub seat_tx: broadcast::Sender<SeatMapChangedEvent>,
    pub metrics: Arc<Metrics>,
    pub payment_cb: Arc<CircuitBreaker>,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
    pub success_redirect_url: String,
}
