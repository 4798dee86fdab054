use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use anyhow::Context;
use ryde_api::{
    app,
    events::ApiEventSink,
    metrics::Metrics,
    middleware::CircuitBreaker,
    state::{AppState, AuthConfig},
    worker::start_expiry_worker,
};
use ryde_booking::{BookingStore, CatalogRepository, PaymentOrchestrator, ReservationCoordinator, TripScheduler};
use ryde_store::app_config::Config;
use ryde_store::{DbClient, EventProducer, PaystackProvider, PgBookingStore, PgCatalogRepository, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ryde_api=debug,ryde_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Ryde API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let business_rules = db
        .fetch_business_rules(config.business_rules.clone())
        .await
        .context("Failed to load business rules")?;
    let rules = business_rules.to_rules();

    let store: Arc<dyn BookingStore> = Arc::new(PgBookingStore::new(db.pool.clone()));
    let catalog: Arc<dyn CatalogRepository> = Arc::new(PgCatalogRepository::new(db.pool.clone()));

    // Redis (rate limiting only)
    let redis = if config.redis.enabled {
        Some(Arc::new(RedisClient::new(&config.redis.url).await.context("Failed to connect to Redis")?))
    } else {
        tracing::warn!("Redis disabled, rate limiting is off");
        None
    };

    // Kafka
    let kafka = if config.kafka.enabled {
        Some(Arc::new(EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?))
    } else {
        tracing::warn!("Kafka disabled, lifecycle events are not published");
        None
    };

    // SSE Broadcast Channel
    let (seat_tx, _) = tokio::sync::broadcast::channel(100);
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);

    let sink = Arc::new(ApiEventSink::new(kafka, store.clone(), seat_tx.clone(), metrics.clone()));
    let coordinator = Arc::new(
        ReservationCoordinator::new(store.clone(), catalog.clone(), rules.clone()).with_events(sink),
    );

    if config.paystack.secret_key.is_empty() {
        tracing::warn!("Paystack secret key is empty, webhooks will be rejected");
    }
    let provider = Arc::new(
        PaystackProvider::new(&config.paystack.base_url, &config.paystack.secret_key)
            .context("Failed to build Paystack client")?,
    );
    let orchestrator = Arc::new(PaymentOrchestrator::new(
        provider,
        coordinator.clone(),
        config.paystack.secret_key.clone(),
        config.paystack.callback_url.clone(),
    ));
    let scheduler = Arc::new(TripScheduler::new(store, catalog, rules));

    start_expiry_worker(coordinator.clone(), business_rules.sweep_interval());

    let app_state = AppState {
        coordinator,
        orchestrator,
        scheduler,
        redis,
        seat_tx,
        metrics,
        payment_cb: Arc::new(CircuitBreaker::new("paystack", 5, Duration::from_secs(30))),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
        rate_limit: config.rate_limit.clone(),
        success_redirect_url: config.paystack.success_redirect_url.clone(),
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
