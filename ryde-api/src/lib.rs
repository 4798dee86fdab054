use std::net::SocketAddr;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{Method, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use ryde_store::redis_repo::rate_limit_key;

pub mod bookings;
pub mod error;
pub mod events;
pub mod metrics;
pub mod middleware;
pub mod payments;
pub mod state;
pub mod trips;
pub mod webhooks;
pub mod worker;

pub use state::AppState;
use middleware::{auth_middleware, circuit_breaker_middleware};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let authenticated = from_fn_with_state(state.clone(), auth_middleware);

    // everything that talks to the payment provider sits behind the breaker
    let payments = payments::public_routes()
        .merge(payments::protected_routes().route_layer(authenticated.clone()))
        .route_layer(from_fn_with_state(state.clone(), circuit_breaker_middleware));

    let protected = Router::new()
        .merge(bookings::routes())
        .merge(trips::protected_routes())
        .route_layer(authenticated);

    Router::new()
        .merge(trips::public_routes())
        .merge(webhooks::routes())
        .route("/metrics", get(metrics::metrics_handler))
        .merge(protected)
        .merge(payments)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}

/// Fixed window per client IP. Fails open when Redis is down, and is a no-op without it.
async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(redis) = state.redis.as_ref() else {
        return next.run(req).await;
    };

    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let window = state.rate_limit.window_seconds;
    let key = rate_limit_key(&client, Utc::now().timestamp(), window);

    match redis.check_rate_limit(&key, state.rate_limit.requests, window).await {
        Ok(true) => next.run(req).await,
        Ok(false) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Rate limit exceeded" })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Rate limiter unavailable, letting request through");
            next.run(req).await
        }
    }
}
