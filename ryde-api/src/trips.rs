use std::convert::Infallible;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, patch},
    Extension, Json, Router,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;
use ryde_booking::scheduler::{BatchOutcome, TripDraft, TripPatch};
use ryde_catalog::{Availability, Trip};
use ryde_core::identity::Actor;
use ryde_core::search::{TripSearchRequest, TripSummary};
use crate::error::AppError;
use crate::state::AppState;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/trips/search", get(search_trips))
        .route("/trips/{id}/seats", get(seat_map))
        .route("/trips/{id}/seats/stream", get(seat_map_stream))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/parks/{park_id}/trips", get(park_trips).post(create_trips))
        .route("/trips/{id}", patch(update_trip).delete(delete_trip))
}

/// GET /trips/search
pub async fn search_trips(
    State(state): State<AppState>,
    Query(req): Query<TripSearchRequest>,
) -> Result<Json<Vec<TripSummary>>, AppError> {
    Ok(Json(state.scheduler.search(&req, Utc::now()).await?))
}

/// GET /trips/{id}/seats
pub async fn seat_map(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Availability>, AppError> {
    Ok(Json(state.coordinator.availability(id).await?))
}

/// GET /trips/{id}/seats/stream
pub async fn seat_map_stream(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.seat_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.trip_id == trip_id => {
                Event::default().event("seat_map").json_data(&event).ok().map(Ok)
            }
            Ok(_) => None,
            Err(e) => {
                // slow subscriber; the next event carries the full map anyway
                tracing::debug!(trip_id = %trip_id, error = %e, "Seat map subscriber lagged");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /parks/{park_id}/trips
pub async fn park_trips(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(park_id): Path<Uuid>,
) -> Result<Json<Vec<Trip>>, AppError> {
    Ok(Json(state.scheduler.park_trips(&actor, park_id, Utc::now()).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateTripsRequest {
    pub trips: Vec<TripDraft>,
}

/// POST /parks/{park_id}/trips
///
/// 201 when every entry was scheduled, 207 when some were, 400 when none were.
pub async fn create_trips(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(park_id): Path<Uuid>,
    Json(req): Json<CreateTripsRequest>,
) -> Result<(StatusCode, Json<BatchOutcome>), AppError> {
    let outcome = state.scheduler.create_trips(&actor, park_id, req.trips, Utc::now()).await?;
    let status = match (outcome.created_trips.is_empty(), outcome.errors.is_empty()) {
        (_, true) => StatusCode::CREATED,
        (false, false) => StatusCode::MULTI_STATUS,
        (true, false) => StatusCode::BAD_REQUEST,
    };
    Ok((status, Json(outcome)))
}

/// PATCH /trips/{id}
pub async fn update_trip(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(patch): Json<TripPatch>,
) -> Result<Json<Trip>, AppError> {
    Ok(Json(state.scheduler.update_trip(&actor, id, patch, Utc::now()).await?))
}

/// DELETE /trips/{id}
pub async fn delete_trip(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.scheduler.delete_trip(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
