use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use ryde_booking::{BookingError, BookingView, NewBooking};
use ryde_catalog::LedgerError;
use ryde_core::identity::Actor;
use ryde_core::payment::PaymentOutcome;
use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking).get(list_bookings))
        .route("/bookings/{id}", get(get_booking).patch(update_booking))
        .route("/bookings/ref/{reference}", get(get_booking_by_reference))
}

#[derive(Debug, Serialize)]
pub struct CreateBookingResponse {
    pub message: String,
    pub booking: BookingView,
    pub payment_url: String,
}

/// POST /bookings
pub async fn create_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<NewBooking>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), AppError> {
    match state.coordinator.create_booking(&actor, req, Utc::now()).await {
        Ok(booking) => Ok((
            StatusCode::CREATED,
            Json(CreateBookingResponse {
                message: "Booking created, proceed to payment".to_string(),
                booking,
                payment_url: "/payment/initialize".to_string(),
            }),
        )),
        Err(e) => {
            if matches!(
                e,
                BookingError::Ledger(LedgerError::SeatsUnavailable { .. } | LedgerError::CapacityExceeded { .. })
            ) {
                state.metrics.seat_conflict();
            }
            Err(e.into())
        }
    }
}

/// GET /bookings
pub async fn list_bookings(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Vec<BookingView>>, AppError> {
    Ok(Json(state.coordinator.bookings_for(&actor, Utc::now()).await?))
}

/// GET /bookings/{id}
pub async fn get_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingView>, AppError> {
    Ok(Json(state.coordinator.booking_for(&actor, id, Utc::now()).await?))
}

/// GET /bookings/ref/{reference}
pub async fn get_booking_by_reference(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(reference): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    Ok(Json(state.coordinator.booking_by_reference_for(&actor, &reference, Utc::now()).await?))
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingRequest {
    pub status: Option<String>,
    pub payment_status: Option<String>,
}

/// PATCH /bookings/{id}
///
/// `{status: "cancelled"}` cancels; `{payment_status: ...}` is manual reconciliation by the park admin.
pub async fn update_booking(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateBookingRequest>,
) -> Result<Json<BookingView>, AppError> {
    let now = Utc::now();
    match (req.status.as_deref(), req.payment_status.as_deref()) {
        (Some("cancelled"), None) => Ok(Json(state.coordinator.cancel_booking(&actor, id, now).await?)),
        (None, Some(payment_status)) => {
            let outcome = match payment_status {
                "successful" => PaymentOutcome::Successful,
                "failed" => PaymentOutcome::Failed,
                other => {
                    return Err(AppError::ValidationError(format!("Unsupported payment_status '{}'", other), None));
                }
            };
            Ok(Json(state.coordinator.admin_update_payment(&actor, id, outcome, now).await?))
        }
        _ => Err(AppError::ValidationError(
            "Provide either status=cancelled or payment_status".to_string(),
            None,
        )),
    }
}
