use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use ryde_booking::{BookingStatus, BookingView, PaymentEffect};
use ryde_core::identity::Actor;
use crate::error::AppError;
use crate::state::AppState;

pub fn public_routes() -> Router<AppState> {
    Router::new().route("/payment/callback", get(payment_callback))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/payment/initialize", post(initialize_payment))
        .route("/payment/verify/{reference}", get(verify_payment))
}

pub fn effect_label(effect: &PaymentEffect) -> &'static str {
    match effect {
        PaymentEffect::Confirmed => "confirmed",
        PaymentEffect::Cancelled { .. } => "cancelled",
        PaymentEffect::Unchanged => "unchanged",
    }
}

#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    pub booking_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct InitializePaymentResponse {
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub reference: String,
}

/// POST /payment/initialize
pub async fn initialize_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(req): Json<InitializePaymentRequest>,
) -> Result<Json<InitializePaymentResponse>, AppError> {
    let session = state.orchestrator.initialize(&actor, req.booking_id, Utc::now()).await?;
    Ok(Json(InitializePaymentResponse {
        authorization_url: session.authorization_url,
        access_code: session.access_code,
        reference: session.reference,
    }))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub reference: Option<String>,
    /// Paystack sends both
    pub trxref: Option<String>,
}

#[derive(Debug, Serialize)]
struct CallbackFailure {
    error: String,
    booking: BookingView,
}

/// GET /payment/callback?reference=
///
/// Redirects to the success page once the booking is confirmed.
pub async fn payment_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    let reference = query
        .reference
        .or(query.trxref)
        .ok_or_else(|| AppError::ValidationError("Missing payment reference".to_string(), None))?;

    let (booking, effect) = state.orchestrator.handle_callback(&reference, Utc::now()).await?;
    state.metrics.payment_result("callback", effect_label(&effect));

    if booking.status == BookingStatus::Confirmed {
        return Ok(Redirect::to(&state.success_redirect_url).into_response());
    }

    let view = state.coordinator.view(&booking).await?;
    Ok((
        StatusCode::BAD_REQUEST,
        Json(CallbackFailure {
            error: "Payment was not successful".to_string(),
            booking: view,
        }),
    )
        .into_response())
}

/// GET /payment/verify/{reference}
pub async fn verify_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(reference): Path<String>,
) -> Result<Json<BookingView>, AppError> {
    Ok(Json(state.orchestrator.verify_payment(&actor, &reference, Utc::now()).await?))
}
