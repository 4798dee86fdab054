use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use ryde_booking::orchestrator::WebhookOutcome;
use crate::error::AppError;
use crate::payments::effect_label;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

pub fn routes() -> Router<AppState> {
    Router::new().route("/webhook/paystack", post(paystack_webhook))
}

/// POST /webhook/paystack
///
/// The signature covers the raw body, so the payload is parsed only after it checks out.
pub async fn paystack_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    match state.orchestrator.handle_webhook(&body, signature, Utc::now()).await? {
        WebhookOutcome::Applied(booking, effect) => {
            state.metrics.payment_result("webhook", effect_label(&effect));
            tracing::info!(booking_id = %booking.id, reference = %booking.payment_reference, effect = effect_label(&effect), "Webhook processed");
            Ok(Json(json!({ "status": "processed", "booking_status": booking.status })))
        }
        WebhookOutcome::Ignored(event) => Ok(Json(json!({ "status": "ignored", "event": event }))),
    }
}
