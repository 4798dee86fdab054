use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use ryde_booking::{BookingError, TransitionError};
use ryde_catalog::{LedgerError, PricingError};
use ryde_core::payment::ProviderError;
use ryde_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String, Option<Value>),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String, Option<Value>),
    #[error("{0}")]
    BadGateway(String),
    #[error("{0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::AuthenticationError(_) => StatusCode::UNAUTHORIZED,
            AppError::AuthorizationError(_) => StatusCode::FORBIDDEN,
            AppError::ValidationError(..) => StatusCode::BAD_REQUEST,
            AppError::NotFoundError(_) => StatusCode::NOT_FOUND,
            AppError::ConflictError(..) => StatusCode::CONFLICT,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_message, details) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                ("Internal Server Error".to_string(), None)
            }
            AppError::BadGateway(msg) => {
                tracing::error!("Payment provider failure: {}", msg);
                (msg, None)
            }
            AppError::ValidationError(msg, details) | AppError::ConflictError(msg, details) => (msg, details),
            AppError::AuthenticationError(msg) | AppError::AuthorizationError(msg) | AppError::NotFoundError(msg) => {
                (msg, None)
            }
        };

        let mut body = json!({ "error": error_message });
        if let Some(details) = details {
            body["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ValidationError(msg) => AppError::ValidationError(msg, None),
            CoreError::NotFound(what) => AppError::NotFoundError(format!("Not found: {}", what)),
            CoreError::Forbidden(msg) => AppError::AuthorizationError(msg),
            CoreError::StorageError(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let message = err.to_string();
        match err {
            BookingError::Core(e) => e.into(),
            BookingError::Ledger(e) => {
                let details = match &e {
                    LedgerError::SeatsUnavailable { conflicting } => Some(json!({ "conflicting_seats": conflicting })),
                    LedgerError::CapacityExceeded { requested, available } => {
                        Some(json!({ "requested": requested, "available_seats": available }))
                    }
                    _ => None,
                };
                AppError::ValidationError(message, details)
            }
            BookingError::Pricing(e) => {
                let details = match &e {
                    PricingError::PriceMismatch { expected, actual } => {
                        Some(json!({ "expected_price": expected, "current_price": actual }))
                    }
                    _ => None,
                };
                AppError::ValidationError(message, details)
            }
            BookingError::Transition(TransitionError::NotPending) => AppError::ValidationError(message, None),
            BookingError::Transition(TransitionError::TooCloseToDeparture { hours_left, cutoff_hours }) => {
                AppError::ConflictError(message, Some(json!({ "hours_to_departure": hours_left, "cutoff_hours": cutoff_hours })))
            }
            BookingError::Transition(_) => AppError::ConflictError(message, None),
            BookingError::Provider(ProviderError::Rejected(_)) => AppError::ValidationError(message, None),
            BookingError::Provider(_) => AppError::BadGateway(message),
            BookingError::ScheduleConflict { .. } | BookingError::TripInUse { .. } => AppError::ConflictError(message, None),
            BookingError::InvalidSignature => AppError::AuthenticationError(message),
        }
    }
}
