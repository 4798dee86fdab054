use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha512;
use tracing::{error, info, warn};
use uuid::Uuid;
use ryde_core::identity::Actor;
use ryde_core::payment::{
    CheckoutRequest, CheckoutSession, PaymentOutcome, PaymentProvider, ProviderError, ProviderStatus, Verification,
};
use crate::coordinator::ReservationCoordinator;
use crate::error::{BookingError, BookingResult};
use crate::machine::{PaymentEffect, TransitionError};
use crate::models::{Booking, BookingView, PaymentSource};

/// hex(HMAC-SHA512(secret, body)), the form the provider signs webhooks with.
pub fn sign(secret: &str, body: &[u8]) -> String {
    match <Hmac<Sha512> as Mac>::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

/// Constant-time check of a webhook signature. An empty secret accepts nothing.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        return false;
    }
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = <Hmac<Sha512> as Mac>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    event: String,
    data: WebhookData,
}

#[derive(Debug, Deserialize)]
struct WebhookData {
    reference: String,
    #[serde(default)]
    amount: Option<i64>,
}

#[derive(Debug)]
pub enum WebhookOutcome {
    Applied(Booking, PaymentEffect),
    Ignored(String),
}

/// Drives the external payment lifecycle and feeds its results back into the coordinator.
pub struct PaymentOrchestrator {
    provider: Arc<dyn PaymentProvider>,
    coordinator: Arc<ReservationCoordinator>,
    webhook_secret: String,
    callback_url: String,
}

impl PaymentOrchestrator {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        coordinator: Arc<ReservationCoordinator>,
        webhook_secret: impl Into<String>,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            coordinator,
            webhook_secret: webhook_secret.into(),
            callback_url: callback_url.into(),
        }
    }

    /// Open a checkout for the caller's unpaid booking.
    ///
    /// Seats are re-checked under the trip lock first; the provider is called only after
    /// the lock is released. A provider failure cancels the booking and frees its seats.
    pub async fn initialize(&self, actor: &Actor, booking_id: Uuid, now: DateTime<Utc>) -> BookingResult<CheckoutSession> {
        let booking = self.coordinator.owned_booking(actor, booking_id, now).await?;
        if !booking.is_awaiting_payment() {
            return Err(TransitionError::NotPending.into());
        }
        let booking = self.coordinator.ensure_hold(&booking, now).await?;

        let request = CheckoutRequest {
            reference: booking.payment_reference.clone(),
            amount: booking.price,
            currency: self.coordinator.rules().currency.clone(),
            email: actor.email.expose().clone(),
            callback_url: self.callback_url.clone(),
            metadata: serde_json::json!({
                "booking_id": booking.id,
                "user_id": booking.user_id,
            }),
        };

        match self.provider.initialize(&request).await {
            Ok(session) => {
                info!(booking_id = %booking.id, reference = %session.reference, "Checkout initialized");
                Ok(session)
            }
            Err(e) => {
                error!(booking_id = %booking.id, reference = %booking.payment_reference, error = %e, "Checkout initialization failed");
                self.compensate(&booking.payment_reference, PaymentSource::Initialize, now).await;
                Err(e.into())
            }
        }
    }

    /// Browser return from the hosted checkout.
    ///
    /// A verification that cannot reach the provider leaves the booking pending for the
    /// webhook or a later poll to settle.
    pub async fn handle_callback(&self, reference: &str, now: DateTime<Utc>) -> BookingResult<(Booking, PaymentEffect)> {
        let booking = self.find_by_reference(reference).await?;
        match self.provider.verify(reference).await {
            Ok(verification) => self.reconcile(booking, verification, PaymentSource::Callback, now).await,
            Err(e) => {
                error!(reference, booking_id = %booking.id, error = %e, "Payment verification failed during callback, booking left pending");
                Err(e.into())
            }
        }
    }

    /// Signed server-to-server notification.
    pub async fn handle_webhook(&self, body: &[u8], signature: Option<&str>, now: DateTime<Utc>) -> BookingResult<WebhookOutcome> {
        let signed = signature.is_some_and(|sig| verify_signature(&self.webhook_secret, body, sig));
        if !signed {
            warn!("Rejected webhook with missing or invalid signature");
            return Err(BookingError::InvalidSignature);
        }

        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| BookingError::validation(format!("malformed webhook payload: {}", e)))?;
        let outcome = match payload.event.as_str() {
            "charge.success" => PaymentOutcome::Successful,
            "charge.failed" => PaymentOutcome::Failed,
            other => {
                info!(event = other, reference = %payload.data.reference, "Ignoring webhook event");
                return Ok(WebhookOutcome::Ignored(other.to_string()));
            }
        };

        let booking = self.find_by_reference(&payload.data.reference).await?;
        let status = match outcome {
            PaymentOutcome::Successful => ProviderStatus::Success,
            PaymentOutcome::Failed => ProviderStatus::Failed,
        };
        let verification = Verification {
            reference: payload.data.reference,
            status,
            amount: payload.data.amount,
        };
        let (booking, effect) = self.reconcile(booking, verification, PaymentSource::Webhook, now).await?;
        Ok(WebhookOutcome::Applied(booking, effect))
    }

    /// Manual status poll by the booking's owner. Transport failures are reported, not compensated.
    pub async fn verify_payment(&self, actor: &Actor, reference: &str, now: DateTime<Utc>) -> BookingResult<BookingView> {
        let booking = self.find_by_reference(reference).await?;
        actor.ensure_owner(booking.user_id, "booking")?;

        let verification = self.provider.verify(reference).await?;
        let (booking, _) = self.reconcile(booking, verification, PaymentSource::Poll, now).await?;
        let (booking, trip, _) = self.coordinator.refresh(booking, now).await?;
        Ok(BookingView::project(&booking, &trip, &self.coordinator.rules().currency))
    }

    async fn reconcile(
        &self,
        booking: Booking,
        verification: Verification,
        source: PaymentSource,
        now: DateTime<Utc>,
    ) -> BookingResult<(Booking, PaymentEffect)> {
        let outcome = match verification.status.outcome() {
            None => {
                info!(reference = %verification.reference, source = source.as_str(), "Payment still in flight");
                return Ok((booking, PaymentEffect::Unchanged));
            }
            Some(PaymentOutcome::Successful) if verification.amount.is_some_and(|paid| paid != booking.price) => {
                warn!(
                    reference = %verification.reference,
                    expected = booking.price,
                    paid = ?verification.amount,
                    "Paid amount does not match booking price, treating as failed"
                );
                PaymentOutcome::Failed
            }
            Some(outcome) => outcome,
        };
        self.coordinator
            .apply_payment_result(&booking.payment_reference, outcome, source, now)
            .await
    }

    async fn compensate(&self, reference: &str, source: PaymentSource, now: DateTime<Utc>) {
        if let Err(e) = self
            .coordinator
            .apply_payment_result(reference, PaymentOutcome::Failed, source, now)
            .await
        {
            error!(reference, error = %e, "Compensating release failed");
        }
    }

    async fn find_by_reference(&self, reference: &str) -> BookingResult<Booking> {
        self.coordinator
            .store()
            .booking_by_reference(reference)
            .await?
            .ok_or_else(|| BookingError::not_found(format!("booking with reference {}", reference)))
    }
}

enum Scripted {
    Status(ProviderStatus, Option<i64>),
    Unreachable,
}

/// Scripted provider for tests and local runs without provider credentials.
///
/// Unknown references verify as still in flight.
#[derive(Default)]
pub struct MockPaymentProvider {
    scripted: Mutex<HashMap<String, Scripted>>,
    initialized: Mutex<Vec<CheckoutRequest>>,
    reject_initialize: Mutex<bool>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn settle(&self, reference: &str, status: ProviderStatus, amount: Option<i64>) {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.insert(reference.to_string(), Scripted::Status(status, amount));
        }
    }

    pub fn make_unreachable(&self, reference: &str) {
        if let Ok(mut scripted) = self.scripted.lock() {
            scripted.insert(reference.to_string(), Scripted::Unreachable);
        }
    }

    pub fn reject_initialize(&self, reject: bool) {
        if let Ok(mut flag) = self.reject_initialize.lock() {
            *flag = reject;
        }
    }

    pub fn initialized(&self) -> Vec<CheckoutRequest> {
        self.initialized.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession, ProviderError> {
        if self.reject_initialize.lock().map(|flag| *flag).unwrap_or(false) {
            return Err(ProviderError::Rejected("mock checkout declined".to_string()));
        }
        if let Ok(mut initialized) = self.initialized.lock() {
            initialized.push(request.clone());
        }
        Ok(CheckoutSession {
            authorization_url: format!("https://checkout.mock/{}", request.reference),
            access_code: Some(format!("mock_{}", Uuid::new_v4().simple())),
            reference: request.reference.clone(),
        })
    }

    async fn verify(&self, reference: &str) -> Result<Verification, ProviderError> {
        let scripted = self
            .scripted
            .lock()
            .map_err(|_| ProviderError::Network("mock poisoned".to_string()))?;
        match scripted.get(reference) {
            Some(Scripted::Unreachable) => Err(ProviderError::Network("connection reset".to_string())),
            Some(Scripted::Status(status, amount)) => Ok(Verification {
                reference: reference.to_string(),
                status: *status,
                amount: *amount,
            }),
            None => Ok(Verification {
                reference: reference.to_string(),
                status: ProviderStatus::InFlight,
                amount: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"event":"charge.success","data":{"reference":"REF-1"}}"#;
        let signature = sign("sk_test_secret", body);

        assert_eq!(signature.len(), 128);
        assert!(verify_signature("sk_test_secret", body, &signature));
        assert!(verify_signature("sk_test_secret", body, &signature.to_uppercase()));
        assert!(!verify_signature("other_secret", body, &signature));
        assert!(!verify_signature("sk_test_secret", b"tampered", &signature));
        assert!(!verify_signature("sk_test_secret", body, "not-hex"));
        assert!(!verify_signature("", body, &sign("", body)));
    }

    #[tokio::test]
    async fn test_mock_provider_scripts() {
        let mock = MockPaymentProvider::new();
        assert_eq!(mock.verify("REF-X").await.unwrap().status, ProviderStatus::InFlight);

        mock.settle("REF-X", ProviderStatus::Success, Some(100));
        assert_eq!(mock.verify("REF-X").await.unwrap().amount, Some(100));

        mock.make_unreachable("REF-X");
        assert!(matches!(mock.verify("REF-X").await, Err(ProviderError::Network(_))));
    }
}
