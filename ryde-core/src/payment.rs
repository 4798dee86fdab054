use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Final result of a payment as far as the booking lifecycle is concerned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Successful,
    Failed,
}

/// Transaction status as reported by the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Success,
    Failed,
    Abandoned,
    Reversed,
    /// Still in flight (pending, ongoing, processing, queued, send_*)
    InFlight,
}

impl ProviderStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "success" => ProviderStatus::Success,
            "failed" => ProviderStatus::Failed,
            "abandoned" => ProviderStatus::Abandoned,
            "reversed" => ProviderStatus::Reversed,
            _ => ProviderStatus::InFlight,
        }
    }

    /// `None` while the provider has not settled the transaction.
    pub fn outcome(self) -> Option<PaymentOutcome> {
        match self {
            ProviderStatus::Success => Some(PaymentOutcome::Successful),
            ProviderStatus::Failed | ProviderStatus::Abandoned | ProviderStatus::Reversed => {
                Some(PaymentOutcome::Failed)
            }
            ProviderStatus::InFlight => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub reference: String,
    /// Minor units (kobo)
    pub amount: i64,
    pub currency: String,
    pub email: String,
    pub callback_url: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub authorization_url: String,
    pub access_code: Option<String>,
    pub reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub reference: String,
    pub status: ProviderStatus,
    pub amount: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Payment provider unreachable: {0}")]
    Network(String),
    #[error("Payment provider rejected the request: {0}")]
    Rejected(String),
    #[error("Unexpected payment provider response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Open a hosted checkout for `request.reference`
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession, ProviderError>;

    /// Ask the provider for the current state of a transaction
    async fn verify(&self, reference: &str) -> Result<Verification, ProviderError>;
}
