//! Paystack transaction API client.

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use ryde_core::payment::{
    CheckoutRequest, CheckoutSession, PaymentProvider, ProviderError, ProviderStatus, Verification,
};

pub const DEFAULT_BASE_URL: &str = "https://api.paystack.co";

pub struct PaystackProvider {
    http: Client,
    base_url: String,
    secret_key: String,
}

impl PaystackProvider {
    pub fn new(base_url: &str, secret_key: &str) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }
}

/// Every Paystack response: `{status, message, data}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: i64,
    currency: &'a str,
    reference: &'a str,
    callback_url: &'a str,
    metadata: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    authorization_url: String,
    access_code: Option<String>,
    reference: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    reference: String,
    amount: Option<i64>,
}

fn parse_initialize(body: &str) -> Result<CheckoutSession, ProviderError> {
    let envelope: Envelope<InitializeData> =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
    match envelope.data {
        Some(data) if envelope.status => Ok(CheckoutSession {
            authorization_url: data.authorization_url,
            access_code: data.access_code,
            reference: data.reference,
        }),
        _ => Err(ProviderError::Rejected(envelope.message)),
    }
}

fn parse_verify(body: &str) -> Result<Verification, ProviderError> {
    let envelope: Envelope<VerifyData> =
        serde_json::from_str(body).map_err(|e| ProviderError::Decode(e.to_string()))?;
    match envelope.data {
        Some(data) if envelope.status => Ok(Verification {
            status: ProviderStatus::parse(&data.status),
            reference: data.reference,
            amount: data.amount,
        }),
        _ => Err(ProviderError::Rejected(envelope.message)),
    }
}

/// 5xx is the provider's problem and may be retried; other failures carry a message for the caller.
async fn read_body(response: Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| ProviderError::Network(e.to_string()))?;
    if status.is_server_error() {
        error!(status = status.as_u16(), "Paystack server error");
        return Err(ProviderError::Network(format!("provider returned {}", status)));
    }
    Ok(body)
}

#[async_trait]
impl PaymentProvider for PaystackProvider {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession, ProviderError> {
        let body = InitializeBody {
            email: &request.email,
            amount: request.amount,
            currency: &request.currency,
            reference: &request.reference,
            callback_url: &request.callback_url,
            metadata: &request.metadata,
        };
        let response = self
            .http
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        debug!(reference = %request.reference, status = response.status().as_u16(), "Paystack initialize");
        parse_initialize(&read_body(response).await?)
    }

    async fn verify(&self, reference: &str) -> Result<Verification, ProviderError> {
        let response = self
            .http
            .get(format!("{}/transaction/verify/{}", self.base_url, reference))
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        debug!(reference, status = response.status().as_u16(), "Paystack verify");
        parse_verify(&read_body(response).await?)
    }
}
