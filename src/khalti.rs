//! Khalti ePayment v2 client.
//!
//! Two calls are used: `initiate` creates a payment session and returns the
//! hosted payment URL, `lookup` reports the state of a session by `pidx`.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{config::KhaltiConfig, error::AppError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum KhaltiError {
    #[error("{0} environment variable is not set")]
    NotConfigured(&'static str),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Khalti authentication failed. Please check your secret key.")]
    Unauthorized,

    #[error("Khalti API error: {0}")]
    Rejected(String),

    #[error("Khalti API request timed out. Please try again.")]
    Timeout,

    #[error("Cannot connect to Khalti API. Please check your internet connection.")]
    Connect,

    #[error("Khalti API returned {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("Unexpected Khalti response: {0}")]
    Decode(String),
}

impl From<KhaltiError> for AppError {
    fn from(err: KhaltiError) -> Self {
        match err {
            KhaltiError::MissingField(_) => AppError::BadRequest(err.to_string()),
            other => AppError::Upstream(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerInfo {
    pub name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InitiateRequest {
    pub return_url: String,
    pub website_url: String,
    /// Amount in paisa.
    pub amount: i64,
    pub purchase_order_id: String,
    pub purchase_order_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_info: Option<CustomerInfo>,
}

impl InitiateRequest {
    pub fn validate(&self) -> Result<(), KhaltiError> {
        if self.amount <= 0 {
            return Err(KhaltiError::MissingField("amount"));
        }
        let required = [
            ("purchase_order_id", &self.purchase_order_id),
            ("purchase_order_name", &self.purchase_order_name),
            ("return_url", &self.return_url),
            ("website_url", &self.website_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(KhaltiError::MissingField(name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InitiateResponse {
    pub pidx: String,
    pub payment_url: String,
    pub expires_at: Option<String>,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LookupResponse {
    pub pidx: String,
    pub total_amount: i64,
    pub status: String,
    pub transaction_id: Option<String>,
    pub fee: Option<i64>,
    pub refunded: Option<bool>,
}

impl LookupResponse {
    pub fn is_completed(&self) -> bool {
        self.status == "Completed"
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    error_key: Option<String>,
}

#[derive(Clone)]
pub struct KhaltiClient {
    http: Client,
    secret_key: Option<SecretString>,
    gateway_url: Option<String>,
}

impl std::fmt::Debug for KhaltiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KhaltiClient")
            .field("secret_key", &self.secret_key.as_ref().map(|_| "[REDACTED]"))
            .field("gateway_url", &self.gateway_url)
            .finish()
    }
}

impl KhaltiClient {
    pub fn new(config: &KhaltiConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            secret_key: config.secret_key.clone(),
            gateway_url: config
                .gateway_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.secret_key.is_some() && self.gateway_url.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<(String, &SecretString), KhaltiError> {
        let secret = self
            .secret_key
            .as_ref()
            .ok_or(KhaltiError::NotConfigured("KHALTI_SECRET_KEY"))?;
        let base = self
            .gateway_url
            .as_ref()
            .ok_or(KhaltiError::NotConfigured("KHALTI_GATEWAY_URL"))?;
        Ok((format!("{base}{path}"), secret))
    }

    #[tracing::instrument(skip(self, details), fields(purchase_order_id = %details.purchase_order_id, amount = details.amount))]
    pub async fn initiate(&self, details: &InitiateRequest) -> Result<InitiateResponse, KhaltiError> {
        details.validate()?;
        let (url, secret) = self.endpoint("/api/v2/epayment/initiate/")?;
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Key {}", secret.expose_secret()))
            .json(details)
            .send()
            .await
            .map_err(map_transport_error)?;
        let parsed = read_json::<InitiateResponse>(response).await?;
        tracing::info!(pidx = %parsed.pidx, "khalti payment initiated");
        Ok(parsed)
    }

    #[tracing::instrument(skip(self))]
    pub async fn lookup(&self, pidx: &str) -> Result<LookupResponse, KhaltiError> {
        if pidx.trim().is_empty() {
            return Err(KhaltiError::MissingField("pidx"));
        }
        let (url, secret) = self.endpoint("/api/v2/epayment/lookup/")?;
        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Key {}", secret.expose_secret()))
            .json(&serde_json::json!({ "pidx": pidx }))
            .send()
            .await
            .map_err(map_transport_error)?;
        read_json::<LookupResponse>(response).await
    }
}

fn map_transport_error(err: reqwest::Error) -> KhaltiError {
    if err.is_timeout() {
        KhaltiError::Timeout
    } else if err.is_connect() {
        KhaltiError::Connect
    } else {
        KhaltiError::Decode(err.to_string())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, KhaltiError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| KhaltiError::Decode(e.to_string()));
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = %status, body = %body, "khalti request failed");
    match status {
        StatusCode::UNAUTHORIZED => Err(KhaltiError::Unauthorized),
        StatusCode::BAD_REQUEST => {
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.detail.or(b.error_key))
                .unwrap_or_else(|| "Invalid request data".to_string());
            Err(KhaltiError::Rejected(detail))
        }
        _ => Err(KhaltiError::Http { status, body }),
    }
}
