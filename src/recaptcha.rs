//! Google reCAPTCHA verification for the login form.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{AppError, AppResult};

const VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

pub async fn verify(
    http: &reqwest::Client,
    secret: &SecretString,
    token: Option<&str>,
) -> AppResult<()> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::BadRequest("reCAPTCHA token is required".into()))?;

    let response = http
        .post(VERIFY_URL)
        .form(&[("secret", secret.expose_secret()), ("response", token)])
        .send()
        .await
        .map_err(|e| AppError::Upstream(format!("reCAPTCHA verification failed: {e}")))?
        .json::<VerifyResponse>()
        .await
        .map_err(|e| AppError::Upstream(format!("reCAPTCHA verification failed: {e}")))?;

    if response.success {
        Ok(())
    } else {
        tracing::info!(errors = ?response.error_codes, "reCAPTCHA rejected");
        Err(AppError::BadRequest("reCAPTCHA verification failed".into()))
    }
}
