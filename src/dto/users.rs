use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::User;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub user_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    /// Required only when reCAPTCHA verification is configured.
    pub recaptcha_token: Option<String>,
}

/// Either a session (`token` + `user`) or a request to finish with an emailed OTP.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub otp_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    pub password_expired: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub otp: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub user_name: Option<String>,
    pub phone: Option<String>,
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PasswordHistoryRequest {
    /// Candidate password to test against the recent history.
    pub password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PasswordHistorySummary {
    pub count: u64,
    pub password_changed_at: DateTime<Utc>,
    pub changed_at: Vec<DateTime<Utc>>,
    pub password_expired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reused: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Acknowledgement {
    pub email: String,
}

/// OpenAPI shape of the profile picture upload.
#[derive(Deserialize, ToSchema)]
pub struct ProfilePictureUpload {
    #[serde(rename = "profilePicture")]
    #[schema(value_type = String, format = Binary)]
    pub profile_picture: Vec<u8>,
}
