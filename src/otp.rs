//! One-time passcodes for account verification, login and password reset.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::{entity::users, error::AppError, password};

/// Wrong guesses allowed before a code is burned.
pub const MAX_OTP_ATTEMPTS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Register,
    Login,
    Reset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::Reset => "reset",
        }
    }

    pub fn email_subject(&self) -> &'static str {
        match self {
            Self::Register => "SparkleNest Account Verification Code",
            Self::Login => "SparkleNest Login Verification Code",
            Self::Reset => "SparkleNest Password Reset Verification Code",
        }
    }
}

/// A freshly minted code: the plain value goes to the user, the hash to the database.
#[derive(Debug)]
pub struct IssuedOtp {
    pub code: String,
    pub hash: String,
    pub expires_at: DateTime<Utc>,
}

pub fn generate_code() -> String {
    let code: u32 = rand::rng().random_range(100_000..1_000_000);
    code.to_string()
}

pub fn issue(ttl_minutes: i64) -> Result<IssuedOtp, AppError> {
    let code = generate_code();
    let hash = password::hash_password(&code)?;
    Ok(IssuedOtp {
        code,
        hash,
        expires_at: Utc::now() + Duration::minutes(ttl_minutes),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Valid,
    /// Wrong code; the attempt counter should be bumped.
    Mismatch,
    /// No code outstanding for this purpose, expired, or out of attempts.
    Unavailable,
}

pub fn check(user: &users::Model, purpose: OtpPurpose, code: &str, now: DateTime<Utc>) -> OtpCheck {
    let (Some(hash), Some(stored_purpose), Some(expires_at)) = (
        user.otp_hash.as_deref(),
        user.otp_purpose.as_deref(),
        user.otp_expires_at,
    ) else {
        return OtpCheck::Unavailable;
    };

    if stored_purpose != purpose.as_str()
        || expires_at.with_timezone(&Utc) < now
        || user.otp_attempts >= MAX_OTP_ATTEMPTS
    {
        return OtpCheck::Unavailable;
    }

    let code = code.trim();
    if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
        return OtpCheck::Mismatch;
    }

    if password::verify_password(code, hash) {
        OtpCheck::Valid
    } else {
        OtpCheck::Mismatch
    }
}
