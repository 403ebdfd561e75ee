use std::sync::LazyLock;

use chrono::{Duration, Utc};
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::{
    dto::users::{
        Acknowledgement, EmailRequest, LoginRequest, LoginResponse, PasswordHistoryRequest,
        PasswordHistorySummary, RegisterRequest, ResetPasswordRequest, TokenResponse,
        UpdateProfileRequest, VerifyOtpRequest,
    },
    entity::{
        password_history::{self, Entity as PasswordHistory},
        users::{self, Column as UserCol, Entity as Users},
    },
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, issue_token},
    models::User,
    otp::{self, IssuedOtp, OtpCheck, OtpPurpose},
    password::{
        PASSWORD_HISTORY_DEPTH, PASSWORD_MAX_AGE_DAYS, hash_password, matches_any,
        validate_password_policy, verify_password,
    },
    recaptcha,
    response::ApiResponse,
    state::AppState,
    uploads::{self, UploadedImage},
};

/// Consecutive wrong passwords before the account is locked.
pub const MAX_FAILED_LOGINS: i32 = 5;
pub const LOCKOUT_MINUTES: i64 = 15;

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const INVALID_OTP: &str = "Invalid OTP";
const UNAVAILABLE_OTP: &str = "OTP has expired or is no longer valid. Please request a new one.";

static EMAIL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn validate_email(email: &str) -> AppResult<()> {
    let valid = EMAIL_RE.as_ref().is_some_and(|re| re.is_match(email));
    if !valid {
        return Err(AppError::BadRequest("Please enter a valid email address".into()));
    }
    Ok(())
}

fn require(field: &str, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn password_expired(user: &users::Model) -> bool {
    user.password_changed_at.with_timezone(&Utc) + Duration::days(PASSWORD_MAX_AGE_DAYS)
        < Utc::now()
}

async fn find_by_email<C: ConnectionTrait>(db: &C, email: &str) -> AppResult<Option<users::Model>> {
    Ok(Users::find()
        .filter(UserCol::Email.eq(email))
        .one(db)
        .await?)
}

async fn find_account(state: &AppState, user_id: Uuid) -> AppResult<users::Model> {
    Users::find_by_id(user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)
}

async fn record_history<C: ConnectionTrait>(db: &C, user_id: Uuid, hash: String) -> AppResult<()> {
    password_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        password_hash: Set(hash),
        created_at: Set(Utc::now().into()),
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Reject `candidate` when it matches the current password or a recent one.
async fn ensure_not_reused(
    state: &AppState,
    user_id: Uuid,
    current_hash: &str,
    candidate: &str,
) -> AppResult<()> {
    let recent = PasswordHistory::find()
        .filter(password_history::Column::UserId.eq(user_id))
        .order_by_desc(password_history::Column::CreatedAt)
        .limit(PASSWORD_HISTORY_DEPTH)
        .all(&state.orm)
        .await?;

    if verify_password(candidate, current_hash)
        || matches_any(candidate, recent.iter().map(|h| h.password_hash.as_str()))
    {
        return Err(AppError::BadRequest(format!(
            "New password must not match your current password or any of your last {PASSWORD_HISTORY_DEPTH} passwords"
        )));
    }
    Ok(())
}

fn apply_new_password(active: &mut users::ActiveModel, hash: String) {
    active.password_hash = Set(hash);
    active.password_changed_at = Set(Utc::now().into());
    active.failed_login_attempts = Set(0);
    active.locked_until = Set(None);
}

fn set_otp(active: &mut users::ActiveModel, issued: &IssuedOtp, purpose: OtpPurpose) {
    active.otp_hash = Set(Some(issued.hash.clone()));
    active.otp_purpose = Set(Some(purpose.as_str().to_string()));
    active.otp_expires_at = Set(Some(issued.expires_at.into()));
    active.otp_attempts = Set(0);
    active.updated_at = Set(Utc::now().into());
}

async fn store_otp(
    state: &AppState,
    user: users::Model,
    purpose: OtpPurpose,
) -> AppResult<(users::Model, IssuedOtp)> {
    let issued = otp::issue(state.config.otp_ttl_minutes)?;
    let mut active: users::ActiveModel = user.into();
    set_otp(&mut active, &issued, purpose);
    let user = active.update(&state.orm).await?;
    Ok((user, issued))
}

async fn deliver_otp(state: &AppState, email: &str, issued: &IssuedOtp, purpose: OtpPurpose) {
    if let Err(err) = state
        .mailer
        .send_otp(email, &issued.code, purpose, state.config.otp_ttl_minutes)
        .await
    {
        tracing::warn!(error = %err, purpose = purpose.as_str(), "otp email failed");
    }
}

/// Check `code` against the user's outstanding OTP. A wrong code is counted
/// immediately. A correct one yields an unsaved model with the OTP cleared,
/// so the caller commits it together with its own changes.
async fn consume_otp(
    state: &AppState,
    user: users::Model,
    purpose: OtpPurpose,
    code: &str,
) -> AppResult<users::ActiveModel> {
    match otp::check(&user, purpose, code, Utc::now()) {
        OtpCheck::Valid => {
            let mut active: users::ActiveModel = user.into();
            active.otp_hash = Set(None);
            active.otp_purpose = Set(None);
            active.otp_expires_at = Set(None);
            active.otp_attempts = Set(0);
            active.updated_at = Set(Utc::now().into());
            Ok(active)
        }
        OtpCheck::Mismatch => {
            let attempts = user.otp_attempts + 1;
            let mut active: users::ActiveModel = user.into();
            active.otp_attempts = Set(attempts);
            active.update(&state.orm).await?;
            Err(AppError::BadRequest(INVALID_OTP.into()))
        }
        OtpCheck::Unavailable => Err(AppError::BadRequest(UNAVAILABLE_OTP.into())),
    }
}

fn session(state: &AppState, user: users::Model, password_expired: bool) -> AppResult<LoginResponse> {
    let token = issue_token(&state.config.jwt_secret, state.config.jwt_ttl_hours, &user)?;
    Ok(LoginResponse {
        otp_required: false,
        token: Some(token),
        user: Some(user.into()),
        password_expired,
    })
}

pub async fn register(state: &AppState, payload: RegisterRequest) -> AppResult<ApiResponse<User>> {
    let first_name = require("first_name", &payload.first_name)?;
    let last_name = require("last_name", &payload.last_name)?;
    let user_name = require("user_name", &payload.user_name)?;
    let phone = require("phone", &payload.phone)?;
    let email = normalize_email(&payload.email);
    validate_email(&email)?;
    validate_password_policy(&payload.password)?;

    let existing = Users::find()
        .filter(
            sea_orm::Condition::any()
                .add(UserCol::Email.eq(email.as_str()))
                .add(UserCol::UserName.eq(user_name.as_str())),
        )
        .one(&state.orm)
        .await?;
    if let Some(existing) = existing {
        return Err(AppError::Conflict(if existing.email == email {
            "User already exists".into()
        } else {
            "Username is already taken".into()
        }));
    }

    let password_hash = hash_password(&payload.password)?;
    let issued = otp::issue(state.config.otp_ttl_minutes)?;
    let now = Utc::now();

    let txn = state.orm.begin().await?;
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        first_name: Set(first_name),
        last_name: Set(last_name),
        user_name: Set(user_name),
        email: Set(email),
        phone: Set(phone),
        password_hash: Set(password_hash.clone()),
        role: Set("user".into()),
        profile_picture: Set(None),
        is_verified: Set(false),
        otp_hash: Set(Some(issued.hash.clone())),
        otp_purpose: Set(Some(OtpPurpose::Register.as_str().into())),
        otp_expires_at: Set(Some(issued.expires_at.into())),
        otp_attempts: Set(0),
        failed_login_attempts: Set(0),
        locked_until: Set(None),
        password_changed_at: Set(now.into()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;
    record_history(&txn, user.id, password_hash).await?;
    txn.commit().await?;

    deliver_otp(state, &user.email, &issued, OtpPurpose::Register).await;
    tracing::info!(user_id = %user.id, "user registered");

    Ok(ApiResponse::success(
        "User created successfully. Please verify your email with the OTP sent.",
        user.into(),
        None,
    ))
}

pub async fn verify_register_otp(
    state: &AppState,
    payload: VerifyOtpRequest,
) -> AppResult<ApiResponse<User>> {
    let email = normalize_email(&payload.email);
    let user = find_by_email(&state.orm, &email)
        .await?
        .ok_or_else(|| AppError::BadRequest(INVALID_OTP.into()))?;
    if user.is_verified {
        return Err(AppError::BadRequest("Account is already verified".into()));
    }

    let mut active = consume_otp(state, user, OtpPurpose::Register, &payload.otp).await?;
    active.is_verified = Set(true);
    let user = active.update(&state.orm).await?;
    tracing::info!(user_id = %user.id, "account verified");

    Ok(ApiResponse::success(
        "Account verified successfully",
        user.into(),
        None,
    ))
}

/// Count a wrong password and lock the account once the limit is reached.
async fn reject_login(state: &AppState, user: users::Model) -> AppError {
    let attempts = user.failed_login_attempts + 1;
    let user_id = user.id;
    let mut active: users::ActiveModel = user.into();
    let message = if attempts >= MAX_FAILED_LOGINS {
        active.failed_login_attempts = Set(0);
        active.locked_until = Set(Some((Utc::now() + Duration::minutes(LOCKOUT_MINUTES)).into()));
        tracing::warn!(user_id = %user_id, "account locked after repeated failed logins");
        format!("Too many failed login attempts. Account locked for {LOCKOUT_MINUTES} minutes.")
    } else {
        active.failed_login_attempts = Set(attempts);
        INVALID_CREDENTIALS.to_string()
    };

    if let Err(err) = active.update(&state.orm).await {
        return err.into();
    }
    AppError::Unauthorized(message)
}

pub async fn login(state: &AppState, payload: LoginRequest) -> AppResult<ApiResponse<LoginResponse>> {
    let email = normalize_email(&payload.email);
    if email.is_empty() || payload.password.is_empty() {
        return Err(AppError::BadRequest("Please enter all fields".into()));
    }

    if let Some(secret) = &state.config.recaptcha_secret {
        recaptcha::verify(&state.http, secret, payload.recaptcha_token.as_deref()).await?;
    }

    let user = find_by_email(&state.orm, &email)
        .await?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.into()))?;

    let now = Utc::now();
    if let Some(until) = user.locked_until.map(|t| t.with_timezone(&Utc)) {
        if until > now {
            let minutes = ((until - now).num_seconds() + 59) / 60;
            return Err(AppError::TooManyRequests(format!(
                "Account is locked due to too many failed login attempts. Try again in {minutes} minute(s)."
            )));
        }
    }

    if !verify_password(&payload.password, &user.password_hash) {
        return Err(reject_login(state, user).await);
    }
    if !user.is_verified {
        return Err(AppError::Forbidden(
            "Please verify your email before logging in".into(),
        ));
    }

    let expired = password_expired(&user);
    let mut active: users::ActiveModel = user.into();
    active.failed_login_attempts = Set(0);
    active.locked_until = Set(None);

    if state.config.login_otp_enabled {
        let issued = otp::issue(state.config.otp_ttl_minutes)?;
        set_otp(&mut active, &issued, OtpPurpose::Login);
        let user = active.update(&state.orm).await?;
        deliver_otp(state, &user.email, &issued, OtpPurpose::Login).await;

        return Ok(ApiResponse::success(
            "OTP sent to your email. Please verify to complete login.",
            LoginResponse {
                otp_required: true,
                token: None,
                user: None,
                password_expired: expired,
            },
            None,
        ));
    }

    let user = active.update(&state.orm).await?;
    tracing::info!(user_id = %user.id, "user logged in");
    Ok(ApiResponse::success(
        "Login successful",
        session(state, user, expired)?,
        None,
    ))
}

pub async fn verify_login_otp(
    state: &AppState,
    payload: VerifyOtpRequest,
) -> AppResult<ApiResponse<LoginResponse>> {
    let email = normalize_email(&payload.email);
    let user = find_by_email(&state.orm, &email)
        .await?
        .ok_or_else(|| AppError::BadRequest(INVALID_OTP.into()))?;
    let expired = password_expired(&user);

    let active = consume_otp(state, user, OtpPurpose::Login, &payload.otp).await?;
    let user = active.update(&state.orm).await?;
    tracing::info!(user_id = %user.id, "user logged in with otp");

    Ok(ApiResponse::success(
        "Login successful",
        session(state, user, expired)?,
        None,
    ))
}

/// Only an account with a login challenge outstanding gets a new code. The
/// answer is the same either way.
pub async fn resend_login_otp(
    state: &AppState,
    payload: EmailRequest,
) -> AppResult<ApiResponse<Acknowledgement>> {
    let email = normalize_email(&payload.email);
    let pending = find_by_email(&state.orm, &email).await?.filter(|user| {
        user.is_verified && user.otp_purpose.as_deref() == Some(OtpPurpose::Login.as_str())
    });
    if let Some(user) = pending {
        let (user, issued) = store_otp(state, user, OtpPurpose::Login).await?;
        deliver_otp(state, &user.email, &issued, OtpPurpose::Login).await;
    }

    Ok(ApiResponse::success(
        "If a login is pending for this email, a new OTP has been sent",
        Acknowledgement { email },
        None,
    ))
}

pub async fn refresh_token(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<TokenResponse>> {
    let account = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".into()))?;
    let token = issue_token(&state.config.jwt_secret, state.config.jwt_ttl_hours, &account)?;
    Ok(ApiResponse::success("Token generated", TokenResponse { token }, None))
}

pub async fn current_user(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let account = find_account(state, user.user_id).await?;
    Ok(ApiResponse::success("Current user", account.into(), None))
}

pub async fn forgot_password(
    state: &AppState,
    payload: EmailRequest,
) -> AppResult<ApiResponse<Acknowledgement>> {
    let email = normalize_email(&payload.email);
    if email.is_empty() {
        return Err(AppError::BadRequest("Please provide an email".into()));
    }

    if let Some(user) = find_by_email(&state.orm, &email).await? {
        let (user, issued) = store_otp(state, user, OtpPurpose::Reset).await?;
        deliver_otp(state, &user.email, &issued, OtpPurpose::Reset).await;
        tracing::info!(user_id = %user.id, "password reset requested");
    }

    Ok(ApiResponse::success(
        "If an account exists for this email, a password reset code has been sent",
        Acknowledgement { email },
        None,
    ))
}

pub async fn reset_password(
    state: &AppState,
    payload: ResetPasswordRequest,
) -> AppResult<ApiResponse<User>> {
    validate_password_policy(&payload.new_password)?;
    let email = normalize_email(&payload.email);
    let user = find_by_email(&state.orm, &email)
        .await?
        .ok_or_else(|| AppError::BadRequest(INVALID_OTP.into()))?;
    let user_id = user.id;
    let current_hash = user.password_hash.clone();

    // The OTP is only cleared once the new password is accepted.
    let mut active = consume_otp(state, user, OtpPurpose::Reset, &payload.otp).await?;
    ensure_not_reused(state, user_id, &current_hash, &payload.new_password).await?;

    let hash = hash_password(&payload.new_password)?;
    apply_new_password(&mut active, hash.clone());

    let txn = state.orm.begin().await?;
    let user = active.update(&txn).await?;
    record_history(&txn, user.id, hash).await?;
    txn.commit().await?;
    tracing::info!(user_id = %user.id, "password reset");

    Ok(ApiResponse::success("Password reset successfully", user.into(), None))
}

pub async fn upload_profile_picture(
    state: &AppState,
    user: &AuthUser,
    image: UploadedImage,
) -> AppResult<ApiResponse<User>> {
    let account = find_account(state, user.user_id).await?;
    let dir = state.config.profile_dir();
    let stored = uploads::save_image(&dir, &image).await?;
    let previous = account.profile_picture.clone();

    let mut active: users::ActiveModel = account.into();
    active.profile_picture = Set(Some(stored));
    active.updated_at = Set(Utc::now().into());
    let account = active.update(&state.orm).await?;

    if let Some(previous) = previous {
        uploads::remove_file(&dir, &previous).await;
    }

    Ok(ApiResponse::success(
        "Profile picture updated successfully",
        account.into(),
        None,
    ))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    let account = find_account(state, user.user_id).await?;
    let account_id = account.id;
    let current_hash = account.password_hash.clone();
    let current_user_name = account.user_name.clone();
    let mut active: users::ActiveModel = account.into();

    if let Some(first_name) = payload.first_name {
        active.first_name = Set(require("first_name", &first_name)?);
    }
    if let Some(last_name) = payload.last_name {
        active.last_name = Set(require("last_name", &last_name)?);
    }
    if let Some(phone) = payload.phone {
        active.phone = Set(require("phone", &phone)?);
    }
    if let Some(user_name) = payload.user_name {
        let user_name = require("user_name", &user_name)?;
        if user_name != current_user_name {
            let taken = Users::find()
                .filter(UserCol::UserName.eq(user_name.as_str()))
                .filter(UserCol::Id.ne(account_id))
                .count(&state.orm)
                .await?;
            if taken > 0 {
                return Err(AppError::Conflict("Username is already taken".into()));
            }
        }
        active.user_name = Set(user_name);
    }

    let mut new_hash = None;
    if let Some(new_password) = payload.new_password.filter(|p| !p.is_empty()) {
        let current = payload.current_password.as_deref().ok_or_else(|| {
            AppError::BadRequest("Current password is required to set a new password".into())
        })?;
        if !verify_password(current, &current_hash) {
            return Err(AppError::Unauthorized("Current password is incorrect".into()));
        }
        validate_password_policy(&new_password)?;
        ensure_not_reused(state, account_id, &current_hash, &new_password).await?;

        let hash = hash_password(&new_password)?;
        apply_new_password(&mut active, hash.clone());
        new_hash = Some(hash);
    }
    active.updated_at = Set(Utc::now().into());

    let txn = state.orm.begin().await?;
    let account = active.update(&txn).await?;
    if let Some(hash) = new_hash {
        record_history(&txn, account.id, hash).await?;
        tracing::info!(user_id = %account.id, "password changed");
    }
    txn.commit().await?;

    Ok(ApiResponse::success(
        "Profile updated successfully",
        account.into(),
        None,
    ))
}

pub async fn password_history(
    state: &AppState,
    user: &AuthUser,
    payload: PasswordHistoryRequest,
) -> AppResult<ApiResponse<PasswordHistorySummary>> {
    let account = find_account(state, user.user_id).await?;
    let entries = PasswordHistory::find()
        .filter(password_history::Column::UserId.eq(account.id))
        .order_by_desc(password_history::Column::CreatedAt)
        .all(&state.orm)
        .await?;

    let reused = payload
        .password
        .as_deref()
        .filter(|candidate| !candidate.is_empty())
        .map(|candidate| {
            verify_password(candidate, &account.password_hash)
                || matches_any(
                    candidate,
                    entries
                        .iter()
                        .take(PASSWORD_HISTORY_DEPTH as usize)
                        .map(|e| e.password_hash.as_str()),
                )
        });

    let summary = PasswordHistorySummary {
        count: entries.len() as u64,
        password_changed_at: account.password_changed_at.with_timezone(&Utc),
        changed_at: entries
            .iter()
            .map(|e| e.created_at.with_timezone(&Utc))
            .collect(),
        password_expired: password_expired(&account),
        reused,
    };
    Ok(ApiResponse::success("Password history", summary, None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_normalized_and_validated() {
        assert_eq!(normalize_email("  Asha@Example.COM "), "asha@example.com");
        assert!(validate_email("asha@example.com").is_ok());
        assert!(validate_email("asha@example").is_err());
        assert!(validate_email("not an email").is_err());
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        assert!(matches!(require("phone", "   "), Err(AppError::BadRequest(_))));
        assert_eq!(require("phone", " 980 ").expect("phone"), "980");
    }
}
