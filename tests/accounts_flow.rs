//! Account protections against a real database: login lockout, the OTP
//! attempt cap and password reuse. Skipped unless `TEST_DATABASE_URL` is set.

mod common;

use sea_orm::{ActiveModelTrait, EntityTrait, IntoActiveModel, Set};
use uuid::Uuid;

use sparklenest_api::{
    dto::users::{LoginRequest, RegisterRequest, ResetPasswordRequest, UpdateProfileRequest, VerifyOtpRequest},
    entity::users::{self, Entity as Users},
    error::AppError,
    middleware::auth::AuthUser,
    otp::{self, MAX_OTP_ATTEMPTS, OtpPurpose},
    password::hash_password,
    services::user_service::{self, LOCKOUT_MINUTES, MAX_FAILED_LOGINS},
    state::AppState,
};

const PASSWORD: &str = "Sparkle#2024";

async fn verified_user(state: &AppState) -> anyhow::Result<users::Model> {
    let mut account = common::account("user");
    account.email = format!("{}@sparklenest.test", Uuid::new_v4().simple());
    account.password_hash = hash_password(PASSWORD)?;
    Ok(account.into_active_model().insert(&state.orm).await?)
}

fn login(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
        recaptcha_token: None,
    }
}

/// Stores a fresh OTP for `user` and hands back the plain code.
async fn issue_otp(state: &AppState, user: users::Model, purpose: OtpPurpose) -> anyhow::Result<String> {
    let issued = otp::issue(10)?;
    let mut active: users::ActiveModel = user.into();
    active.otp_hash = Set(Some(issued.hash));
    active.otp_purpose = Set(Some(purpose.as_str().to_string()));
    active.otp_expires_at = Set(Some(issued.expires_at.into()));
    active.otp_attempts = Set(0);
    active.update(&state.orm).await?;
    Ok(issued.code)
}

fn wrong_code(code: &str) -> &'static str {
    if code == "111111" { "222222" } else { "111111" }
}

#[tokio::test]
async fn repeated_wrong_passwords_lock_the_account() -> anyhow::Result<()> {
    let Some(state) = common::database_state(common::test_config()).await? else {
        return Ok(());
    };
    let user = verified_user(&state).await?;

    for _ in 1..MAX_FAILED_LOGINS {
        let err = user_service::login(&state, login(&user.email, "Wrong#Pass1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(ref m) if m == "Invalid email or password"));
    }

    let err = user_service::login(&state, login(&user.email, "Wrong#Pass1"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(ref m) if m.contains("Account locked")));

    let stored = Users::find_by_id(user.id).one(&state.orm).await?.unwrap();
    let locked_until = stored.locked_until.expect("lock recorded");
    let minutes = (locked_until.with_timezone(&chrono::Utc) - chrono::Utc::now()).num_minutes();
    assert!(minutes >= LOCKOUT_MINUTES - 1 && minutes <= LOCKOUT_MINUTES);

    // The right password does not get through while the lock holds.
    let err = user_service::login(&state, login(&user.email, PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TooManyRequests(_)));
    Ok(())
}

#[tokio::test]
async fn successful_login_clears_the_failure_count() -> anyhow::Result<()> {
    let Some(state) = common::database_state(common::test_config()).await? else {
        return Ok(());
    };
    let user = verified_user(&state).await?;

    for _ in 0..2 {
        let _ = user_service::login(&state, login(&user.email, "Wrong#Pass1")).await;
    }
    let session = user_service::login(&state, login(&user.email, PASSWORD))
        .await?
        .data
        .unwrap();
    assert!(session.token.is_some());

    let stored = Users::find_by_id(user.id).one(&state.orm).await?.unwrap();
    assert_eq!(stored.failed_login_attempts, 0);
    assert!(stored.locked_until.is_none());
    Ok(())
}

#[tokio::test]
async fn otp_stops_working_after_too_many_wrong_codes() -> anyhow::Result<()> {
    let Some(state) = common::database_state(common::test_config()).await? else {
        return Ok(());
    };
    let user = verified_user(&state).await?;
    let email = user.email.clone();
    let code = issue_otp(&state, user, OtpPurpose::Login).await?;

    for _ in 0..MAX_OTP_ATTEMPTS {
        let err = user_service::verify_login_otp(
            &state,
            VerifyOtpRequest {
                email: email.clone(),
                otp: wrong_code(&code).to_string(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(ref m) if m == "Invalid OTP"));
    }

    // Even the right code is refused once the attempts are used up.
    let err = user_service::verify_login_otp(&state, VerifyOtpRequest { email, otp: code })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(ref m) if m.contains("no longer valid")));
    Ok(())
}

#[tokio::test]
async fn correct_otp_signs_in_and_is_single_use() -> anyhow::Result<()> {
    let Some(state) = common::database_state(common::test_config()).await? else {
        return Ok(());
    };
    let user = verified_user(&state).await?;
    let email = user.email.clone();
    let code = issue_otp(&state, user, OtpPurpose::Login).await?;

    let session = user_service::verify_login_otp(
        &state,
        VerifyOtpRequest {
            email: email.clone(),
            otp: code.clone(),
        },
    )
    .await?
    .data
    .unwrap();
    assert!(session.token.is_some());

    let replay = user_service::verify_login_otp(&state, VerifyOtpRequest { email, otp: code }).await;
    assert!(matches!(replay, Err(AppError::BadRequest(_))));
    Ok(())
}

#[tokio::test]
async fn recent_passwords_cannot_be_reused() -> anyhow::Result<()> {
    let Some(state) = common::database_state(common::test_config()).await? else {
        return Ok(());
    };
    let tag = Uuid::new_v4().simple().to_string();
    let registered = user_service::register(
        &state,
        RegisterRequest {
            first_name: "Asha".into(),
            last_name: "Rai".into(),
            user_name: format!("asha-{tag}"),
            email: format!("asha-{tag}@sparklenest.test"),
            phone: "9800000002".into(),
            password: PASSWORD.into(),
        },
    )
    .await?
    .data
    .unwrap();
    let auth = AuthUser {
        user_id: registered.id,
        role: "user".into(),
        email: registered.email.clone(),
        user_name: registered.user_name.clone(),
    };

    let change = |current: &str, new: &str| UpdateProfileRequest {
        first_name: None,
        last_name: None,
        user_name: None,
        phone: None,
        current_password: Some(current.to_string()),
        new_password: Some(new.to_string()),
    };

    user_service::update_profile(&state, &auth, change(PASSWORD, "Glimmer#2025")).await?;

    // The registration password is in the history now.
    let reused = user_service::update_profile(&state, &auth, change("Glimmer#2025", PASSWORD)).await;
    assert!(matches!(reused, Err(AppError::BadRequest(ref m)) if m.contains("must not match")));

    // A reset to the current password is refused and leaves the code usable.
    let user = Users::find_by_id(registered.id).one(&state.orm).await?.unwrap();
    let code = issue_otp(&state, user, OtpPurpose::Reset).await?;
    let reset = |new: &str| ResetPasswordRequest {
        email: registered.email.clone(),
        otp: code.clone(),
        new_password: new.to_string(),
    };
    let same = user_service::reset_password(&state, reset("Glimmer#2025")).await;
    assert!(matches!(same, Err(AppError::BadRequest(_))));

    user_service::reset_password(&state, reset("Radiant#2026")).await?;
    let session = user_service::login(&state, login(&registered.email, "Radiant#2026")).await;
    // Registration left the account unverified.
    assert!(matches!(session, Err(AppError::Forbidden(_))));
    Ok(())
}
