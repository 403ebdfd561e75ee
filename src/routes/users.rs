use axum::{
    Json, Router,
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post, put},
};

use crate::{
    dto::users::{
        Acknowledgement, EmailRequest, LoginRequest, LoginResponse, PasswordHistoryRequest,
        PasswordHistorySummary, ProfilePictureUpload, RegisterRequest, ResetPasswordRequest,
        TokenResponse, UpdateProfileRequest, VerifyOtpRequest,
    },
    error::{AppError, AppResult},
    middleware::{auth::AuthUser, rate_limit::RateLimiters},
    models::User,
    response::ApiResponse,
    security_log::SecurityLogger,
    services::user_service,
    state::AppState,
    uploads,
};

pub fn router(limiters: &RateLimiters, security: &SecurityLogger) -> Router<AppState> {
    let registration = limiters.registration.apply(
        Router::new()
            .route("/create", post(register))
            .route("/verify_register_otp", post(verify_register_otp)),
        security,
    );
    let auth = limiters.auth.apply(
        Router::new()
            .route("/login", post(login))
            .route("/verify_login_otp", post(verify_login_otp))
            .route("/resend_login_otp", post(resend_login_otp))
            .route("/token", post(refresh_token)),
        security,
    );
    let password_reset = limiters.password_reset.apply(
        Router::new()
            .route("/forgot_password", post(forgot_password))
            .route("/verify_otp", post(reset_password)),
        security,
    );

    Router::new()
        .merge(registration)
        .merge(auth)
        .merge(password_reset)
        .route("/current", get(current_user))
        .route("/profile_picture", post(upload_profile_picture))
        .route("/update", put(update_profile))
        .route("/get-password-history", post(password_history))
}

#[utoipa::path(
    post,
    path = "/api/user/create",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification OTP sent", body = ApiResponse<User>),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Email or username already taken"),
        (status = 429, description = "Too many registration attempts"),
    ),
    tag = "User"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<User>>)> {
    let resp = user_service::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    post,
    path = "/api/user/verify_register_otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Account verified", body = ApiResponse<User>),
        (status = 400, description = "Invalid or expired OTP"),
    ),
    tag = "User"
)]
pub async fn verify_register_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::verify_register_otp(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session issued or OTP challenge sent", body = ApiResponse<LoginResponse>),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account not verified"),
        (status = 429, description = "Account locked or too many attempts"),
    ),
    tag = "User"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let resp = user_service::login(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/verify_login_otp",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Session issued", body = ApiResponse<LoginResponse>),
        (status = 400, description = "Invalid or expired OTP"),
    ),
    tag = "User"
)]
pub async fn verify_login_otp(
    State(state): State<AppState>,
    Json(payload): Json<VerifyOtpRequest>,
) -> AppResult<Json<ApiResponse<LoginResponse>>> {
    let resp = user_service::verify_login_otp(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/resend_login_otp",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "A new OTP is sent when a login is pending", body = ApiResponse<Acknowledgement>),
    ),
    tag = "User"
)]
pub async fn resend_login_otp(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<Json<ApiResponse<Acknowledgement>>> {
    let resp = user_service::resend_login_otp(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/token",
    responses(
        (status = 200, description = "Fresh token", body = ApiResponse<TokenResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<TokenResponse>>> {
    let resp = user_service::refresh_token(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/user/current",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<User>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn current_user(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::current_user(&state, &user).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/forgot_password",
    request_body = EmailRequest,
    responses(
        (status = 200, description = "Reset OTP sent when the account exists", body = ApiResponse<Acknowledgement>),
    ),
    tag = "User"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<EmailRequest>,
) -> AppResult<Json<ApiResponse<Acknowledgement>>> {
    let resp = user_service::forgot_password(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/verify_otp",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = ApiResponse<User>),
        (status = 400, description = "Invalid OTP or password rejected"),
    ),
    tag = "User"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::reset_password(&state, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/profile_picture",
    request_body(content = ProfilePictureUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Profile picture updated", body = ApiResponse<User>),
        (status = 400, description = "Missing or invalid image"),
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn upload_profile_picture(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<User>>> {
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("profilePicture") {
            image = Some(uploads::read_image(field).await?);
        }
    }
    let image = image.ok_or_else(|| AppError::BadRequest("profilePicture is required".into()))?;

    let resp = user_service::upload_profile_picture(&state, &user, image).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/user/update",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = ApiResponse<User>),
        (status = 400, description = "Validation failed"),
        (status = 409, description = "Username already taken"),
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> AppResult<Json<ApiResponse<User>>> {
    let resp = user_service::update_profile(&state, &user, payload).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/user/get-password-history",
    request_body = PasswordHistoryRequest,
    responses(
        (status = 200, description = "Password history metadata", body = ApiResponse<PasswordHistorySummary>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("bearer_auth" = [])),
    tag = "User"
)]
pub async fn password_history(
    State(state): State<AppState>,
    user: AuthUser,
    body: Bytes,
) -> AppResult<Json<ApiResponse<PasswordHistorySummary>>> {
    // The body is optional; an empty POST asks for metadata only.
    let payload = if body.iter().all(u8::is_ascii_whitespace) {
        PasswordHistoryRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::BadRequest(format!("Invalid JSON body: {e}")))?
    };
    let resp = user_service::password_history(&state, &user, payload).await?;
    Ok(Json(resp))
}
