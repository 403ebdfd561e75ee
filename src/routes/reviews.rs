use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use uuid::Uuid;

use crate::{
    dto::reviews::{AverageRating, PostReviewRequest, ReviewList, UpdateReviewRequest},
    error::AppResult,
    middleware::auth::AuthUser,
    models::Review,
    response::ApiResponse,
    services::review_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/post_reviews", post(post_review))
        .route("/get_reviews/{product_id}", get(get_reviews))
        .route(
            "/get_reviews_by_user_and_product/{product_id}",
            get(get_review_by_user_and_product),
        )
        .route("/get_average_rating/{product_id}", get(average_rating))
        .route("/update_reviews/{id}", put(update_review))
}

#[utoipa::path(
    post,
    path = "/api/review/post_reviews",
    request_body = PostReviewRequest,
    responses(
        (status = 201, description = "Review posted", body = ApiResponse<Review>),
        (status = 400, description = "Invalid rating or text"),
        (status = 409, description = "Product already reviewed"),
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn post_review(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<PostReviewRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Review>>)> {
    let resp = review_service::post_review(&state, &user, payload).await?;
    Ok((StatusCode::CREATED, Json(resp)))
}

#[utoipa::path(
    get,
    path = "/api/review/get_reviews/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product ID")),
    responses((status = 200, description = "Reviews for a product", body = ApiResponse<ReviewList>)),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn get_reviews(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<ReviewList>>> {
    let resp = review_service::get_reviews(&state, product_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/review/get_reviews_by_user_and_product/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "The caller's review", body = ApiResponse<Review>),
        (status = 404, description = "No review yet"),
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn get_review_by_user_and_product(
    State(state): State<AppState>,
    user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Review>>> {
    let resp = review_service::get_review_by_user_and_product(&state, &user, product_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    get,
    path = "/api/review/get_average_rating/{product_id}",
    params(("product_id" = Uuid, Path, description = "Product ID")),
    responses((status = 200, description = "Average rating, 0 when unrated", body = ApiResponse<AverageRating>)),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn average_rating(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<AverageRating>>> {
    let resp = review_service::average_rating(&state, product_id).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    put,
    path = "/api/review/update_reviews/{id}",
    params(("id" = Uuid, Path, description = "Review ID")),
    request_body = UpdateReviewRequest,
    responses(
        (status = 200, description = "Review updated", body = ApiResponse<Review>),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Review not found"),
    ),
    security(("bearer_auth" = [])),
    tag = "Reviews"
)]
pub async fn update_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReviewRequest>,
) -> AppResult<Json<ApiResponse<Review>>> {
    let resp = review_service::update_review(&state, &user, id, payload).await?;
    Ok(Json(resp))
}
