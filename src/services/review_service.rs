use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, FromQueryResult, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect, Set,
};
use sea_orm::sea_query::Expr;
use uuid::Uuid;

use crate::{
    dto::reviews::{AverageRating, PostReviewRequest, ReviewList, UpdateReviewRequest},
    entity::{
        products::Entity as Products,
        reviews::{ActiveModel as ReviewActive, Column as ReviewCol, Entity as Reviews},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Review,
    response::{ApiResponse, Meta},
    state::AppState,
};

const MAX_REVIEW_CHARS: usize = 1000;

fn check_rating(rating: i16) -> AppResult<()> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest("Rating must be between 1 and 5".into()));
    }
    Ok(())
}

fn check_text(review: &str) -> AppResult<String> {
    let review = review.trim();
    if review.is_empty() {
        return Err(AppError::BadRequest("Review text is required".into()));
    }
    if review.chars().count() > MAX_REVIEW_CHARS {
        return Err(AppError::BadRequest(format!(
            "Review must be at most {MAX_REVIEW_CHARS} characters"
        )));
    }
    Ok(review.to_string())
}

pub async fn post_review(
    state: &AppState,
    user: &AuthUser,
    payload: PostReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    check_rating(payload.rating)?;
    let text = check_text(&payload.review)?;

    if Products::find_by_id(payload.product_id)
        .one(&state.orm)
        .await?
        .is_none()
    {
        return Err(AppError::BadRequest("Product not found".into()));
    }

    let already = Reviews::find()
        .filter(ReviewCol::UserId.eq(user.user_id))
        .filter(ReviewCol::ProductId.eq(payload.product_id))
        .count(&state.orm)
        .await?;
    if already > 0 {
        return Err(AppError::Conflict(
            "You have already reviewed this product".into(),
        ));
    }

    let now = Utc::now();
    let review = ReviewActive {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.user_id),
        product_id: Set(payload.product_id),
        rating: Set(payload.rating),
        review: Set(text),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    Ok(ApiResponse::success(
        "Review posted",
        review.into(),
        Some(Meta::empty()),
    ))
}

pub async fn get_reviews(
    state: &AppState,
    product_id: Uuid,
) -> AppResult<ApiResponse<ReviewList>> {
    let reviews: Vec<Review> = Reviews::find()
        .filter(ReviewCol::ProductId.eq(product_id))
        .order_by_desc(ReviewCol::CreatedAt)
        .all(&state.orm)
        .await?
        .into_iter()
        .map(Review::from)
        .collect();

    let meta = Meta::listing(reviews.len());
    Ok(ApiResponse::success(
        "OK",
        ReviewList { reviews },
        Some(meta),
    ))
}

pub async fn get_review_by_user_and_product(
    state: &AppState,
    user: &AuthUser,
    product_id: Uuid,
) -> AppResult<ApiResponse<Review>> {
    let review = Reviews::find()
        .filter(ReviewCol::UserId.eq(user.user_id))
        .filter(ReviewCol::ProductId.eq(product_id))
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("OK", review.into(), None))
}

#[derive(Debug, FromQueryResult)]
struct RatingRow {
    average: Option<f64>,
    count: i64,
}

pub async fn average_rating(
    state: &AppState,
    product_id: Uuid,
) -> AppResult<ApiResponse<AverageRating>> {
    let row = Reviews::find()
        .select_only()
        .column_as(Expr::cust("AVG(rating)::float8"), "average")
        .column_as(Expr::cust("COUNT(*)"), "count")
        .filter(ReviewCol::ProductId.eq(product_id))
        .into_model::<RatingRow>()
        .one(&state.orm)
        .await?;

    let (average, count) = row
        .map(|r| (r.average.unwrap_or(0.0), r.count))
        .unwrap_or((0.0, 0));
    let average = (average * 10.0).round() / 10.0;

    Ok(ApiResponse::success(
        "OK",
        AverageRating { average, count },
        None,
    ))
}

pub async fn update_review(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateReviewRequest,
) -> AppResult<ApiResponse<Review>> {
    let review = Reviews::find_by_id(id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    if review.user_id != user.user_id {
        return Err(AppError::Forbidden(
            "You can only update your own review".into(),
        ));
    }

    let mut active: ReviewActive = review.into();
    if let Some(rating) = payload.rating {
        check_rating(rating)?;
        active.rating = Set(rating);
    }
    if let Some(text) = payload.review.as_deref() {
        active.review = Set(check_text(text)?);
    }
    active.updated_at = Set(Utc::now().into());
    let review = active.update(&state.orm).await?;

    Ok(ApiResponse::success(
        "Review updated",
        review.into(),
        Some(Meta::empty()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rating_must_be_one_to_five() {
        assert!(check_rating(0).is_err());
        assert!(check_rating(6).is_err());
        assert!(check_rating(1).is_ok());
        assert!(check_rating(5).is_ok());
    }

    #[test]
    fn review_text_is_trimmed_and_bounded() {
        assert_eq!(check_text("  lovely  ").unwrap(), "lovely");
        assert!(check_text("   ").is_err());
        assert!(check_text(&"x".repeat(MAX_REVIEW_CHARS + 1)).is_err());
    }
}
