use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::{
    dto::logs::ActivityLogList,
    error::AppResult,
    middleware::auth::AuthUser,
    response::ApiResponse,
    routes::params::Pagination,
    services::activity_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/activity-logs", get(activity_logs))
}

#[utoipa::path(
    get,
    path = "/api/logs/activity-logs",
    params(
        ("page" = Option<i64>, Query, description = "Page number, default 1"),
        ("per_page" = Option<i64>, Query, description = "Items per page, default 20"),
    ),
    responses(
        (status = 200, description = "Request log, newest first", body = ApiResponse<ActivityLogList>),
        (status = 403, description = "Admin only"),
    ),
    security(("bearer_auth" = [])),
    tag = "Logs"
)]
pub async fn activity_logs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<ApiResponse<ActivityLogList>>> {
    let resp = activity_service::list_activity_logs(&state, &user, pagination).await?;
    Ok(Json(resp))
}
