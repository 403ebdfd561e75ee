use uuid::Uuid;

use crate::{
    db::DbPool,
    dto::logs::ActivityLogList,
    error::AppResult,
    middleware::auth::{AuthUser, ensure_admin},
    models::ActivityLog,
    response::{ApiResponse, Meta},
    routes::params::Pagination,
    state::AppState,
};

/// One request as seen by the activity middleware.
#[derive(Debug, Clone)]
pub struct NewActivityLog {
    pub username: String,
    pub url: String,
    pub method: String,
    pub role: String,
    pub status: String,
    pub user_agent: Option<String>,
    pub authorization: String,
    pub content_type: String,
    pub device: String,
    pub ip_address: String,
}

pub async fn record(pool: &DbPool, entry: &NewActivityLog) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO activity_logs
            (id, username, url, method, role, status, user_agent,
             authorization, content_type, device, ip_address)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&entry.username)
    .bind(&entry.url)
    .bind(&entry.method)
    .bind(&entry.role)
    .bind(&entry.status)
    .bind(entry.user_agent.as_deref())
    .bind(&entry.authorization)
    .bind(&entry.content_type)
    .bind(&entry.device)
    .bind(&entry.ip_address)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn list_activity_logs(
    state: &AppState,
    user: &AuthUser,
    pagination: Pagination,
) -> AppResult<ApiResponse<ActivityLogList>> {
    ensure_admin(user)?;
    let (page, limit, offset) = pagination.normalize();

    let logs = sqlx::query_as::<_, ActivityLog>(
        r#"
        SELECT id, username, url, method, role, status, user_agent,
               authorization, content_type, device, ip_address, created_at
        FROM activity_logs
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM activity_logs")
        .fetch_one(&state.pool)
        .await?;

    Ok(ApiResponse::success(
        "OK",
        ActivityLogList { logs },
        Some(Meta::new(page, limit, total.0)),
    ))
}
