use serde::Serialize;
use utoipa::ToSchema;

use crate::models::ActivityLog;

#[derive(Debug, Serialize, ToSchema)]
pub struct ActivityLogList {
    pub logs: Vec<ActivityLog>,
}
