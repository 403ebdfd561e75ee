//! The JSON envelope every endpoint answers with.

use serde::Serialize;
use utoipa::ToSchema;

/// Paging facts for list responses. Single-record responses carry an empty one.
#[derive(Debug, Default, Clone, Copy, Serialize, ToSchema)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
        }
    }

    /// An unpaged list: everything on page one.
    pub fn listing(len: usize) -> Self {
        let len = i64::try_from(len).unwrap_or(i64::MAX);
        Self::new(1, len, len)
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            meta,
        }
    }

    /// `success: false` with an optional payload describing what went wrong.
    pub fn failure(message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data,
            meta: Some(Meta::empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_envelope_serializes_flag_and_payload() {
        let body = ApiResponse::failure("Cart is empty", Some(serde_json::json!({ "error": "Cart is empty" })));
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["data"]["error"], "Cart is empty");
        assert!(value["meta"]["page"].is_null());
    }

    #[test]
    fn listing_meta_covers_the_whole_list() {
        let meta = Meta::listing(7);
        assert_eq!((meta.page, meta.per_page, meta.total), (Some(1), Some(7), Some(7)));
    }
}
