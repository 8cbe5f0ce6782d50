use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Response-generation instant, ISO-8601 UTC with millisecond precision.
pub fn response_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Serialize)]
struct SuccessBody<T> {
    success: bool,
    message: String,
    data: T,
    timestamp: String,
}

/// `{ success: true, message, data, timestamp }`
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    message: String,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
            data,
        }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            message: message.into(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let body = SuccessBody {
            success: true,
            message: self.message,
            data: self.data,
            timestamp: response_timestamp(),
        };
        (self.status, Json(body)).into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: u64) -> Self {
        let limit = limit.max(1);
        let total_pages = total.div_ceil(u64::from(limit));
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next: u64::from(page) * u64::from(limit) < total,
            has_prev: page > 1,
        }
    }
}

#[derive(Debug, Serialize)]
struct PaginatedBody<T> {
    success: bool,
    data: Vec<T>,
    pagination: Pagination,
    timestamp: String,
}

/// `{ success: true, data, pagination, timestamp }`
#[derive(Debug)]
pub struct Paginated<T> {
    data: Vec<T>,
    pagination: Pagination,
}

impl<T: Serialize> Paginated<T> {
    pub fn new(data: Vec<T>, query: &PageQuery, total: u64) -> Self {
        Self {
            data,
            pagination: Pagination::new(query.page(), query.limit(), total),
        }
    }
}

impl<T: Serialize> IntoResponse for Paginated<T> {
    fn into_response(self) -> Response {
        let body = PaginatedBody {
            success: true,
            data: self.data,
            pagination: self.pagination,
            timestamp: response_timestamp(),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// `?page=&limit=` as sent by list pages. Out-of-range values are clamped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page() - 1) * i64::from(self.limit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_math() {
        let p = Pagination::new(2, 10, 25);
        assert_eq!(p.total_pages, 3);
        assert!(p.has_next);
        assert!(p.has_prev);

        let last = Pagination::new(3, 10, 25);
        assert!(!last.has_next);

        let empty = Pagination::new(1, 10, 0);
        assert_eq!(empty.total_pages, 0);
        assert!(!empty.has_next);
        assert!(!empty.has_prev);
    }

    #[test]
    fn test_pagination_serializes_camel_case() {
        let value = serde_json::to_value(Pagination::new(1, 20, 40)).unwrap();
        assert_eq!(value["totalPages"], 2);
        assert_eq!(value["hasNext"], true);
        assert_eq!(value["hasPrev"], false);
    }

    #[test]
    fn test_page_query_clamping() {
        let query = PageQuery { page: Some(0), limit: Some(500) };
        assert_eq!(query.page(), 1);
        assert_eq!(query.limit(), MAX_PAGE_SIZE);
        assert_eq!(PageQuery::new(3, 20).offset(), 40);
        assert_eq!(PageQuery::default().limit(), DEFAULT_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_success_envelope_shape() {
        let response =
            ApiResponse::created("Patient created", serde_json::json!({"id": 1})).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Patient created");
        assert_eq!(json["data"]["id"], 1);
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }
}
