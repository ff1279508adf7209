use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

/// Envelope shared by every JSON endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

pub type JsonResponse<T> = Json<ApiResponse<T>>;
pub type CreatedResponse<T> = (StatusCode, Json<ApiResponse<T>>);

pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> JsonResponse<T> {
    Json(ApiResponse::ok(message, data))
}

pub fn created<T: Serialize>(message: impl Into<String>, data: T) -> CreatedResponse<T> {
    (StatusCode::CREATED, Json(ApiResponse::ok(message, data)))
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl Pagination {
    /// Returns (page, per_page, offset).
    pub fn normalize(&self) -> (u64, u64, u64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        (page, per_page, (page - 1) * per_page)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u64,
    pub per_page: u64,
    pub total: u64,
}
