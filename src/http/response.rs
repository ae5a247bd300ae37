use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Envelope for successful JSON responses: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: Some(message.into()),
        }
    }

    pub fn paginated(items: T, total: u64, page: u32, per_page: u32) -> ApiResponse<PaginatedData<T>> {
        ApiResponse::success(PaginatedData {
            items,
            pagination: PaginationMeta::new(total, page, per_page),
        })
    }

    pub fn created(data: T, location: impl Into<String>) -> CreatedResponse<T> {
        CreatedResponse {
            data,
            location: location.into(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct PaginatedData<T: Serialize> {
    pub items: T,
    pub pagination: PaginationMeta,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PaginationMeta {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl PaginationMeta {
    pub fn new(total: u64, page: u32, per_page: u32) -> Self {
        let per_page_u64 = u64::from(per_page.max(1));
        let total_pages = total.div_ceil(per_page_u64);
        Self {
            total,
            page,
            per_page,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }
}

/// 201 with a `Location` header and the enveloped body.
#[derive(Debug)]
pub struct CreatedResponse<T: Serialize> {
    pub data: T,
    pub location: String,
}

impl<T: Serialize> IntoResponse for CreatedResponse<T> {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::CREATED, Json(ApiResponse::success(self.data))).into_response();
        match self.location.parse() {
            Ok(location) => {
                response.headers_mut().insert(header::LOCATION, location);
            }
            Err(_) => {
                tracing::warn!(location = %self.location, "Invalid Location header value");
            }
        }
        response
    }
}

/// Return type of most handlers.
pub type JsonResponse<T> = Result<ApiResponse<T>, crate::error::ForgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_meta_rounds_up() {
        assert_eq!(PaginationMeta::new(41, 1, 20).total_pages, 3);
        assert_eq!(PaginationMeta::new(40, 2, 20).total_pages, 2);
        assert_eq!(PaginationMeta::new(0, 1, 20).total_pages, 0);
    }

    #[tokio::test]
    async fn test_created_response_sets_location() {
        let response = ApiResponse::created(serde_json::json!({"id": "b1"}), "/api/bundles/b1")
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()[header::LOCATION], "/api/bundles/b1");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["id"], "b1");
    }
}
