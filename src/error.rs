use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The error type returned by every handler and service in promptforge
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but lacks enough credits.
    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(String),
}

/// JSON body of every error response.
#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
    error_id: String,
}

impl ForgeError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn payment_required(msg: impl Into<String>) -> Self {
        Self::PaymentRequired(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) | Self::Anyhow(_) | Self::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Message shown to clients.
    ///
    /// 4xx messages are returned as-is. 5xx details stay in the server log and
    /// clients only see a generic message plus the error id.
    pub fn safe_message(&self) -> String {
        match self {
            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
            Self::Database(_) => "Database error".to_string(),
            Self::ServiceUnavailable(_) => "Service unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ForgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request failed"
            );
        } else {
            tracing::debug!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request rejected"
            );
        }

        let body = Json(ErrorResponse {
            error: self.safe_message(),
            error_id,
        });

        (status, body).into_response()
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ForgeError>;

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            ForgeError::BadRequest(format!("JSON error: {}", err))
        } else {
            ForgeError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}

impl From<reqwest::Error> for ForgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ForgeError::RequestTimeout;
        }
        if err.is_connect() {
            return ForgeError::ServiceUnavailable(format!("Connection error: {}", err));
        }
        match err.status().map(|s| s.as_u16()) {
            Some(401) | Some(403) => {
                ForgeError::ServiceUnavailable("Upstream rejected our credentials".to_string())
            }
            Some(429) => ForgeError::TooManyRequests("Upstream rate limit exceeded".to_string()),
            Some(status) if status >= 500 => {
                ForgeError::ServiceUnavailable(format!("Upstream returned {}", status))
            }
            _ => ForgeError::Internal(format!("Upstream request error: {}", err)),
        }
    }
}

impl From<sea_orm::DbErr> for ForgeError {
    fn from(err: sea_orm::DbErr) -> Self {
        match &err {
            sea_orm::DbErr::RecordNotFound(msg) => ForgeError::NotFound(if msg.is_empty() {
                "Record not found".to_string()
            } else {
                msg.clone()
            }),
            sea_orm::DbErr::Conn(inner) => {
                ForgeError::Database(format!("Connection error: {}", inner))
            }
            sea_orm::DbErr::Migration(inner) => {
                ForgeError::Database(format!("Migration error: {}", inner))
            }
            _ => ForgeError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ForgeError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut field_errors: Vec<String> = err
            .field_errors()
            .iter()
            .map(|(field, errors)| {
                let messages: Vec<&str> = errors
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.as_ref())
                            .unwrap_or_else(|| e.code.as_ref())
                    })
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect();
        field_errors.sort();

        ForgeError::BadRequest(format!("Validation failed: {}", field_errors.join("; ")))
    }
}
