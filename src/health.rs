use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::app::AppContext;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
}

impl HealthResponse {
    fn from_checks(checks: Vec<ComponentHealth>) -> Self {
        let status = if checks.iter().all(|c| c.status == HealthStatus::Healthy) {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        Self { status, checks }
    }
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let code = match self.status {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };
        (code, Json(self)).into_response()
    }
}

/// `GET /health`: 200 when the ledger store answers, 503 otherwise.
pub async fn health_handler(State(ctx): State<AppContext>) -> HealthResponse {
    let ledger = match ctx.ledger.store().ping().await {
        Ok(()) => ComponentHealth {
            name: "ledger_store".to_string(),
            status: HealthStatus::Healthy,
            message: None,
        },
        Err(e) => {
            tracing::error!(error = %e, "ledger store health check failed");
            ComponentHealth {
                name: "ledger_store".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(e.safe_message()),
            }
        }
    };

    let payments = ComponentHealth {
        name: "payment_webhooks".to_string(),
        status: HealthStatus::Healthy,
        message: ctx
            .payments
            .is_none()
            .then(|| "disabled: no webhook secret".to_string()),
    };

    HealthResponse::from_checks(vec![ledger, payments])
}
