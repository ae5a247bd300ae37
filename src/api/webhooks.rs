use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::Serialize;

use crate::app::AppContext;
use crate::error::ForgeError;
use crate::http::{ApiResponse, JsonResponse, RouteModule};
use crate::payments::SIGNATURE_HEADER;

pub struct WebhookRoutes;

impl RouteModule for WebhookRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/payments", post(payment_webhook))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/webhooks")
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub event_id: String,
    pub outcome: &'static str,
}

/// The signature covers the raw body, so the payload is read as bytes and
/// only parsed after verification.
async fn payment_webhook(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> JsonResponse<WebhookAck> {
    let handler = ctx.payments()?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ForgeError::bad_request("Missing webhook signature header"))?;

    let event = handler.verify_signature(&body, signature)?;
    let event_id = event.id.clone();
    let outcome = handler.handle_event(event).await?;

    Ok(ApiResponse::success(WebhookAck {
        event_id,
        outcome: outcome.as_str(),
    }))
}
