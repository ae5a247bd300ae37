use axum::{Router, extract::State, routing::post};
use serde::Deserialize;
use validator::Validate;

use crate::app::AppContext;
use crate::auth::{AuthUser, IdentityProvider};
use crate::credits::{TopUpReceipt, activate};
use crate::http::{ApiResponse, JsonResponse, RouteModule, ValidatedJson};

pub struct LicenseRoutes;

impl RouteModule for LicenseRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/activate", post(activate_license))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/licenses")
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ActivateRequest {
    #[validate(length(min = 1, max = 64))]
    pub key: String,
}

async fn activate_license(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser<IdentityProvider>,
    ValidatedJson(body): ValidatedJson<ActivateRequest>,
) -> JsonResponse<TopUpReceipt> {
    let receipt = activate(&ctx.ledger, ctx.licenses.as_ref(), &user.id, &body.key).await?;
    Ok(ApiResponse::success_with_message(
        receipt,
        "License activated",
    ))
}
