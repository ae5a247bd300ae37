use axum::{Router, extract::State, routing::post};
use chrono::Utc;

use crate::app::AppContext;
use crate::auth::AdminUser;
use crate::credits::SweepReport;
use crate::error::Result;
use crate::http::{ApiResponse, CreatedResponse, JsonResponse, RouteModule, ValidatedJson};
use crate::marketplace::{Bundle, NewBundle};

pub struct AdminRoutes;

impl RouteModule for AdminRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/bundles", post(create_bundle))
            .route("/sweep", post(run_sweep))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/admin")
    }
}

async fn create_bundle(
    State(ctx): State<AppContext>,
    AdminUser(admin): AdminUser,
    ValidatedJson(new): ValidatedJson<NewBundle>,
) -> Result<CreatedResponse<Bundle>> {
    let bundle = ctx.marketplace.create(new).await?;
    tracing::info!(admin = %admin.id, bundle_id = %bundle.id, "admin created bundle");
    let location = format!("/api/bundles/{}", bundle.id);
    Ok(ApiResponse::created(bundle, location))
}

async fn run_sweep(
    State(ctx): State<AppContext>,
    AdminUser(admin): AdminUser,
) -> JsonResponse<SweepReport> {
    let report = ctx.ledger.sweep_expired(Utc::now()).await?;
    tracing::info!(
        admin = %admin.id,
        scanned = report.scanned,
        expired = report.expired,
        "manual expiry sweep"
    );
    Ok(ApiResponse::success(report))
}
