use axum::{
    Router,
    extract::{Path, State},
    routing::get,
};

use crate::app::AppContext;
use crate::auth::{AuthUser, IdentityProvider};
use crate::http::{ApiResponse, JsonResponse, RouteModule};
use crate::marketplace::{BundleDownload, BundleSummary};

pub struct BundleRoutes;

impl RouteModule for BundleRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(list_bundles))
            .route("/{id}", get(show_bundle))
            .route("/{id}/download", get(download_bundle))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/bundles")
    }
}

async fn list_bundles(State(ctx): State<AppContext>) -> JsonResponse<Vec<BundleSummary>> {
    Ok(ApiResponse::success(ctx.marketplace.list().await?))
}

async fn show_bundle(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> JsonResponse<BundleSummary> {
    Ok(ApiResponse::success(ctx.marketplace.detail(&id).await?))
}

async fn download_bundle(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser<IdentityProvider>,
    Path(id): Path<String>,
) -> JsonResponse<BundleDownload> {
    Ok(ApiResponse::success(
        ctx.marketplace.download(&user.id, &id).await?,
    ))
}
