use axum::{Router, extract::State, routing::get};

use crate::app::AppContext;
use crate::credits::PlanTerms;
use crate::http::{ApiResponse, RouteModule};

pub struct PlanRoutes;

impl RouteModule for PlanRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new().route("/", get(list_plans))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/plans")
    }
}

async fn list_plans(State(ctx): State<AppContext>) -> ApiResponse<Vec<PlanTerms>> {
    ApiResponse::success(ctx.ledger.catalog().list())
}
