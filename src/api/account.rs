use axum::{
    Router,
    extract::{Query, State},
    routing::get,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::email_of;
use crate::app::AppContext;
use crate::auth::{AuthUser, IdentityProvider};
use crate::credits::{CreditAccount, LedgerEntry, Plan, SubscriptionStatus};
use crate::http::{ApiResponse, JsonResponse, RouteModule, query::LimitQuery};
use crate::marketplace::BundlePurchase;

pub struct AccountRoutes;

impl RouteModule for AccountRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(show_account))
            .route("/ledger", get(show_ledger))
            .route("/purchases", get(show_purchases))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/account")
    }
}

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub user_id: String,
    pub email: Option<String>,
    pub credits: u64,
    pub plan: Plan,
    pub subscription_status: SubscriptionStatus,
    pub plan_expiry_date: Option<DateTime<Utc>>,
    /// Whether a generation would pass the plan check right now.
    pub can_generate: bool,
}

impl From<CreditAccount> for AccountView {
    fn from(account: CreditAccount) -> Self {
        let can_generate = account.can_spend(Utc::now());
        Self {
            user_id: account.user_id,
            email: account.email,
            credits: account.credits,
            plan: account.plan,
            subscription_status: account.subscription_status,
            plan_expiry_date: account.plan_expiry_date,
            can_generate,
        }
    }
}

/// The first authenticated call opens the Free Trial account.
async fn show_account(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser<IdentityProvider>,
) -> JsonResponse<AccountView> {
    let account = ctx.ledger.open_account(&user.id, email_of(&user)).await?;
    Ok(ApiResponse::success(account.into()))
}

async fn show_ledger(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser<IdentityProvider>,
    Query(query): Query<LimitQuery>,
) -> JsonResponse<Vec<LedgerEntry>> {
    let entries = ctx.ledger.ledger(&user.id, query.clamped()).await?;
    Ok(ApiResponse::success(entries))
}

async fn show_purchases(
    State(ctx): State<AppContext>,
    AuthUser(user): AuthUser<IdentityProvider>,
) -> JsonResponse<Vec<BundlePurchase>> {
    Ok(ApiResponse::success(ctx.marketplace.purchases(&user.id).await?))
}
