//! JSON API routes.

mod account;
mod admin;
mod bundles;
mod images;
mod licenses;
mod plans;
mod webhooks;

use axum::Router;

use crate::app::AppContext;
use crate::auth::ForgeUser;
use crate::http::RouteModule;

pub use account::AccountRoutes;
pub use admin::AdminRoutes;
pub use bundles::BundleRoutes;
pub use images::ImageRoutes;
pub use licenses::LicenseRoutes;
pub use plans::PlanRoutes;
pub use webhooks::WebhookRoutes;

/// Every API module mounted on one router.
pub fn router() -> Router<AppContext> {
    let router = Router::new();
    let router = PlanRoutes.register(router);
    let router = AccountRoutes.register(router);
    let router = LicenseRoutes.register(router);
    let router = ImageRoutes.register(router);
    let router = BundleRoutes.register(router);
    let router = AdminRoutes.register(router);
    WebhookRoutes.register(router)
}

fn email_of(user: &ForgeUser) -> Option<String> {
    (!user.email.is_empty()).then(|| user.email.clone())
}
