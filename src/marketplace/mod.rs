//! Marketplace of pre-generated image bundles.
//!
//! Anyone can browse bundles; asset links are only handed to users with a
//! recorded purchase. Purchases arrive through the payment webhook and are
//! keyed by order id so a redelivered order records nothing new.

mod bundles;
pub mod sea_orm_store;
mod storage;

pub use bundles::{Bundle, BundleDownload, BundlePurchase, BundleSummary, NewBundle};
pub use sea_orm_store::SeaOrmBundleStore;
pub use storage::BundleStore;
pub use storage::memory::InMemoryBundleStore;

use chrono::Utc;
use std::sync::Arc;
use validator::Validate;

use crate::credits::validate_user_id;
use crate::error::{ForgeError, Result};

/// Bundle catalog and purchase checks.
#[derive(Clone)]
pub struct Marketplace {
    store: Arc<dyn BundleStore>,
}

impl Marketplace {
    #[must_use]
    pub fn new(store: Arc<dyn BundleStore>) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Result<Vec<BundleSummary>> {
        Ok(self
            .store
            .list_active()
            .await?
            .iter()
            .map(Bundle::summary)
            .collect())
    }

    /// Look a bundle up by id, then by slug. Inactive bundles are hidden.
    pub async fn detail(&self, id_or_slug: &str) -> Result<BundleSummary> {
        Ok(self.find_active(id_or_slug).await?.summary())
    }

    pub async fn download(&self, user_id: &str, id_or_slug: &str) -> Result<BundleDownload> {
        let bundle = self.find(id_or_slug).await?;

        if !self.store.has_purchased(user_id, &bundle.id).await? {
            return Err(ForgeError::forbidden("Bundle has not been purchased"));
        }

        Ok(BundleDownload {
            bundle_id: bundle.id,
            title: bundle.title,
            asset_urls: bundle.asset_urls,
        })
    }

    pub async fn create(&self, new: NewBundle) -> Result<Bundle> {
        new.validate()?;

        let bundle = Bundle::from_new(new, Utc::now());
        if !self.store.create(&bundle).await? {
            return Err(ForgeError::conflict(format!(
                "Bundle slug '{}' is already taken",
                bundle.slug
            )));
        }

        tracing::info!(bundle_id = %bundle.id, slug = %bundle.slug, "bundle created");
        Ok(bundle)
    }

    /// Record that `order_id` bought `bundle_id`. Returns `false` for a
    /// repeated order.
    pub async fn record_purchase(
        &self,
        order_id: &str,
        user_id: &str,
        bundle_id: &str,
    ) -> Result<bool> {
        validate_user_id(user_id)?;
        let bundle = self.find(bundle_id).await?;

        let recorded = self
            .store
            .record_purchase(&BundlePurchase {
                order_id: order_id.to_string(),
                user_id: user_id.to_string(),
                bundle_id: bundle.id.clone(),
                purchased_at: Utc::now(),
            })
            .await?;

        if recorded {
            tracing::info!(
                order_id = %order_id,
                user_id = %user_id,
                bundle_id = %bundle.id,
                "bundle purchase recorded"
            );
        }
        Ok(recorded)
    }

    pub async fn purchases(&self, user_id: &str) -> Result<Vec<BundlePurchase>> {
        self.store.list_purchases(user_id).await
    }

    async fn find(&self, id_or_slug: &str) -> Result<Bundle> {
        if let Some(bundle) = self.store.get(id_or_slug).await? {
            return Ok(bundle);
        }
        self.store
            .get_by_slug(&id_or_slug.to_ascii_lowercase())
            .await?
            .ok_or_else(|| ForgeError::not_found(format!("Bundle '{}' not found", id_or_slug)))
    }

    async fn find_active(&self, id_or_slug: &str) -> Result<Bundle> {
        let bundle = self.find(id_or_slug).await?;
        if !bundle.active {
            return Err(ForgeError::not_found(format!("Bundle '{}' not found", id_or_slug)));
        }
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marketplace() -> Marketplace {
        Marketplace::new(Arc::new(InMemoryBundleStore::new()))
    }

    fn new_bundle(slug: &str, active: bool) -> NewBundle {
        NewBundle {
            slug: slug.into(),
            title: "Retro Robots".into(),
            description: "Twelve robots".into(),
            price_cents: 899,
            currency: "USD".into(),
            preview_urls: vec![],
            asset_urls: vec!["https://cdn.example.com/robot-1.png".into()],
            active,
        }
    }

    #[tokio::test]
    async fn test_listing_hides_inactive_bundles() {
        let market = marketplace();
        market.create(new_bundle("retro-robots", true)).await.unwrap();
        let hidden = market.create(new_bundle("draft-pack", false)).await.unwrap();

        let listed = market.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].slug, "retro-robots");

        assert!(matches!(
            market.detail(&hidden.id).await.unwrap_err(),
            ForgeError::NotFound(_)
        ));
        assert_eq!(market.detail("retro-robots").await.unwrap().image_count, 1);
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let market = marketplace();
        market.create(new_bundle("retro-robots", true)).await.unwrap();
        let err = market.create(new_bundle("retro-robots", true)).await.unwrap_err();
        assert!(matches!(err, ForgeError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_invalid_bundle_is_bad_request() {
        let market = marketplace();
        let err = market.create(new_bundle("-bad-", true)).await.unwrap_err();
        assert!(matches!(err, ForgeError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_download_requires_purchase() {
        let market = marketplace();
        let bundle = market.create(new_bundle("retro-robots", true)).await.unwrap();

        let err = market.download("user_1", &bundle.id).await.unwrap_err();
        assert!(matches!(err, ForgeError::Forbidden(_)));

        assert!(market.record_purchase("order_1", "user_1", "retro-robots").await.unwrap());
        assert!(!market.record_purchase("order_1", "user_1", &bundle.id).await.unwrap());

        let download = market.download("user_1", "retro-robots").await.unwrap();
        assert_eq!(download.asset_urls.len(), 1);
        assert_eq!(market.purchases("user_1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purchase_of_unknown_bundle() {
        let market = marketplace();
        let err = market.record_purchase("order_1", "user_1", "nope").await.unwrap_err();
        assert!(matches!(err, ForgeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_purchase_requires_valid_buyer() {
        let market = marketplace();
        let bundle = market.create(new_bundle("retro-robots", true)).await.unwrap();

        for buyer in ["", "user 1", "robert'); drop table--"] {
            let err = market
                .record_purchase("order_1", buyer, &bundle.id)
                .await
                .unwrap_err();
            assert!(matches!(err, ForgeError::BadRequest(_)));
        }
        assert!(market.record_purchase("order_1", "user_1", &bundle.id).await.unwrap());
    }
}
