//! Storage contract for bundles and their purchases.

use async_trait::async_trait;

use super::bundles::{Bundle, BundlePurchase};
use crate::error::Result;

#[async_trait]
pub trait BundleStore: Send + Sync {
    /// Active bundles, newest first.
    async fn list_active(&self) -> Result<Vec<Bundle>>;

    async fn get(&self, id: &str) -> Result<Option<Bundle>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Bundle>>;

    /// Returns `false` when the slug is already taken.
    async fn create(&self, bundle: &Bundle) -> Result<bool>;

    /// Returns `false` when the order was already recorded.
    async fn record_purchase(&self, purchase: &BundlePurchase) -> Result<bool>;

    async fn has_purchased(&self, user_id: &str, bundle_id: &str) -> Result<bool>;

    async fn list_purchases(&self, user_id: &str) -> Result<Vec<BundlePurchase>>;
}

pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct Tables {
        bundles: HashMap<String, Bundle>,
        purchases: HashMap<String, BundlePurchase>,
    }

    /// In-memory bundle store.
    #[derive(Default, Clone)]
    pub struct InMemoryBundleStore {
        inner: Arc<RwLock<Tables>>,
    }

    impl InMemoryBundleStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl BundleStore for InMemoryBundleStore {
        async fn list_active(&self) -> Result<Vec<Bundle>> {
            let tables = self.inner.read().await;
            let mut bundles: Vec<Bundle> = tables
                .bundles
                .values()
                .filter(|b| b.active)
                .cloned()
                .collect();
            bundles.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.slug.cmp(&b.slug)));
            Ok(bundles)
        }

        async fn get(&self, id: &str) -> Result<Option<Bundle>> {
            Ok(self.inner.read().await.bundles.get(id).cloned())
        }

        async fn get_by_slug(&self, slug: &str) -> Result<Option<Bundle>> {
            Ok(self
                .inner
                .read()
                .await
                .bundles
                .values()
                .find(|b| b.slug == slug)
                .cloned())
        }

        async fn create(&self, bundle: &Bundle) -> Result<bool> {
            let mut tables = self.inner.write().await;
            if tables.bundles.values().any(|b| b.slug == bundle.slug) {
                return Ok(false);
            }
            tables.bundles.insert(bundle.id.clone(), bundle.clone());
            Ok(true)
        }

        async fn record_purchase(&self, purchase: &BundlePurchase) -> Result<bool> {
            let mut tables = self.inner.write().await;
            if tables.purchases.contains_key(&purchase.order_id) {
                return Ok(false);
            }
            tables
                .purchases
                .insert(purchase.order_id.clone(), purchase.clone());
            Ok(true)
        }

        async fn has_purchased(&self, user_id: &str, bundle_id: &str) -> Result<bool> {
            Ok(self
                .inner
                .read()
                .await
                .purchases
                .values()
                .any(|p| p.user_id == user_id && p.bundle_id == bundle_id))
        }

        async fn list_purchases(&self, user_id: &str) -> Result<Vec<BundlePurchase>> {
            let tables = self.inner.read().await;
            let mut purchases: Vec<BundlePurchase> = tables
                .purchases
                .values()
                .filter(|p| p.user_id == user_id)
                .cloned()
                .collect();
            purchases.sort_by(|a, b| b.purchased_at.cmp(&a.purchased_at));
            Ok(purchases)
        }
    }
}
