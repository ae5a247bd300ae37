use axum::Router;
use std::sync::Arc;

use super::database::TestDb;
use super::tokens::{TEST_JWT_SECRET, TokenMint};
use crate::app::{AppContext, AppContextBuilder};
use crate::config::{Config, ConfigBuilder, SweeperConfig};
use crate::core::App;
use crate::credits::{SeaOrmLedgerStore, StaticLicenseVerifier};
use crate::generation::{ImageGenerator, SeaOrmGalleryStore};
use crate::marketplace::SeaOrmBundleStore;

pub const TEST_WEBHOOK_SECRET: &str = "whsec_promptforge_test";

/// A fully wired application for integration tests.
///
/// License keys come from [`TestApp::licenses`], tokens from [`TestApp::tokens`],
/// and webhooks are signed with [`TEST_WEBHOOK_SECRET`].
pub struct TestApp {
    pub context: AppContext,
    pub licenses: StaticLicenseVerifier,
    pub tokens: TokenMint,
    _db: Option<TestDb>,
}

impl TestApp {
    /// In-memory stores and the placeholder generator.
    pub async fn new() -> Self {
        Self::build(Self::config(), None, None).await
    }

    /// Same as [`TestApp::new`] with SeaORM stores on a migrated SQLite database.
    pub async fn with_database() -> Self {
        let db = TestDb::new().await.expect("failed to create test database");
        Self::build(Self::config(), Some(db), None).await
    }

    pub async fn with_generator(generator: Arc<dyn ImageGenerator>) -> Self {
        Self::build(Self::config(), None, Some(generator)).await
    }

    pub fn config() -> Config {
        ConfigBuilder::new()
            .with_jwt_secret(TEST_JWT_SECRET)
            .with_webhook_secret(TEST_WEBHOOK_SECRET)
            .with_sweeper(SweeperConfig {
                enabled: false,
                interval_seconds: 3600,
            })
            .build()
            .expect("test config is valid")
    }

    pub async fn build(
        config: Config,
        db: Option<TestDb>,
        generator: Option<Arc<dyn ImageGenerator>>,
    ) -> Self {
        let licenses = StaticLicenseVerifier::new();
        let mut builder =
            AppContextBuilder::new(config).with_license_verifier(Arc::new(licenses.clone()));

        if let Some(db) = &db {
            builder = builder
                .with_ledger_store(Arc::new(SeaOrmLedgerStore::new(db.connection())))
                .with_bundle_store(Arc::new(SeaOrmBundleStore::new(db.connection())))
                .with_gallery_store(Arc::new(SeaOrmGalleryStore::new(db.connection())));
        }
        if let Some(generator) = generator {
            builder = builder.with_generator(generator);
        }

        let context = builder.build().await.expect("failed to build test context");
        Self {
            context,
            licenses,
            tokens: TokenMint::default(),
            _db: db,
        }
    }

    /// A fresh router over the shared context.
    pub fn router(&self) -> Router {
        App::new(self.context.clone()).into_router()
    }
}
