use std::sync::Arc;
use std::time::Duration;

use crate::auth::IdentityProvider;
use crate::config::Config;
use crate::credits::{
    HttpLicenseVerifier, InMemoryLedgerStore, LedgerAuditLogger, LedgerManager, LedgerStore,
    LicenseVerifier, Plan, PlanCatalog, SeaOrmLedgerStore, StaticLicenseVerifier,
};
use crate::database;
use crate::error::{ForgeError, Result};
use crate::generation::{
    GalleryStore, GenerationService, HttpImageGenerator, ImageGenerator, InMemoryGalleryStore,
    PlaceholderImageGenerator, SeaOrmGalleryStore,
};
use crate::marketplace::{BundleStore, InMemoryBundleStore, Marketplace, SeaOrmBundleStore};
use crate::payments::PaymentWebhookHandler;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub auth: IdentityProvider,
    pub ledger: LedgerManager,
    pub marketplace: Marketplace,
    pub generation: GenerationService,
    pub licenses: Arc<dyn LicenseVerifier>,
    /// `None` when no webhook secret is configured; the webhook route then
    /// answers 503.
    pub payments: Option<Arc<PaymentWebhookHandler>>,
}

impl AppContext {
    pub fn builder(config: Config) -> AppContextBuilder {
        AppContextBuilder::new(config)
    }

    /// Wire up every service from configuration.
    ///
    /// With a database URL the SeaORM stores are used (and migrated when
    /// `database.run_migrations` is set); otherwise everything lives in memory.
    pub async fn from_config(config: Config) -> Result<Self> {
        let mut builder = AppContextBuilder::new(config.clone());

        if let Some(url) = &config.database.url {
            let db = database::connect(url, &config.database).await?;
            if config.database.run_migrations {
                database::run_migrations(&db).await?;
            }
            builder = builder
                .with_ledger_store(Arc::new(SeaOrmLedgerStore::new(db.clone())))
                .with_bundle_store(Arc::new(SeaOrmBundleStore::new(db.clone())))
                .with_gallery_store(Arc::new(SeaOrmGalleryStore::new(db)));
        } else {
            tracing::warn!("No database configured, balances will not survive a restart");
        }

        builder.build().await
    }

    pub fn payments(&self) -> Result<&PaymentWebhookHandler> {
        self.payments
            .as_deref()
            .ok_or_else(|| ForgeError::service_unavailable("Payment webhooks are not configured"))
    }
}

/// Builder for [`AppContext`]. Anything not supplied is derived from the
/// config or falls back to an in-memory implementation.
#[must_use = "builder does nothing until you call build()"]
pub struct AppContextBuilder {
    config: Config,
    auth: Option<IdentityProvider>,
    ledger_store: Option<Arc<dyn LedgerStore>>,
    bundle_store: Option<Arc<dyn BundleStore>>,
    gallery_store: Option<Arc<dyn GalleryStore>>,
    generator: Option<Arc<dyn ImageGenerator>>,
    licenses: Option<Arc<dyn LicenseVerifier>>,
    audit: Option<Arc<dyn LedgerAuditLogger>>,
    catalog: Option<PlanCatalog>,
}

impl AppContextBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            auth: None,
            ledger_store: None,
            bundle_store: None,
            gallery_store: None,
            generator: None,
            licenses: None,
            audit: None,
            catalog: None,
        }
    }

    pub fn with_identity_provider(mut self, provider: IdentityProvider) -> Self {
        self.auth = Some(provider);
        self
    }

    pub fn with_ledger_store(mut self, store: Arc<dyn LedgerStore>) -> Self {
        self.ledger_store = Some(store);
        self
    }

    pub fn with_bundle_store(mut self, store: Arc<dyn BundleStore>) -> Self {
        self.bundle_store = Some(store);
        self
    }

    pub fn with_gallery_store(mut self, store: Arc<dyn GalleryStore>) -> Self {
        self.gallery_store = Some(store);
        self
    }

    pub fn with_generator(mut self, generator: Arc<dyn ImageGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn with_license_verifier(mut self, verifier: Arc<dyn LicenseVerifier>) -> Self {
        self.licenses = Some(verifier);
        self
    }

    pub fn with_audit_logger(mut self, audit: Arc<dyn LedgerAuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Replace the plan catalog. The configured trial grant still applies.
    pub fn with_catalog(mut self, catalog: PlanCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub async fn build(self) -> Result<AppContext> {
        let config = self.config;

        let auth = match self.auth {
            Some(provider) => provider,
            None => IdentityProvider::from_config(&config.auth).await?,
        };

        let catalog = self
            .catalog
            .unwrap_or_default()
            .with_allotment(Plan::FreeTrial, config.ledger.trial_credits);

        let ledger_store = self
            .ledger_store
            .unwrap_or_else(|| Arc::new(InMemoryLedgerStore::new()));
        let mut ledger = LedgerManager::new(ledger_store, catalog)
            .with_plan_duration(chrono::Duration::days(config.ledger.plan_duration_days));
        if let Some(audit) = self.audit {
            ledger = ledger.with_audit_logger(audit);
        }

        let marketplace = Marketplace::new(
            self.bundle_store
                .unwrap_or_else(|| Arc::new(InMemoryBundleStore::new())),
        );

        let generator = match self.generator {
            Some(generator) => generator,
            None => build_generator(&config)?,
        };
        let generator_name = generator.name().to_string();
        let gallery = self
            .gallery_store
            .unwrap_or_else(|| Arc::new(InMemoryGalleryStore::new()));
        let generation = GenerationService::new(ledger.clone(), generator, gallery).with_limits(
            config.generation.max_parallel,
            config.generation.max_bulk,
        );

        let licenses = match self.licenses {
            Some(verifier) => verifier,
            None => build_license_verifier(&config)?,
        };

        let payments = config.payments.webhook_secret.clone().map(|secret| {
            Arc::new(
                PaymentWebhookHandler::new(ledger.clone(), marketplace.clone(), secret)
                    .with_tolerance(config.payments.tolerance_seconds),
            )
        });
        if payments.is_none() {
            tracing::warn!("FORGE_PAYMENTS_WEBHOOK_SECRET not set, payment webhooks are disabled");
        }

        tracing::info!(
            generator = %generator_name,
            license_provider = %config.licenses.provider,
            trial_credits = config.ledger.trial_credits,
            "Application context ready"
        );

        Ok(AppContext {
            config: Arc::new(config),
            auth,
            ledger,
            marketplace,
            generation,
            licenses,
            payments,
        })
    }
}

fn build_generator(config: &Config) -> Result<Arc<dyn ImageGenerator>> {
    let settings = &config.generation;
    match settings.provider.as_str() {
        "http" => {
            let endpoint = settings.endpoint.clone().ok_or_else(|| {
                ForgeError::internal("http generation provider requires an endpoint")
            })?;
            let generator = HttpImageGenerator::new(
                endpoint,
                settings.api_key.clone().unwrap_or_default(),
                settings.model.clone(),
                Duration::from_secs(settings.timeout_seconds),
            )?;
            Ok(Arc::new(generator))
        }
        _ => Ok(Arc::new(PlaceholderImageGenerator::new())),
    }
}

fn build_license_verifier(config: &Config) -> Result<Arc<dyn LicenseVerifier>> {
    let settings = &config.licenses;
    match (
        settings.provider.as_str(),
        &settings.verify_url,
        &settings.product_id,
    ) {
        ("http", Some(url), Some(product_id)) => Ok(Arc::new(HttpLicenseVerifier::new(
            url.clone(),
            product_id.clone(),
        )?)),
        ("http", _, _) => Err(ForgeError::internal(
            "http license provider requires a verify URL and product id",
        )),
        _ => Ok(Arc::new(StaticLicenseVerifier::new())),
    }
}
