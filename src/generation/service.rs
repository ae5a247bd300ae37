//! Pay-then-generate orchestration.
//!
//! Credits are deducted before the provider is called and refunded when the
//! provider fails, so a balance can never fund more images than it covers.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use super::client::{GenerationRequest, ImageGenerator};
use super::gallery::{GalleryImage, GalleryStore};
use crate::credits::LedgerManager;
use crate::error::{ForgeError, Result};

/// Result of a single generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    pub image: GalleryImage,
    pub credits_spent: u64,
    pub balance: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkGenerationRequest {
    pub prompts: Vec<GenerationRequest>,
}

/// Per-prompt outcome of a bulk run, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct BulkItem {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<GalleryImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkGenerationResult {
    pub results: Vec<BulkItem>,
    pub succeeded: usize,
    pub failed: usize,
    pub credits_spent: u64,
    pub credits_refunded: u64,
    pub balance: u64,
}

struct SettledBatch {
    results: Vec<BulkItem>,
    refunded: u64,
    /// Balance after the refund, when one was made.
    balance: Option<u64>,
}

/// Default cap on concurrent provider calls in a bulk run.
pub const DEFAULT_MAX_PARALLEL: usize = 4;
/// Default cap on prompts per bulk run.
pub const DEFAULT_MAX_BULK: usize = 10;

#[derive(Clone)]
pub struct GenerationService {
    ledger: LedgerManager,
    generator: Arc<dyn ImageGenerator>,
    gallery: Arc<dyn GalleryStore>,
    max_parallel: usize,
    max_bulk: usize,
}

impl GenerationService {
    #[must_use]
    pub fn new(
        ledger: LedgerManager,
        generator: Arc<dyn ImageGenerator>,
        gallery: Arc<dyn GalleryStore>,
    ) -> Self {
        Self {
            ledger,
            generator,
            gallery,
            max_parallel: DEFAULT_MAX_PARALLEL,
            max_bulk: DEFAULT_MAX_BULK,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, max_parallel: usize, max_bulk: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self.max_bulk = max_bulk.max(1);
        self
    }

    #[must_use]
    pub fn gallery(&self) -> &Arc<dyn GalleryStore> {
        &self.gallery
    }

    /// Charge for one image, generate it, and store it in the gallery.
    pub async fn generate(
        &self,
        user_id: &str,
        email: Option<String>,
        request: GenerationRequest,
    ) -> Result<GenerationResult> {
        request.validate()?;

        let account = self.ledger.open_account(user_id, email).await?;
        let cost = self.ledger.catalog().cost_for(account.plan, 1);
        let generation_id = uuid::Uuid::new_v4().to_string();

        let receipt = self
            .ledger
            .deduct(user_id, cost, Some(generation_id.clone()))
            .await?;

        // Once charged, the provider call and any refund run detached from the
        // request so a timeout or disconnect cannot drop the refund.
        let service = self.clone();
        let owner = user_id.to_string();
        let image = tokio::spawn(async move {
            service
                .produce_or_refund(&owner, &request, cost, generation_id)
                .await
        })
        .await
        .map_err(|e| ForgeError::internal(format!("Generation task failed: {}", e)))??;

        tracing::info!(
            user_id = %user_id,
            image_id = %image.id,
            provider = %image.provider,
            credits = cost,
            "image generated"
        );
        Ok(GenerationResult {
            image,
            credits_spent: cost,
            balance: receipt.balance,
        })
    }

    /// Generate several images for one upfront charge.
    ///
    /// Provider calls run concurrently up to `max_parallel`. Failed prompts are
    /// refunded together once every call has finished.
    pub async fn generate_bulk(
        &self,
        user_id: &str,
        email: Option<String>,
        request: BulkGenerationRequest,
    ) -> Result<BulkGenerationResult> {
        let prompts = request.prompts;
        if prompts.is_empty() || prompts.len() > self.max_bulk {
            return Err(ForgeError::bad_request(format!(
                "Bulk requests take between 1 and {} prompts",
                self.max_bulk
            )));
        }
        for (index, prompt) in prompts.iter().enumerate() {
            prompt.validate().map_err(|e| match ForgeError::from(e) {
                ForgeError::BadRequest(msg) => {
                    ForgeError::bad_request(format!("prompts[{}]: {}", index, msg))
                }
                other => other,
            })?;
        }

        let account = self.ledger.open_account(user_id, email).await?;
        let count = prompts.len() as u64;
        let cost = self.ledger.catalog().cost_for(account.plan, 1);
        let total = self.ledger.catalog().cost_for(account.plan, count);
        let batch_id = format!("bulk:{}", uuid::Uuid::new_v4());

        let receipt = self
            .ledger
            .deduct(user_id, total, Some(batch_id.clone()))
            .await?;

        let service = self.clone();
        let owner = user_id.to_string();
        let batch = batch_id.clone();
        let settled = tokio::spawn(async move {
            service.run_bulk(&owner, prompts, cost, batch).await
        })
        .await
        .map_err(|e| ForgeError::internal(format!("Bulk generation task failed: {}", e)))?;

        let results = settled.results;
        let failed = results.iter().filter(|r| r.image.is_none()).count();
        let credits_refunded = settled.refunded;
        let balance = settled.balance.unwrap_or(receipt.balance);

        tracing::info!(
            user_id = %user_id,
            batch_id = %batch_id,
            succeeded = results.len() - failed,
            failed = failed,
            "bulk generation finished"
        );

        Ok(BulkGenerationResult {
            succeeded: results.len() - failed,
            failed,
            credits_spent: total - credits_refunded,
            credits_refunded,
            balance,
            results,
        })
    }

    async fn produce_or_refund(
        &self,
        user_id: &str,
        request: &GenerationRequest,
        cost: u64,
        generation_id: String,
    ) -> Result<GalleryImage> {
        match self.produce(user_id, request, cost).await {
            Ok(image) => Ok(image),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "generation failed, refunding");
                self.refund_or_log(user_id, cost, generation_id).await;
                Err(e)
            }
        }
    }

    /// Run every prompt of a paid batch, then refund the failures in one entry.
    async fn run_bulk(
        &self,
        user_id: &str,
        prompts: Vec<GenerationRequest>,
        cost: u64,
        batch_id: String,
    ) -> SettledBatch {
        let mut results: Vec<BulkItem> = stream::iter(prompts.into_iter().enumerate())
            .map(|(index, prompt)| async move {
                match self.produce(user_id, &prompt, cost).await {
                    Ok(image) => BulkItem {
                        index,
                        image: Some(image),
                        error: None,
                    },
                    Err(e) => {
                        tracing::warn!(user_id = %user_id, index = index, error = %e, "bulk item failed");
                        BulkItem {
                            index,
                            image: None,
                            error: Some(e.safe_message()),
                        }
                    }
                }
            })
            .buffer_unordered(self.max_parallel)
            .collect()
            .await;
        results.sort_by_key(|item| item.index);

        let failed = results.iter().filter(|r| r.image.is_none()).count();
        let refund = cost * failed as u64;
        if refund == 0 {
            return SettledBatch {
                results,
                refunded: 0,
                balance: None,
            };
        }

        match self.ledger.refund(user_id, refund, Some(batch_id.clone())).await {
            Ok(receipt) => SettledBatch {
                results,
                refunded: refund,
                balance: Some(receipt.balance),
            },
            Err(e) => {
                tracing::error!(
                    user_id = %user_id,
                    batch_id = %batch_id,
                    amount = refund,
                    error = %e,
                    "failed to refund bulk generation"
                );
                SettledBatch {
                    results,
                    refunded: 0,
                    balance: None,
                }
            }
        }
    }

    async fn produce(
        &self,
        user_id: &str,
        request: &GenerationRequest,
        cost: u64,
    ) -> Result<GalleryImage> {
        let generated = self.generator.generate(request).await?;
        let image = GalleryImage::new(user_id, request, generated, cost);
        self.gallery.save(&image).await?;
        Ok(image)
    }

    async fn refund_or_log(&self, user_id: &str, amount: u64, reference: String) {
        if let Err(e) = self.ledger.refund(user_id, amount, Some(reference.clone())).await {
            tracing::error!(
                user_id = %user_id,
                reference = %reference,
                amount = amount,
                error = %e,
                "failed to refund generation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credits::{
        CreditAccount, EntryKind, InMemoryLedgerStore, KeySource, Plan, PlanCatalog,
        SubscriptionStatus,
    };
    use crate::generation::{GeneratedImage, InMemoryGalleryStore, PlaceholderImageGenerator};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every prompt containing "fail".
    struct FlakyGenerator {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FlakyGenerator {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ImageGenerator for FlakyGenerator {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if request.prompt.contains("fail") {
                return Err(ForgeError::service_unavailable("provider down"));
            }
            Ok(GeneratedImage {
                url: format!("https://img.example.com/{}.png", request.prompt),
                provider: "flaky".into(),
                seed: None,
            })
        }
    }

    /// Fails every prompt after a delay.
    struct SlowFailingGenerator;

    #[async_trait]
    impl ImageGenerator for SlowFailingGenerator {
        fn name(&self) -> &str {
            "slow"
        }

        async fn generate(&self, _request: &GenerationRequest) -> Result<GeneratedImage> {
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Err(ForgeError::service_unavailable("provider down"))
        }
    }

    struct Fixture {
        service: GenerationService,
        ledger: LedgerManager,
        store: InMemoryLedgerStore,
        gallery: InMemoryGalleryStore,
    }

    fn fixture(generator: Arc<dyn ImageGenerator>) -> Fixture {
        let store = InMemoryLedgerStore::new();
        let ledger = LedgerManager::new(Arc::new(store.clone()), PlanCatalog::default());
        let gallery = InMemoryGalleryStore::new();
        let service = GenerationService::new(ledger.clone(), generator, Arc::new(gallery.clone()))
            .with_limits(2, 5);
        Fixture {
            service,
            ledger,
            store,
            gallery,
        }
    }

    fn prompts(names: &[&str]) -> BulkGenerationRequest {
        BulkGenerationRequest {
            prompts: names.iter().map(|n| GenerationRequest::new(*n)).collect(),
        }
    }

    #[tokio::test]
    async fn test_generate_charges_and_saves() {
        let f = fixture(Arc::new(PlaceholderImageGenerator::new()));

        let result = f
            .service
            .generate("user_1", None, GenerationRequest::new("a koi pond"))
            .await
            .unwrap();

        assert_eq!(result.credits_spent, 1);
        assert_eq!(result.balance, 9);
        assert_eq!(f.gallery.count("user_1").await.unwrap(), 1);
        assert_eq!(f.ledger.account("user_1").await.unwrap().credits, 9);
    }

    #[tokio::test]
    async fn test_generate_refunds_on_provider_failure() {
        let f = fixture(Arc::new(FlakyGenerator::new()));

        let err = f
            .service
            .generate("user_1", None, GenerationRequest::new("please fail"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::ServiceUnavailable(_)));
        assert_eq!(f.ledger.account("user_1").await.unwrap().credits, 10);

        let kinds: Vec<EntryKind> = f
            .ledger
            .ledger("user_1", 10)
            .await
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(kinds, [EntryKind::Refund, EntryKind::Deduction, EntryKind::TrialGrant]);
        assert_eq!(f.gallery.count("user_1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_generate_without_credits_is_payment_required() {
        let f = fixture(Arc::new(PlaceholderImageGenerator::new()));
        f.store
            .force_account(CreditAccount::free_trial("user_1", None, 0, Utc::now()))
            .await;

        let err = f
            .service
            .generate("user_1", None, GenerationRequest::new("anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::PaymentRequired(_)));
    }

    #[tokio::test]
    async fn test_generate_blocked_after_expiry() {
        let f = fixture(Arc::new(PlaceholderImageGenerator::new()));
        let mut account = CreditAccount::free_trial("user_1", None, 100, Utc::now());
        account.plan = Plan::Booster;
        account.subscription_status = SubscriptionStatus::Active;
        account.plan_expiry_date = Some(Utc::now() - Duration::seconds(1));
        f.store.force_account(account).await;

        let err = f
            .service
            .generate("user_1", None, GenerationRequest::new("anything"))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_generate_rejects_invalid_request_before_charging() {
        let f = fixture(Arc::new(PlaceholderImageGenerator::new()));
        let mut request = GenerationRequest::new("fine");
        request.height = 10_000;

        assert!(f.service.generate("user_1", None, request).await.is_err());
        assert!(f.ledger.account("user_1").await.is_err());
    }

    #[tokio::test]
    async fn test_bulk_refunds_failures_and_keeps_order() {
        let generator = Arc::new(FlakyGenerator::new());
        let f = fixture(generator.clone());

        let result = f
            .service
            .generate_bulk("user_1", None, prompts(&["one", "fail-two", "three", "fail-four"]))
            .await
            .unwrap();

        let indexes: Vec<usize> = result.results.iter().map(|r| r.index).collect();
        assert_eq!(indexes, [0, 1, 2, 3]);
        assert!(result.results[0].image.is_some());
        assert!(result.results[1].error.is_some());
        assert_eq!(result.succeeded, 2);
        assert_eq!(result.failed, 2);
        assert_eq!(result.credits_spent, 2);
        assert_eq!(result.credits_refunded, 2);
        assert_eq!(result.balance, 8);
        assert_eq!(f.ledger.account("user_1").await.unwrap().credits, 8);
        assert!(generator.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_refunds_complete_when_caller_gives_up() {
        let f = fixture(Arc::new(SlowFailingGenerator));
        let give_up = std::time::Duration::from_millis(50);

        let single = f
            .service
            .generate("user_1", None, GenerationRequest::new("storm"));
        assert!(tokio::time::timeout(give_up, single).await.is_err());

        let bulk = f
            .service
            .generate_bulk("user_1", None, prompts(&["a", "b", "c"]));
        assert!(tokio::time::timeout(give_up, bulk).await.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(800)).await;

        assert_eq!(f.ledger.account("user_1").await.unwrap().credits, 10);
        let refunds = f
            .ledger
            .ledger("user_1", 10)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.kind == EntryKind::Refund)
            .count();
        assert_eq!(refunds, 2);
    }

    #[tokio::test]
    async fn test_bulk_all_or_nothing_charge() {
        let f = fixture(Arc::new(PlaceholderImageGenerator::new()));
        f.ledger.open_account("user_1", None).await.unwrap();
        f.ledger.deduct("user_1", 7, None).await.unwrap();

        let err = f
            .service
            .generate_bulk("user_1", None, prompts(&["a", "b", "c", "d"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::PaymentRequired(_)));
        assert_eq!(f.ledger.account("user_1").await.unwrap().credits, 3);
        assert_eq!(f.gallery.count("user_1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bulk_limits() {
        let f = fixture(Arc::new(PlaceholderImageGenerator::new()));

        assert!(f.service.generate_bulk("user_1", None, prompts(&[])).await.is_err());
        assert!(
            f.service
                .generate_bulk("user_1", None, prompts(&["a", "b", "c", "d", "e", "f"]))
                .await
                .is_err()
        );

        let err = f
            .service
            .generate_bulk("user_1", None, prompts(&["ok", ""]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("prompts[1]"));
    }

    #[tokio::test]
    async fn test_paid_plan_cost_applies() {
        let store = InMemoryLedgerStore::new();
        let catalog = PlanCatalog::builder()
            .plan(Plan::FreeTrial)
            .credits(10)
            .cost_per_image(1)
            .done()
            .plan(Plan::Professional)
            .credits(100)
            .cost_per_image(3)
            .done()
            .build();
        let ledger = LedgerManager::new(Arc::new(store), catalog);
        let service = GenerationService::new(
            ledger.clone(),
            Arc::new(PlaceholderImageGenerator::new()),
            Arc::new(InMemoryGalleryStore::new()),
        );
        ledger
            .top_up("user_1", Plan::Professional, "ORDER-1", KeySource::PaymentOrder)
            .await
            .unwrap();

        let result = service
            .generate("user_1", None, GenerationRequest::new("a castle"))
            .await
            .unwrap();
        assert_eq!(result.credits_spent, 3);
        assert_eq!(result.balance, 107);
    }
}
