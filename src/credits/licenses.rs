//! License keys: one-time tokens that activate a paid plan.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::error::CreditError;
use super::ledger::{LedgerManager, TopUpOutcome, TopUpReceipt};
use super::plans::Plan;
use super::storage::KeySource;
use crate::error::{ForgeError, Result};

const SEGMENTS: usize = 4;
const SEGMENT_LEN: usize = 4;

/// A normalized `XXXX-XXXX-XXXX-XXXX` key (uppercase hex).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Parse user input, tolerating lowercase and surrounding whitespace.
    pub fn parse(input: &str) -> std::result::Result<Self, CreditError> {
        let normalized = input.trim().to_ascii_uppercase();
        let segments: Vec<&str> = normalized.split('-').collect();

        let well_formed = segments.len() == SEGMENTS
            && segments
                .iter()
                .all(|s| s.len() == SEGMENT_LEN && s.chars().all(|c| c.is_ascii_hexdigit()));

        if !well_formed {
            return Err(CreditError::InvalidLicenseKey {
                reason: "expected format XXXX-XXXX-XXXX-XXXX".to_string(),
            });
        }

        Ok(Self(normalized))
    }

    /// Mint a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let hex = uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase();
        let segments: Vec<&str> = (0..SEGMENTS)
            .map(|i| &hex[i * SEGMENT_LEN..(i + 1) * SEGMENT_LEN])
            .collect();
        Self(segments.join("-"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves a license key to the plan it was sold for.
///
/// Verifiers answer "what did this key buy", not "has it been used":
/// single use is enforced by the ledger when the key is consumed.
#[async_trait]
pub trait LicenseVerifier: Send + Sync {
    /// `Ok(None)` means the key is unknown or the purchase was reversed.
    async fn verify(&self, key: &LicenseKey) -> Result<Option<Plan>>;
}

/// In-process key table for development and tests.
#[derive(Clone, Default)]
pub struct StaticLicenseVerifier {
    keys: Arc<RwLock<HashMap<LicenseKey, Plan>>>,
}

impl StaticLicenseVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: LicenseKey, plan: Plan) {
        self.keys.write().await.insert(key, plan);
    }

    /// Create and register a new key for `plan`.
    pub async fn mint(&self, plan: Plan) -> LicenseKey {
        let key = LicenseKey::generate();
        self.insert(key.clone(), plan).await;
        key
    }
}

#[async_trait]
impl LicenseVerifier for StaticLicenseVerifier {
    async fn verify(&self, key: &LicenseKey) -> Result<Option<Plan>> {
        Ok(self.keys.read().await.get(key).copied())
    }
}

#[derive(Serialize)]
struct VerifyRequest<'a> {
    product_id: &'a str,
    license_key: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    success: bool,
    #[serde(default)]
    purchase: Option<Purchase>,
}

#[derive(Deserialize)]
struct Purchase {
    #[serde(default)]
    variants: String,
    #[serde(default)]
    refunded: bool,
    #[serde(default)]
    chargebacked: bool,
}

/// Verifies keys against a storefront's license API.
pub struct HttpLicenseVerifier {
    client: Client,
    verify_url: String,
    product_id: String,
}

impl HttpLicenseVerifier {
    pub fn new(verify_url: impl Into<String>, product_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ForgeError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            verify_url: verify_url.into(),
            product_id: product_id.into(),
        })
    }
}

#[async_trait]
impl LicenseVerifier for HttpLicenseVerifier {
    async fn verify(&self, key: &LicenseKey) -> Result<Option<Plan>> {
        let response = self
            .client
            .post(&self.verify_url)
            .json(&VerifyRequest {
                product_id: &self.product_id,
                license_key: key.as_str(),
            })
            .send()
            .await?;

        // Storefronts answer 404 for unknown keys.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: VerifyResponse = response.error_for_status()?.json().await?;
        if !body.success {
            return Ok(None);
        }

        let Some(purchase) = body.purchase else {
            return Ok(None);
        };
        if purchase.refunded || purchase.chargebacked {
            tracing::warn!(key = %key, "license key belongs to a reversed purchase");
            return Ok(None);
        }

        Ok(plan_from_variants(&purchase.variants))
    }
}

/// Match a storefront variant label such as `"(Premium)"` to a plan.
fn plan_from_variants(variants: &str) -> Option<Plan> {
    let label = variants.to_ascii_lowercase();
    Plan::ALL
        .iter()
        .copied()
        .filter(|p| p.is_purchasable())
        .find(|p| label.contains(&p.as_str().to_ascii_lowercase()))
}

/// Verify `raw_key` and activate the plan it was sold for.
///
/// Unknown keys are a 400; keys that were already redeemed are a 409.
pub async fn activate(
    ledger: &LedgerManager,
    verifier: &dyn LicenseVerifier,
    user_id: &str,
    raw_key: &str,
) -> Result<TopUpReceipt> {
    let key = LicenseKey::parse(raw_key)?;

    if ledger.is_key_consumed(key.as_str()).await? {
        return Err(CreditError::KeyAlreadyConsumed {
            key: key.to_string(),
        }
        .into());
    }

    let Some(plan) = verifier.verify(&key).await? else {
        return Err(CreditError::InvalidLicenseKey {
            reason: "key not recognized".to_string(),
        }
        .into());
    };

    match ledger
        .top_up(user_id, plan, key.as_str(), KeySource::License)
        .await?
    {
        TopUpOutcome::Applied(receipt) => Ok(receipt),
        TopUpOutcome::AlreadyConsumed => Err(CreditError::KeyAlreadyConsumed {
            key: key.to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credits::plans::PlanCatalog;
    use crate::credits::storage::memory::InMemoryLedgerStore;

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let key = LicenseKey::parse("  ab12-cd34-ef56-0789 \n").unwrap();
        assert_eq!(key.as_str(), "AB12-CD34-EF56-0789");
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        for bad in ["", "AB12-CD34-EF56", "AB12-CD34-EF56-07891", "GHIJ-CD34-EF56-0789", "AB12CD34EF560789"] {
            assert!(LicenseKey::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_generated_keys_parse() {
        let key = LicenseKey::generate();
        assert_eq!(LicenseKey::parse(key.as_str()).unwrap(), key);
        assert_ne!(LicenseKey::generate(), key);
    }

    #[test]
    fn test_plan_from_variants() {
        assert_eq!(plan_from_variants("(Premium)"), Some(Plan::Premium));
        assert_eq!(plan_from_variants("professional - monthly"), Some(Plan::Professional));
        assert_eq!(plan_from_variants("Free Trial"), None);
        assert_eq!(plan_from_variants(""), None);
    }

    fn ledger() -> LedgerManager {
        LedgerManager::new(Arc::new(InMemoryLedgerStore::new()), PlanCatalog::default())
    }

    #[tokio::test]
    async fn test_activate_tops_up_once() {
        let ledger = ledger();
        let verifier = StaticLicenseVerifier::new();
        let key = verifier.mint(Plan::Booster).await;

        let receipt = activate(&ledger, &verifier, "user_1", &key.as_str().to_lowercase())
            .await
            .unwrap();
        assert_eq!(receipt.plan, Plan::Booster);
        assert_eq!(receipt.balance, 110);

        let err = activate(&ledger, &verifier, "user_1", key.as_str())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Conflict(_)));
        assert_eq!(ledger.account("user_1").await.unwrap().credits, 110);
    }

    #[tokio::test]
    async fn test_activate_rejects_unknown_key() {
        let ledger = ledger();
        let verifier = StaticLicenseVerifier::new();

        let err = activate(&ledger, &verifier, "user_1", "AAAA-BBBB-CCCC-DDDD")
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::BadRequest(_)));
    }
}
