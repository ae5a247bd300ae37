//! Plan tiers and their credit terms.
//!
//! Every plan carries a fixed credit allotment, granted on each top-up, and a
//! per-image cost charged on each generation.
//!
//! ```rust,ignore
//! use promptforge::credits::{Plan, PlanCatalog};
//!
//! let catalog = PlanCatalog::builder()
//!     .plan(Plan::Booster)
//!         .credits(120)
//!         .cost_per_image(1)
//!         .done()
//!     .build();
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::error::CreditError;

/// A plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plan {
    #[serde(rename = "Free Trial", alias = "free_trial")]
    FreeTrial,
    #[serde(alias = "booster")]
    Booster,
    #[serde(alias = "premium")]
    Premium,
    #[serde(alias = "professional")]
    Professional,
}

impl Plan {
    pub const ALL: [Plan; 4] = [
        Plan::FreeTrial,
        Plan::Booster,
        Plan::Premium,
        Plan::Professional,
    ];

    /// Display name, also the persisted form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::FreeTrial => "Free Trial",
            Self::Booster => "Booster",
            Self::Premium => "Premium",
            Self::Professional => "Professional",
        }
    }

    /// Only paid tiers can be activated by a key or an order.
    #[must_use]
    pub const fn is_purchasable(&self) -> bool {
        !matches!(self, Self::FreeTrial)
    }

    /// Parse a display name or snake_case slug, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "freetrial" | "free" | "trial" => Some(Self::FreeTrial),
            "booster" => Some(Self::Booster),
            "premium" => Some(Self::Premium),
            "professional" | "pro" => Some(Self::Professional),
            _ => None,
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = CreditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CreditError::UnknownPlan {
            plan: s.to_string(),
        })
    }
}

/// Credit terms for one plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanTerms {
    pub plan: Plan,
    /// Credits added on each activation.
    pub credits: u64,
    /// Credits charged per generated image.
    pub cost_per_image: u64,
    /// List price in minor currency units, informational only.
    pub price_cents: u32,
}

/// The set of plans the service sells.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    terms: HashMap<Plan, PlanTerms>,
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::builder()
            .plan(Plan::FreeTrial)
            .credits(10)
            .cost_per_image(1)
            .done()
            .plan(Plan::Booster)
            .credits(100)
            .cost_per_image(1)
            .price_cents(499)
            .done()
            .plan(Plan::Premium)
            .credits(500)
            .cost_per_image(1)
            .price_cents(1999)
            .done()
            .plan(Plan::Professional)
            .credits(1500)
            .cost_per_image(1)
            .price_cents(4999)
            .done()
            .build()
    }
}

impl PlanCatalog {
    #[must_use]
    pub fn builder() -> PlanCatalogBuilder {
        PlanCatalogBuilder::default()
    }

    /// Terms for a plan. Plans missing from a custom catalog fall back to
    /// one credit per image and no allotment.
    #[must_use]
    pub fn terms(&self, plan: Plan) -> PlanTerms {
        self.terms.get(&plan).copied().unwrap_or(PlanTerms {
            plan,
            credits: 0,
            cost_per_image: 1,
            price_cents: 0,
        })
    }

    /// Replace the credit allotment of one plan, keeping its other terms.
    #[must_use]
    pub fn with_allotment(mut self, plan: Plan, credits: u64) -> Self {
        let terms = PlanTerms {
            credits,
            ..self.terms(plan)
        };
        self.terms.insert(plan, terms);
        self
    }

    #[must_use]
    pub fn allotment(&self, plan: Plan) -> u64 {
        self.terms(plan).credits
    }

    #[must_use]
    pub fn cost_for(&self, plan: Plan, images: u64) -> u64 {
        self.terms(plan).cost_per_image.saturating_mul(images)
    }

    /// All configured plans in tier order.
    #[must_use]
    pub fn list(&self) -> Vec<PlanTerms> {
        Plan::ALL
            .iter()
            .filter_map(|p| self.terms.get(p).copied())
            .collect()
    }
}

/// Builder for [`PlanCatalog`].
#[derive(Debug, Default)]
#[must_use = "builder does nothing until you call build()"]
pub struct PlanCatalogBuilder {
    terms: HashMap<Plan, PlanTerms>,
}

impl PlanCatalogBuilder {
    pub fn plan(self, plan: Plan) -> PlanTermsBuilder {
        PlanTermsBuilder {
            parent: self,
            terms: PlanTerms {
                plan,
                credits: 0,
                cost_per_image: 1,
                price_cents: 0,
            },
        }
    }

    #[must_use]
    pub fn build(self) -> PlanCatalog {
        PlanCatalog { terms: self.terms }
    }
}

/// Builder for a single plan's terms.
#[must_use = "call done() to add the plan to the catalog"]
pub struct PlanTermsBuilder {
    parent: PlanCatalogBuilder,
    terms: PlanTerms,
}

impl PlanTermsBuilder {
    pub fn credits(mut self, credits: u64) -> Self {
        self.terms.credits = credits;
        self
    }

    pub fn cost_per_image(mut self, cost: u64) -> Self {
        self.terms.cost_per_image = cost;
        self
    }

    pub fn price_cents(mut self, price: u32) -> Self {
        self.terms.price_cents = price;
        self
    }

    pub fn done(mut self) -> PlanCatalogBuilder {
        self.parent.terms.insert(self.terms.plan, self.terms);
        self.parent
    }
}
