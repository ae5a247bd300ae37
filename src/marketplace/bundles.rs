//! Bundle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// A pre-generated pack of images sold as one line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
    /// Price in minor currency units.
    pub price_cents: u32,
    pub currency: String,
    pub preview_urls: Vec<String>,
    /// Download links, only shown to buyers.
    pub asset_urls: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Bundle {
    /// Build a bundle from a validated creation request.
    #[must_use]
    pub fn from_new(new: NewBundle, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slug: new.slug.to_ascii_lowercase(),
            title: new.title.trim().to_string(),
            description: new.description,
            price_cents: new.price_cents,
            currency: new.currency.to_ascii_uppercase(),
            preview_urls: new.preview_urls,
            asset_urls: new.asset_urls,
            active: new.active,
            created_at: now,
        }
    }

    #[must_use]
    pub fn summary(&self) -> BundleSummary {
        BundleSummary {
            id: self.id.clone(),
            slug: self.slug.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            price_cents: self.price_cents,
            currency: self.currency.clone(),
            preview_urls: self.preview_urls.clone(),
            image_count: self.asset_urls.len(),
        }
    }
}

/// Public view of a bundle; never carries asset URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleSummary {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub price_cents: u32,
    pub currency: String,
    pub preview_urls: Vec<String>,
    pub image_count: usize,
}

/// What a buyer gets back from the download endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleDownload {
    pub bundle_id: String,
    pub title: String,
    pub asset_urls: Vec<String>,
}

/// Admin request to list a new bundle.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBundle {
    #[validate(length(min = 3, max = 64), custom(function = "validate_slug"))]
    pub slug: String,
    #[validate(length(min = 1, max = 120))]
    pub title: String,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
    pub price_cents: u32,
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,
    #[serde(default)]
    #[validate(custom(function = "validate_urls"))]
    pub preview_urls: Vec<String>,
    #[validate(length(min = 1, max = 500), custom(function = "validate_urls"))]
    pub asset_urls: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_active() -> bool {
    true
}

fn validate_slug(slug: &str) -> Result<(), ValidationError> {
    let valid = slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !slug.starts_with('-')
        && !slug.ends_with('-');

    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("slug")
            .with_message("must contain only letters, digits and inner hyphens".into()))
    }
}

fn validate_urls(urls: &[String]) -> Result<(), ValidationError> {
    if urls
        .iter()
        .all(|u| u.starts_with("https://") || u.starts_with("http://"))
    {
        Ok(())
    } else {
        Err(ValidationError::new("url").with_message("must be absolute http(s) URLs".into()))
    }
}

/// A recorded bundle sale, keyed by the payment order that paid for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundlePurchase {
    pub order_id: String,
    pub user_id: String,
    pub bundle_id: String,
    pub purchased_at: DateTime<Utc>,
}
