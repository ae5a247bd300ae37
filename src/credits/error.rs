//! Ledger-specific error types.
//!
//! Converted to [`ForgeError`](crate::ForgeError) at the HTTP boundary so each
//! failure maps onto a meaningful status code.

use std::fmt;

/// Errors raised by the credit ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditError {
    /// The user id is empty, too long, or contains unexpected characters.
    InvalidUserId { id: String, reason: String },
    /// Deduction and refund amounts must be positive.
    InvalidAmount { amount: u64 },
    /// The plan name is not one of the known tiers.
    UnknownPlan { plan: String },
    /// Free Trial cannot be bought or activated.
    PlanNotPurchasable { plan: String },
    /// No ledger account exists for the user.
    AccountNotFound { user_id: String },
    /// The balance does not cover the requested amount.
    InsufficientCredits { required: u64, available: u64 },
    /// The paid plan window has lapsed.
    SubscriptionExpired { user_id: String },
    /// The license key or order id was already redeemed.
    KeyAlreadyConsumed { key: String },
    /// The license key is malformed or unknown to the provider.
    InvalidLicenseKey { reason: String },
    /// Optimistic writes kept losing to concurrent writers.
    ConcurrentModification { user_id: String },
    InvalidWebhookSignature,
    WebhookTimestampExpired { age_seconds: u64 },
    InvalidWebhookPayload { message: String },
}

impl fmt::Display for CreditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUserId { id, reason } => {
                write!(f, "Invalid user id '{}': {}", id, reason)
            }
            Self::InvalidAmount { amount } => {
                write!(f, "Invalid credit amount: {}", amount)
            }
            Self::UnknownPlan { plan } => write!(f, "Unknown plan: {}", plan),
            Self::PlanNotPurchasable { plan } => {
                write!(f, "Plan '{}' cannot be activated", plan)
            }
            Self::AccountNotFound { user_id } => {
                write!(f, "No credit account for '{}'", user_id)
            }
            Self::InsufficientCredits { required, available } => {
                write!(
                    f,
                    "Insufficient credits: {} required, {} available",
                    required, available
                )
            }
            Self::SubscriptionExpired { user_id } => {
                write!(f, "Subscription for '{}' has expired", user_id)
            }
            Self::KeyAlreadyConsumed { key } => {
                write!(f, "Key '{}' has already been redeemed", key)
            }
            Self::InvalidLicenseKey { reason } => {
                write!(f, "Invalid license key: {}", reason)
            }
            Self::ConcurrentModification { user_id } => {
                write!(
                    f,
                    "Concurrent modification detected for '{}', please retry",
                    user_id
                )
            }
            Self::InvalidWebhookSignature => write!(f, "Invalid webhook signature"),
            Self::WebhookTimestampExpired { age_seconds } => {
                write!(f, "Webhook timestamp expired ({} seconds old)", age_seconds)
            }
            Self::InvalidWebhookPayload { message } => {
                write!(f, "Invalid webhook payload: {}", message)
            }
        }
    }
}

impl std::error::Error for CreditError {}

impl From<CreditError> for crate::error::ForgeError {
    fn from(err: CreditError) -> Self {
        use crate::error::ForgeError;

        match &err {
            CreditError::AccountNotFound { .. } => ForgeError::NotFound(err.to_string()),

            CreditError::InsufficientCredits { .. } => {
                ForgeError::PaymentRequired(err.to_string())
            }

            CreditError::SubscriptionExpired { .. } => ForgeError::Forbidden(err.to_string()),

            CreditError::KeyAlreadyConsumed { .. }
            | CreditError::ConcurrentModification { .. } => {
                ForgeError::Conflict(err.to_string())
            }

            CreditError::InvalidUserId { .. }
            | CreditError::InvalidAmount { .. }
            | CreditError::UnknownPlan { .. }
            | CreditError::PlanNotPurchasable { .. }
            | CreditError::InvalidLicenseKey { .. }
            | CreditError::InvalidWebhookSignature
            | CreditError::WebhookTimestampExpired { .. }
            | CreditError::InvalidWebhookPayload { .. } => {
                ForgeError::BadRequest(err.to_string())
            }
        }
    }
}

impl CreditError {
    /// Whether the caller may simply try again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification { .. })
    }
}
