//! The per-user ledger record and its history entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::CreditError;
use super::plans::Plan;

const MAX_USER_ID_LENGTH: usize = 128;

/// Whether a user may keep generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    FreeTrial,
}

impl SubscriptionStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::FreeTrial => "free_trial",
        }
    }

    /// Parse the persisted form. Unknown values read as expired so a corrupt
    /// row can never grant access.
    #[must_use]
    pub fn from_db(value: &str) -> Self {
        match value {
            "active" => Self::Active,
            "free_trial" => Self::FreeTrial,
            _ => Self::Expired,
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's credit balance and plan state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditAccount {
    pub user_id: String,
    pub email: Option<String>,
    pub credits: u64,
    pub plan: Plan,
    pub subscription_status: SubscriptionStatus,
    pub plan_expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write; the compare-and-swap token.
    pub version: u64,
}

impl CreditAccount {
    /// A fresh Free Trial account.
    #[must_use]
    pub fn free_trial(
        user_id: impl Into<String>,
        email: Option<String>,
        credits: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email,
            credits,
            plan: Plan::FreeTrial,
            subscription_status: SubscriptionStatus::FreeTrial,
            plan_expiry_date: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Free Trial users may always spend; paid users only inside their window.
    #[must_use]
    pub fn can_spend(&self, now: DateTime<Utc>) -> bool {
        match self.subscription_status {
            SubscriptionStatus::FreeTrial => true,
            SubscriptionStatus::Active => self.plan_expiry_date.is_some_and(|exp| exp > now),
            SubscriptionStatus::Expired => false,
        }
    }

    /// An active subscriber whose window has closed.
    #[must_use]
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.subscription_status == SubscriptionStatus::Active
            && self.plan_expiry_date.is_none_or(|exp| exp <= now)
    }

    /// Copy with the next version and a new timestamp, ready to be written.
    #[must_use]
    pub fn next_version(&self, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.updated_at = now;
        next
    }
}

/// What kind of balance change an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    TrialGrant,
    Deduction,
    Refund,
    TopUp,
}

impl EntryKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TrialGrant => "trial_grant",
            Self::Deduction => "deduction",
            Self::Refund => "refund",
            Self::TopUp => "top_up",
        }
    }

    #[must_use]
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "trial_grant" => Some(Self::TrialGrant),
            "deduction" => Some(Self::Deduction),
            "refund" => Some(Self::Refund),
            "top_up" => Some(Self::TopUp),
            _ => None,
        }
    }
}

/// One row of a user's credit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub user_id: String,
    pub kind: EntryKind,
    /// Signed change applied to the balance.
    pub delta: i64,
    pub balance_after: u64,
    /// Generation id, license key, or order id.
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    #[must_use]
    pub fn new(
        account: &CreditAccount,
        kind: EntryKind,
        delta: i64,
        reference: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: account.user_id.clone(),
            kind,
            delta,
            balance_after: account.credits,
            reference,
            created_at: account.updated_at,
        }
    }
}

/// Validate a user id taken from an identity token.
///
/// Ids must be non-empty, at most 128 characters, and limited to
/// alphanumerics plus `_ - | . @ :` which covers the common provider formats.
pub fn validate_user_id(id: &str) -> Result<(), CreditError> {
    let reason = if id.is_empty() {
        Some("user id cannot be empty")
    } else if id.len() > MAX_USER_ID_LENGTH {
        Some("user id is too long")
    } else if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '|' | '.' | '@' | ':'))
    {
        Some("user id contains invalid characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(CreditError::InvalidUserId {
            id: id.chars().take(MAX_USER_ID_LENGTH).collect(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
