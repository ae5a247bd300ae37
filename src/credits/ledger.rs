//! Ledger operations: deduction, refund, top-up, and the expiry sweep.
//!
//! Writes follow an optimistic read-modify-write: read the account, check the
//! preconditions against that snapshot, and commit with a version check. A
//! lost race re-reads and re-checks, so the preconditions always hold for the
//! version that is actually written.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::account::{validate_user_id, CreditAccount, EntryKind, LedgerEntry, SubscriptionStatus};
use super::audit::{LedgerAuditEvent, LedgerAuditLogger, TracingAuditLogger};
use super::error::CreditError;
use super::plans::{Plan, PlanCatalog};
use super::storage::{ConsumedKey, KeySource, LedgerMutation, LedgerStore, MutationOutcome};
use crate::error::{ForgeError, Result};

/// Maximum number of retries for optimistic locking conflicts.
const MAX_RETRIES: u32 = 3;

/// Default length of a paid plan window.
pub const PLAN_DURATION_DAYS: i64 = 30;

/// Result of a successful deduction or refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceReceipt {
    pub user_id: String,
    pub amount: u64,
    pub balance: u64,
}

/// Result of a successful top-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopUpReceipt {
    pub user_id: String,
    pub plan: Plan,
    pub credits_added: u64,
    pub balance: u64,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of [`LedgerManager::top_up`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopUpOutcome {
    Applied(TopUpReceipt),
    /// The key had already been consumed; the balance was not touched.
    AlreadyConsumed,
}

/// Summary of one expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Active subscribers examined.
    pub scanned: usize,
    /// Subscriptions flipped to expired.
    pub expired: usize,
    /// Due subscriptions that were renewed before they could be expired.
    pub skipped: usize,
    /// Subscriptions whose update failed and will be retried next sweep.
    pub failed: usize,
}

/// Entry point for every credit balance change.
#[derive(Clone)]
pub struct LedgerManager {
    store: Arc<dyn LedgerStore>,
    catalog: PlanCatalog,
    audit: Arc<dyn LedgerAuditLogger>,
    plan_duration: Duration,
}

impl LedgerManager {
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>, catalog: PlanCatalog) -> Self {
        Self {
            store,
            catalog,
            audit: Arc::new(TracingAuditLogger),
            plan_duration: Duration::days(PLAN_DURATION_DAYS),
        }
    }

    #[must_use]
    pub fn with_audit_logger(mut self, audit: Arc<dyn LedgerAuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    #[must_use]
    pub fn with_plan_duration(mut self, duration: Duration) -> Self {
        self.plan_duration = duration;
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &PlanCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    #[must_use]
    pub fn audit_logger(&self) -> &Arc<dyn LedgerAuditLogger> {
        &self.audit
    }

    /// Open a Free Trial account on first use. Existing accounts are returned unchanged.
    pub async fn open_account(&self, user_id: &str, email: Option<String>) -> Result<CreditAccount> {
        validate_user_id(user_id)?;

        if let Some(existing) = self.store.get_account(user_id).await? {
            return Ok(existing);
        }

        let credits = self.catalog.allotment(Plan::FreeTrial);
        let account = CreditAccount::free_trial(user_id, email, credits, Utc::now());
        let entry = LedgerEntry::new(&account, EntryKind::TrialGrant, signed(credits), None);

        if self.store.insert_account(&account, &entry).await? {
            tracing::info!(user_id = %user_id, credits = credits, "credit account opened");
            self.audit
                .log(LedgerAuditEvent::AccountOpened {
                    user_id: user_id.to_string(),
                    credits,
                })
                .await;
            return Ok(account);
        }

        // Lost the insert race; the winner's row is authoritative.
        self.account(user_id).await
    }

    pub async fn account(&self, user_id: &str) -> Result<CreditAccount> {
        validate_user_id(user_id)?;
        self.load(user_id).await
    }

    pub async fn ledger(&self, user_id: &str, limit: u64) -> Result<Vec<LedgerEntry>> {
        validate_user_id(user_id)?;
        self.store.list_entries(user_id, limit).await
    }

    pub async fn is_key_consumed(&self, key: &str) -> Result<bool> {
        self.store.is_key_consumed(key).await
    }

    /// Spend `amount` credits, returning the new balance.
    ///
    /// Fails with `SubscriptionExpired` unless the account is on the Free
    /// Trial or inside an active paid window, and with `InsufficientCredits`
    /// when the balance does not cover the amount.
    pub async fn deduct(
        &self,
        user_id: &str,
        amount: u64,
        reference: Option<String>,
    ) -> Result<BalanceReceipt> {
        self.deduct_at(user_id, amount, reference, Utc::now()).await
    }

    pub async fn deduct_at(
        &self,
        user_id: &str,
        amount: u64,
        reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<BalanceReceipt> {
        validate_user_id(user_id)?;
        if amount == 0 {
            return Err(CreditError::InvalidAmount { amount }.into());
        }

        for attempt in 0..MAX_RETRIES {
            let account = self.load(user_id).await?;

            if !account.can_spend(now) {
                return Err(CreditError::SubscriptionExpired {
                    user_id: user_id.to_string(),
                }
                .into());
            }
            if account.credits < amount {
                return Err(CreditError::InsufficientCredits {
                    required: amount,
                    available: account.credits,
                }
                .into());
            }

            let mut next = account.next_version(now);
            next.credits = account.credits - amount;
            let entry = LedgerEntry::new(&next, EntryKind::Deduction, -signed(amount), reference.clone());

            match self.commit(&account, next, Some(entry), None).await? {
                MutationOutcome::Applied => {
                    let balance = account.credits - amount;
                    tracing::debug!(user_id = %user_id, amount = amount, balance = balance, "credits deducted");
                    self.audit
                        .log(LedgerAuditEvent::CreditsDeducted {
                            user_id: user_id.to_string(),
                            amount,
                            balance,
                        })
                        .await;
                    return Ok(BalanceReceipt {
                        user_id: user_id.to_string(),
                        amount,
                        balance,
                    });
                }
                MutationOutcome::VersionConflict => {
                    tracing::debug!(user_id = %user_id, attempt = attempt, "deduction lost a version race, retrying");
                }
                MutationOutcome::KeyAlreadyConsumed => {
                    return Err(ForgeError::internal("deduction reported a consumed key"));
                }
            }
        }

        Err(CreditError::ConcurrentModification {
            user_id: user_id.to_string(),
        }
        .into())
    }

    /// Give credits back, typically after a failed generation.
    ///
    /// Refunds ignore subscription state so an expiry racing a failed
    /// generation cannot swallow the user's credits.
    pub async fn refund(
        &self,
        user_id: &str,
        amount: u64,
        reference: Option<String>,
    ) -> Result<BalanceReceipt> {
        validate_user_id(user_id)?;
        if amount == 0 {
            return Err(CreditError::InvalidAmount { amount }.into());
        }

        for _attempt in 0..MAX_RETRIES {
            let account = self.load(user_id).await?;
            let now = Utc::now();

            let mut next = account.next_version(now);
            next.credits = account.credits.saturating_add(amount);
            let balance = next.credits;
            let entry = LedgerEntry::new(&next, EntryKind::Refund, signed(amount), reference.clone());

            match self.commit(&account, next, Some(entry), None).await? {
                MutationOutcome::Applied => {
                    tracing::info!(user_id = %user_id, amount = amount, balance = balance, "credits refunded");
                    self.audit
                        .log(LedgerAuditEvent::CreditsRefunded {
                            user_id: user_id.to_string(),
                            amount,
                            balance,
                        })
                        .await;
                    return Ok(BalanceReceipt {
                        user_id: user_id.to_string(),
                        amount,
                        balance,
                    });
                }
                MutationOutcome::VersionConflict => continue,
                MutationOutcome::KeyAlreadyConsumed => {
                    return Err(ForgeError::internal("refund reported a consumed key"));
                }
            }
        }

        Err(CreditError::ConcurrentModification {
            user_id: user_id.to_string(),
        }
        .into())
    }

    /// Activate `plan` for the user and add its allotment, consuming `key`.
    ///
    /// The key (a license key or payment order id) is marked consumed in the
    /// same atomic write as the balance change, so a key raises a balance at
    /// most once no matter how many times it is presented.
    pub async fn top_up(
        &self,
        user_id: &str,
        plan: Plan,
        key: &str,
        source: KeySource,
    ) -> Result<TopUpOutcome> {
        self.top_up_at(user_id, plan, key, source, Utc::now()).await
    }

    pub async fn top_up_at(
        &self,
        user_id: &str,
        plan: Plan,
        key: &str,
        source: KeySource,
        now: DateTime<Utc>,
    ) -> Result<TopUpOutcome> {
        validate_user_id(user_id)?;
        if !plan.is_purchasable() {
            return Err(CreditError::PlanNotPurchasable {
                plan: plan.to_string(),
            }
            .into());
        }
        let key = key.trim();
        if key.is_empty() {
            return Err(CreditError::InvalidLicenseKey {
                reason: "key cannot be empty".to_string(),
            }
            .into());
        }

        if self.store.is_key_consumed(key).await? {
            self.reject_key(user_id, source).await;
            return Ok(TopUpOutcome::AlreadyConsumed);
        }

        // Orders can arrive before the buyer ever called the API.
        self.open_account(user_id, None).await?;

        let allotment = self.catalog.allotment(plan);
        let expires_at = now + self.plan_duration;

        for attempt in 0..MAX_RETRIES {
            let account = self.load(user_id).await?;

            let mut next = account.next_version(now);
            next.credits = account.credits.saturating_add(allotment);
            next.plan = plan;
            next.subscription_status = SubscriptionStatus::Active;
            next.plan_expiry_date = Some(expires_at);
            let balance = next.credits;

            let entry = LedgerEntry::new(&next, EntryKind::TopUp, signed(allotment), Some(key.to_string()));
            let marker = ConsumedKey {
                key: key.to_string(),
                user_id: user_id.to_string(),
                plan,
                source,
                consumed_at: now,
            };

            match self.commit(&account, next, Some(entry), Some(marker)).await? {
                MutationOutcome::Applied => {
                    tracing::info!(
                        user_id = %user_id,
                        plan = %plan,
                        source = %source,
                        credits_added = allotment,
                        balance = balance,
                        "plan activated"
                    );
                    self.audit
                        .log(LedgerAuditEvent::PlanActivated {
                            user_id: user_id.to_string(),
                            plan,
                            credits_added: allotment,
                            source: source.to_string(),
                        })
                        .await;
                    return Ok(TopUpOutcome::Applied(TopUpReceipt {
                        user_id: user_id.to_string(),
                        plan,
                        credits_added: allotment,
                        balance,
                        expires_at,
                    }));
                }
                MutationOutcome::KeyAlreadyConsumed => {
                    self.reject_key(user_id, source).await;
                    return Ok(TopUpOutcome::AlreadyConsumed);
                }
                MutationOutcome::VersionConflict => {
                    tracing::debug!(user_id = %user_id, attempt = attempt, "top-up lost a version race, retrying");
                }
            }
        }

        Err(CreditError::ConcurrentModification {
            user_id: user_id.to_string(),
        }
        .into())
    }

    /// Expire every active subscriber whose window closed before `now`.
    ///
    /// A failure on one subscriber is logged and counted; the sweep carries on.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let subscribers = self.store.list_active_subscribers().await?;
        let mut report = SweepReport {
            scanned: subscribers.len(),
            ..SweepReport::default()
        };

        for subscriber in subscribers {
            if subscriber.plan_expiry_date.is_some_and(|exp| exp > now) {
                continue;
            }

            match self.expire_one(&subscriber.user_id, now).await {
                Ok(true) => report.expired += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        user_id = %subscriber.user_id,
                        error = %e,
                        "failed to expire subscription"
                    );
                }
            }
        }

        if report.expired > 0 || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "expiry sweep finished"
            );
        }

        Ok(report)
    }

    /// Returns `false` when the subscriber renewed before we got to them.
    async fn expire_one(&self, user_id: &str, now: DateTime<Utc>) -> Result<bool> {
        for _attempt in 0..MAX_RETRIES {
            let Some(account) = self.store.get_account(user_id).await? else {
                return Ok(false);
            };
            if !account.is_lapsed(now) {
                return Ok(false);
            }

            let mut next = account.next_version(now);
            next.subscription_status = SubscriptionStatus::Expired;

            match self.commit(&account, next, None, None).await? {
                MutationOutcome::Applied => {
                    self.audit
                        .log(LedgerAuditEvent::SubscriptionExpired {
                            user_id: user_id.to_string(),
                            plan: account.plan,
                        })
                        .await;
                    return Ok(true);
                }
                MutationOutcome::VersionConflict => continue,
                MutationOutcome::KeyAlreadyConsumed => {
                    return Err(ForgeError::internal("expiry reported a consumed key"));
                }
            }
        }

        Err(CreditError::ConcurrentModification {
            user_id: user_id.to_string(),
        }
        .into())
    }

    async fn load(&self, user_id: &str) -> Result<CreditAccount> {
        self.store.get_account(user_id).await?.ok_or_else(|| {
            CreditError::AccountNotFound {
                user_id: user_id.to_string(),
            }
            .into()
        })
    }

    async fn commit(
        &self,
        current: &CreditAccount,
        next: CreditAccount,
        entry: Option<LedgerEntry>,
        consume_key: Option<ConsumedKey>,
    ) -> Result<MutationOutcome> {
        self.store
            .apply_mutation(&LedgerMutation {
                account: next,
                expected_version: current.version,
                entry,
                consume_key,
            })
            .await
    }

    async fn reject_key(&self, user_id: &str, source: KeySource) {
        tracing::warn!(user_id = %user_id, source = %source, "key already consumed");
        self.audit
            .log(LedgerAuditEvent::KeyRejected {
                user_id: user_id.to_string(),
                source: source.to_string(),
            })
            .await;
    }
}

fn signed(amount: u64) -> i64 {
    i64::try_from(amount).unwrap_or(i64::MAX)
}
