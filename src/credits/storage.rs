//! Storage contract for the credit ledger.
//!
//! Every balance change goes through [`LedgerStore::apply_mutation`], which
//! must commit the account write, the active-subscriber set, the consumed key
//! marker, and the history entry as one atomic unit, or none of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use super::account::{CreditAccount, LedgerEntry, SubscriptionStatus};
use super::plans::Plan;
use crate::error::Result;

/// Where a consumed idempotency key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    License,
    PaymentOrder,
}

impl KeySource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::License => "license",
            Self::PaymentOrder => "payment_order",
        }
    }
}

impl fmt::Display for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker proving a key has raised a balance once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedKey {
    pub key: String,
    pub user_id: String,
    pub plan: Plan,
    pub source: KeySource,
    pub consumed_at: DateTime<Utc>,
}

/// An entry of the active-subscriber set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubscriber {
    pub user_id: String,
    pub plan_expiry_date: Option<DateTime<Utc>>,
}

/// A single atomic write against one account.
#[derive(Debug, Clone)]
pub struct LedgerMutation {
    /// The account as it should look after the write.
    pub account: CreditAccount,
    /// Version the caller read; the write fails if the stored row moved on.
    pub expected_version: u64,
    pub entry: Option<LedgerEntry>,
    /// Key to mark consumed in the same write.
    pub consume_key: Option<ConsumedKey>,
}

/// Result of [`LedgerStore::apply_mutation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    Applied,
    /// Another writer changed the account first; re-read and retry.
    VersionConflict,
    /// The key was consumed earlier; nothing was written.
    KeyAlreadyConsumed,
}

/// Persistence for ledger accounts, history, and idempotency markers.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_account(&self, user_id: &str) -> Result<Option<CreditAccount>>;

    /// Insert a new account with its opening entry.
    ///
    /// Returns `false` when an account already exists for the user.
    async fn insert_account(&self, account: &CreditAccount, entry: &LedgerEntry) -> Result<bool>;

    async fn apply_mutation(&self, mutation: &LedgerMutation) -> Result<MutationOutcome>;

    async fn list_active_subscribers(&self) -> Result<Vec<ActiveSubscriber>>;

    async fn is_key_consumed(&self, key: &str) -> Result<bool>;

    /// Most recent entries first.
    async fn list_entries(&self, user_id: &str, limit: u64) -> Result<Vec<LedgerEntry>>;

    async fn is_event_processed(&self, event_id: &str) -> Result<bool>;

    async fn mark_event_processed(&self, event_id: &str) -> Result<()>;

    /// Cheap round trip used by the health check.
    async fn ping(&self) -> Result<()>;
}

/// Whether an account belongs in the active-subscriber set.
#[must_use]
pub fn belongs_in_active_set(account: &CreditAccount) -> bool {
    account.subscription_status == SubscriptionStatus::Active
}

pub mod memory {
    //! In-memory ledger store for development and tests.

    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// In-memory ledger store.
    ///
    /// One lock guards every table so a mutation is observed whole or not at all.
    #[derive(Default, Clone)]
    pub struct InMemoryLedgerStore {
        inner: Arc<RwLock<LedgerTables>>,
    }

    #[derive(Default)]
    struct LedgerTables {
        accounts: HashMap<String, CreditAccount>,
        active: HashMap<String, Option<DateTime<Utc>>>,
        consumed_keys: HashMap<String, ConsumedKey>,
        entries: Vec<LedgerEntry>,
        processed_events: HashSet<String>,
    }

    impl LedgerTables {
        fn sync_active_set(&mut self, account: &CreditAccount) {
            if belongs_in_active_set(account) {
                self.active
                    .insert(account.user_id.clone(), account.plan_expiry_date);
            } else {
                self.active.remove(&account.user_id);
            }
        }
    }

    impl InMemoryLedgerStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Look up a consumed key marker.
        pub async fn consumed_key(&self, key: &str) -> Option<ConsumedKey> {
            self.inner.read().await.consumed_keys.get(key).cloned()
        }

        /// Overwrite an account without version checks, for test setup.
        pub async fn force_account(&self, account: CreditAccount) {
            let mut tables = self.inner.write().await;
            tables.sync_active_set(&account);
            tables.accounts.insert(account.user_id.clone(), account);
        }
    }

    #[async_trait]
    impl LedgerStore for InMemoryLedgerStore {
        async fn get_account(&self, user_id: &str) -> Result<Option<CreditAccount>> {
            Ok(self.inner.read().await.accounts.get(user_id).cloned())
        }

        async fn insert_account(
            &self,
            account: &CreditAccount,
            entry: &LedgerEntry,
        ) -> Result<bool> {
            let mut tables = self.inner.write().await;
            if tables.accounts.contains_key(&account.user_id) {
                return Ok(false);
            }
            tables.sync_active_set(account);
            tables
                .accounts
                .insert(account.user_id.clone(), account.clone());
            tables.entries.push(entry.clone());
            Ok(true)
        }

        async fn apply_mutation(&self, mutation: &LedgerMutation) -> Result<MutationOutcome> {
            let mut tables = self.inner.write().await;

            if let Some(key) = &mutation.consume_key {
                if tables.consumed_keys.contains_key(&key.key) {
                    return Ok(MutationOutcome::KeyAlreadyConsumed);
                }
            }

            let user_id = &mutation.account.user_id;
            let current_version = tables.accounts.get(user_id).map(|a| a.version);
            if current_version != Some(mutation.expected_version) {
                return Ok(MutationOutcome::VersionConflict);
            }

            if let Some(key) = &mutation.consume_key {
                tables.consumed_keys.insert(key.key.clone(), key.clone());
            }
            tables.sync_active_set(&mutation.account);
            tables
                .accounts
                .insert(user_id.clone(), mutation.account.clone());
            if let Some(entry) = &mutation.entry {
                tables.entries.push(entry.clone());
            }

            Ok(MutationOutcome::Applied)
        }

        async fn list_active_subscribers(&self) -> Result<Vec<ActiveSubscriber>> {
            let tables = self.inner.read().await;
            let mut subscribers: Vec<ActiveSubscriber> = tables
                .active
                .iter()
                .map(|(user_id, expiry)| ActiveSubscriber {
                    user_id: user_id.clone(),
                    plan_expiry_date: *expiry,
                })
                .collect();
            subscribers.sort_by(|a, b| a.user_id.cmp(&b.user_id));
            Ok(subscribers)
        }

        async fn is_key_consumed(&self, key: &str) -> Result<bool> {
            Ok(self.inner.read().await.consumed_keys.contains_key(key))
        }

        async fn list_entries(&self, user_id: &str, limit: u64) -> Result<Vec<LedgerEntry>> {
            let limit = usize::try_from(limit).unwrap_or(usize::MAX);
            Ok(self
                .inner
                .read()
                .await
                .entries
                .iter()
                .rev()
                .filter(|e| e.user_id == user_id)
                .take(limit)
                .cloned()
                .collect())
        }

        async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
            Ok(self.inner.read().await.processed_events.contains(event_id))
        }

        async fn mark_event_processed(&self, event_id: &str) -> Result<()> {
            self.inner
                .write()
                .await
                .processed_events
                .insert(event_id.to_string());
            Ok(())
        }

        async fn ping(&self) -> Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::InMemoryLedgerStore;
    use super::*;
    use crate::credits::account::EntryKind;
    use chrono::Duration;

    fn opened(user_id: &str) -> (CreditAccount, LedgerEntry) {
        let account = CreditAccount::free_trial(user_id, None, 10, Utc::now());
        let entry = LedgerEntry::new(&account, EntryKind::TrialGrant, 10, None);
        (account, entry)
    }

    #[tokio::test]
    async fn test_insert_account_is_idempotent() {
        let store = InMemoryLedgerStore::new();
        let (account, entry) = opened("user_1");

        assert!(store.insert_account(&account, &entry).await.unwrap());
        assert!(!store.insert_account(&account, &entry).await.unwrap());
        assert_eq!(store.list_entries("user_1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_apply_mutation_checks_version() {
        let store = InMemoryLedgerStore::new();
        let (account, entry) = opened("user_1");
        store.insert_account(&account, &entry).await.unwrap();

        let mut next = account.next_version(Utc::now());
        next.credits = 9;
        let mutation = LedgerMutation {
            account: next.clone(),
            expected_version: account.version,
            entry: None,
            consume_key: None,
        };

        assert_eq!(
            store.apply_mutation(&mutation).await.unwrap(),
            MutationOutcome::Applied
        );
        // Same expected version again: the row has moved on.
        assert_eq!(
            store.apply_mutation(&mutation).await.unwrap(),
            MutationOutcome::VersionConflict
        );
        assert_eq!(store.get_account("user_1").await.unwrap().unwrap().credits, 9);
    }

    #[tokio::test]
    async fn test_apply_mutation_consumes_key_once() {
        let store = InMemoryLedgerStore::new();
        let (account, entry) = opened("user_1");
        store.insert_account(&account, &entry).await.unwrap();

        let now = Utc::now();
        let mut next = account.next_version(now);
        next.plan = Plan::Booster;
        next.subscription_status = SubscriptionStatus::Active;
        next.plan_expiry_date = Some(now + Duration::days(30));
        next.credits += 100;

        let key = ConsumedKey {
            key: "AAAA-BBBB-CCCC-DDDD".to_string(),
            user_id: "user_1".to_string(),
            plan: Plan::Booster,
            source: KeySource::License,
            consumed_at: now,
        };
        let mutation = LedgerMutation {
            account: next.clone(),
            expected_version: account.version,
            entry: None,
            consume_key: Some(key.clone()),
        };

        assert_eq!(
            store.apply_mutation(&mutation).await.unwrap(),
            MutationOutcome::Applied
        );

        let retry = LedgerMutation {
            expected_version: next.version,
            account: next.next_version(now),
            ..mutation
        };
        assert_eq!(
            store.apply_mutation(&retry).await.unwrap(),
            MutationOutcome::KeyAlreadyConsumed
        );
        assert!(store.is_key_consumed("AAAA-BBBB-CCCC-DDDD").await.unwrap());
        assert_eq!(store.consumed_key(&key.key).await.unwrap().plan, Plan::Booster);
    }

    #[tokio::test]
    async fn test_active_set_follows_status() {
        let store = InMemoryLedgerStore::new();
        let (account, entry) = opened("user_1");
        store.insert_account(&account, &entry).await.unwrap();
        assert!(store.list_active_subscribers().await.unwrap().is_empty());

        let now = Utc::now();
        let mut active = account.next_version(now);
        active.subscription_status = SubscriptionStatus::Active;
        active.plan_expiry_date = Some(now + Duration::days(30));
        store
            .apply_mutation(&LedgerMutation {
                account: active.clone(),
                expected_version: account.version,
                entry: None,
                consume_key: None,
            })
            .await
            .unwrap();

        let subscribers = store.list_active_subscribers().await.unwrap();
        assert_eq!(subscribers.len(), 1);
        assert_eq!(subscribers[0].plan_expiry_date, active.plan_expiry_date);

        let mut expired = active.next_version(now);
        expired.subscription_status = SubscriptionStatus::Expired;
        store
            .apply_mutation(&LedgerMutation {
                account: expired,
                expected_version: active.version,
                entry: None,
                consume_key: None,
            })
            .await
            .unwrap();
        assert!(store.list_active_subscribers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_newest_first() {
        let store = InMemoryLedgerStore::new();
        let (account, entry) = opened("user_1");
        store.insert_account(&account, &entry).await.unwrap();

        let mut next = account.next_version(Utc::now());
        next.credits = 8;
        let deduction = LedgerEntry::new(&next, EntryKind::Deduction, -2, Some("gen_1".into()));
        store
            .apply_mutation(&LedgerMutation {
                account: next,
                expected_version: account.version,
                entry: Some(deduction),
                consume_key: None,
            })
            .await
            .unwrap();

        let entries = store.list_entries("user_1", 10).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].kind, EntryKind::Deduction);
        assert_eq!(entries[1].kind, EntryKind::TrialGrant);

        assert_eq!(store.list_entries("user_1", 1).await.unwrap().len(), 1);
        assert!(store.list_entries("someone_else", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_processed_events() {
        let store = InMemoryLedgerStore::new();
        assert!(!store.is_event_processed("evt_1").await.unwrap());
        store.mark_event_processed("evt_1").await.unwrap();
        store.mark_event_processed("evt_1").await.unwrap();
        assert!(store.is_event_processed("evt_1").await.unwrap());
    }
}
