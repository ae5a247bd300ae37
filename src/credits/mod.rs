//! Credit ledger: balances, plan activation, and subscription expiry.
//!
//! Every user has one [`CreditAccount`]. Generating images spends credits,
//! license keys and payment orders add a plan's allotment, and the expiry
//! sweep closes paid windows that have run out. All balance changes go
//! through [`LedgerManager`], which retries optimistic writes against a
//! [`LedgerStore`].
//!
//! ```rust,ignore
//! use promptforge::credits::{LedgerManager, PlanCatalog, InMemoryLedgerStore};
//!
//! let ledger = LedgerManager::new(Arc::new(InMemoryLedgerStore::new()), PlanCatalog::default());
//! ledger.open_account("user_1", None).await?;
//! let receipt = ledger.deduct("user_1", 4, None).await?;
//! ```

mod account;
pub mod audit;
mod error;
mod ledger;
pub mod licenses;
mod plans;
pub mod sea_orm_store;
mod storage;

pub use account::{CreditAccount, EntryKind, LedgerEntry, SubscriptionStatus, validate_user_id};
pub use audit::{LedgerAuditEvent, LedgerAuditLogger, NoOpAuditLogger, TracingAuditLogger};
pub use error::CreditError;
pub use ledger::{
    BalanceReceipt, LedgerManager, PLAN_DURATION_DAYS, SweepReport, TopUpOutcome, TopUpReceipt,
};
pub use licenses::{
    HttpLicenseVerifier, LicenseKey, LicenseVerifier, StaticLicenseVerifier, activate,
};
pub use plans::{Plan, PlanCatalog, PlanCatalogBuilder, PlanTerms, PlanTermsBuilder};
pub use sea_orm_store::SeaOrmLedgerStore;
pub use storage::memory::InMemoryLedgerStore;
pub use storage::{
    ActiveSubscriber, ConsumedKey, KeySource, LedgerMutation, LedgerStore, MutationOutcome,
    belongs_in_active_set,
};
