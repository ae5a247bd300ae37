//! SeaORM-backed ledger storage.
//!
//! `apply_mutation` runs in one transaction: claim the idempotency key with an
//! `INSERT ... ON CONFLICT DO NOTHING`, update the account row only if its
//! version still matches, sync the active-subscriber row, append the history
//! entry, then commit. Any failed step rolls the whole write back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    entity::prelude::*, sea_query::OnConflict, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};

use super::account::{CreditAccount, EntryKind, LedgerEntry, SubscriptionStatus};
use super::plans::Plan;
use super::storage::{
    belongs_in_active_set, ActiveSubscriber, ConsumedKey, LedgerMutation, LedgerStore,
    MutationOutcome,
};
use crate::error::{ForgeError, Result};

pub(crate) mod entity {
    pub mod credit_account {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "credit_accounts")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub user_id: String,
            pub email: Option<String>,
            pub credits: i64,
            pub plan: String,
            pub subscription_status: String,
            pub plan_expiry_date: Option<DateTimeWithTimeZone>,
            /// Compare-and-swap token, bumped on every write.
            pub version: i64,
            pub created_at: DateTimeWithTimeZone,
            pub updated_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod active_subscriber {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "active_subscribers")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub user_id: String,
            pub plan_expiry_date: Option<DateTimeWithTimeZone>,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod consumed_key {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "consumed_keys")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub key: String,
            pub user_id: String,
            pub plan: String,
            pub source: String,
            pub consumed_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod ledger_entry {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "ledger_entries")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub user_id: String,
            /// Account version this entry produced; orders a user's history.
            pub account_version: i64,
            pub kind: String,
            pub delta: i64,
            pub balance_after: i64,
            pub reference: Option<String>,
            pub created_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod processed_webhook_event {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "processed_webhook_events")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub event_id: String,
            pub processed_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{active_subscriber, consumed_key, credit_account, ledger_entry, processed_webhook_event};

#[inline]
pub(crate) fn i64_to_u64(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[inline]
pub(crate) fn u64_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn model_to_account(model: credit_account::Model) -> CreditAccount {
    CreditAccount {
        plan: Plan::parse(&model.plan).unwrap_or(Plan::FreeTrial),
        subscription_status: SubscriptionStatus::from_db(&model.subscription_status),
        plan_expiry_date: model.plan_expiry_date.map(|d| d.with_timezone(&Utc)),
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
        credits: i64_to_u64(model.credits),
        version: i64_to_u64(model.version),
        user_id: model.user_id,
        email: model.email,
    }
}

fn account_to_active_model(account: &CreditAccount) -> credit_account::ActiveModel {
    credit_account::ActiveModel {
        user_id: Set(account.user_id.clone()),
        email: Set(account.email.clone()),
        credits: Set(u64_to_i64(account.credits)),
        plan: Set(account.plan.as_str().to_string()),
        subscription_status: Set(account.subscription_status.as_str().to_string()),
        plan_expiry_date: Set(account.plan_expiry_date.map(|d| d.fixed_offset())),
        version: Set(u64_to_i64(account.version)),
        created_at: Set(account.created_at.fixed_offset()),
        updated_at: Set(account.updated_at.fixed_offset()),
    }
}

fn model_to_entry(model: ledger_entry::Model) -> Option<LedgerEntry> {
    let Some(kind) = EntryKind::from_db(&model.kind) else {
        tracing::warn!(entry_id = %model.id, kind = %model.kind, "skipping ledger entry with unknown kind");
        return None;
    };

    Some(LedgerEntry {
        id: model.id,
        user_id: model.user_id,
        kind,
        delta: model.delta,
        balance_after: i64_to_u64(model.balance_after),
        reference: model.reference,
        created_at: model.created_at.with_timezone(&Utc),
    })
}

fn entry_to_active_model(entry: &LedgerEntry, account_version: u64) -> ledger_entry::ActiveModel {
    ledger_entry::ActiveModel {
        id: Set(entry.id.clone()),
        user_id: Set(entry.user_id.clone()),
        account_version: Set(u64_to_i64(account_version)),
        kind: Set(entry.kind.as_str().to_string()),
        delta: Set(entry.delta),
        balance_after: Set(u64_to_i64(entry.balance_after)),
        reference: Set(entry.reference.clone()),
        created_at: Set(entry.created_at.fixed_offset()),
    }
}

/// Conditional UPDATE that only matches the version the caller read.
fn build_account_update(
    account: &CreditAccount,
    expected_version: u64,
) -> sea_orm::UpdateMany<credit_account::Entity> {
    credit_account::Entity::update_many()
        .col_expr(credit_account::Column::Email, Expr::value(account.email.clone()))
        .col_expr(
            credit_account::Column::Credits,
            Expr::value(u64_to_i64(account.credits)),
        )
        .col_expr(credit_account::Column::Plan, Expr::value(account.plan.as_str()))
        .col_expr(
            credit_account::Column::SubscriptionStatus,
            Expr::value(account.subscription_status.as_str()),
        )
        .col_expr(
            credit_account::Column::PlanExpiryDate,
            Expr::value(account.plan_expiry_date.map(|d| d.fixed_offset())),
        )
        .col_expr(
            credit_account::Column::Version,
            Expr::value(u64_to_i64(account.version)),
        )
        .col_expr(
            credit_account::Column::UpdatedAt,
            Expr::value(account.updated_at.fixed_offset()),
        )
        .filter(credit_account::Column::UserId.eq(account.user_id.as_str()))
        .filter(credit_account::Column::Version.eq(u64_to_i64(expected_version)))
}

async fn sync_active_row(txn: &DatabaseTransaction, account: &CreditAccount) -> Result<()> {
    if belongs_in_active_set(account) {
        let row = active_subscriber::ActiveModel {
            user_id: Set(account.user_id.clone()),
            plan_expiry_date: Set(account.plan_expiry_date.map(|d| d.fixed_offset())),
        };
        active_subscriber::Entity::insert(row)
            .on_conflict(
                OnConflict::column(active_subscriber::Column::UserId)
                    .update_column(active_subscriber::Column::PlanExpiryDate)
                    .to_owned(),
            )
            .exec_without_returning(txn)
            .await?;
    } else {
        active_subscriber::Entity::delete_by_id(account.user_id.clone())
            .exec(txn)
            .await?;
    }
    Ok(())
}

/// Claim `key`. Returns `false` if another write already holds it.
async fn claim_key(txn: &DatabaseTransaction, key: &ConsumedKey) -> Result<bool> {
    let row = consumed_key::ActiveModel {
        key: Set(key.key.clone()),
        user_id: Set(key.user_id.clone()),
        plan: Set(key.plan.as_str().to_string()),
        source: Set(key.source.as_str().to_string()),
        consumed_at: Set(key.consumed_at.fixed_offset()),
    };

    let inserted = consumed_key::Entity::insert(row)
        .on_conflict(
            OnConflict::column(consumed_key::Column::Key)
                .do_nothing()
                .to_owned(),
        )
        .exec_without_returning(txn)
        .await?;

    Ok(inserted > 0)
}

/// SeaORM-backed implementation of [`LedgerStore`].
#[derive(Clone)]
pub struct SeaOrmLedgerStore {
    db: DatabaseConnection,
}

impl SeaOrmLedgerStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn rollback(txn: DatabaseTransaction, outcome: MutationOutcome) -> Result<MutationOutcome> {
        txn.rollback().await?;
        Ok(outcome)
    }
}

#[async_trait]
impl LedgerStore for SeaOrmLedgerStore {
    async fn get_account(&self, user_id: &str) -> Result<Option<CreditAccount>> {
        let account = credit_account::Entity::find_by_id(user_id.to_string())
            .one(&self.db)
            .await?;
        Ok(account.map(model_to_account))
    }

    async fn insert_account(&self, account: &CreditAccount, entry: &LedgerEntry) -> Result<bool> {
        tracing::debug!(user_id = %account.user_id, "inserting credit account");

        let txn = self.db.begin().await?;

        let inserted = credit_account::Entity::insert(account_to_active_model(account))
            .on_conflict(
                OnConflict::column(credit_account::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        if inserted == 0 {
            txn.rollback().await?;
            return Ok(false);
        }

        sync_active_row(&txn, account).await?;
        ledger_entry::Entity::insert(entry_to_active_model(entry, account.version))
            .exec_without_returning(&txn)
            .await?;

        txn.commit().await?;
        Ok(true)
    }

    async fn apply_mutation(&self, mutation: &LedgerMutation) -> Result<MutationOutcome> {
        let account = &mutation.account;
        tracing::debug!(
            user_id = %account.user_id,
            expected_version = mutation.expected_version,
            new_version = account.version,
            "applying ledger mutation"
        );

        let txn = self.db.begin().await?;

        if let Some(key) = &mutation.consume_key {
            if !claim_key(&txn, key).await? {
                return Self::rollback(txn, MutationOutcome::KeyAlreadyConsumed).await;
            }
        }

        let updated = build_account_update(account, mutation.expected_version)
            .exec(&txn)
            .await?;
        if updated.rows_affected == 0 {
            tracing::debug!(
                user_id = %account.user_id,
                expected_version = mutation.expected_version,
                "version mismatch - concurrent modification detected"
            );
            return Self::rollback(txn, MutationOutcome::VersionConflict).await;
        }

        sync_active_row(&txn, account).await?;

        if let Some(entry) = &mutation.entry {
            ledger_entry::Entity::insert(entry_to_active_model(entry, account.version))
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit().await?;
        Ok(MutationOutcome::Applied)
    }

    async fn list_active_subscribers(&self) -> Result<Vec<ActiveSubscriber>> {
        let rows = active_subscriber::Entity::find()
            .order_by_asc(active_subscriber::Column::UserId)
            .all(&self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ActiveSubscriber {
                user_id: row.user_id,
                plan_expiry_date: row.plan_expiry_date.map(|d| d.with_timezone(&Utc)),
            })
            .collect())
    }

    async fn is_key_consumed(&self, key: &str) -> Result<bool> {
        let row = consumed_key::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await?;
        Ok(row.is_some())
    }

    async fn list_entries(&self, user_id: &str, limit: u64) -> Result<Vec<LedgerEntry>> {
        let rows = ledger_entry::Entity::find()
            .filter(ledger_entry::Column::UserId.eq(user_id))
            .order_by_desc(ledger_entry::Column::AccountVersion)
            .limit(limit)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().filter_map(model_to_entry).collect())
    }

    async fn is_event_processed(&self, event_id: &str) -> Result<bool> {
        let event = processed_webhook_event::Entity::find_by_id(event_id.to_string())
            .one(&self.db)
            .await?;
        Ok(event.is_some())
    }

    async fn mark_event_processed(&self, event_id: &str) -> Result<()> {
        let event = processed_webhook_event::ActiveModel {
            event_id: Set(event_id.to_string()),
            processed_at: Set(Utc::now().fixed_offset()),
        };

        processed_webhook_event::Entity::insert(event)
            .on_conflict(
                OnConflict::column(processed_webhook_event::Column::EventId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.db
            .ping()
            .await
            .map_err(|e| ForgeError::service_unavailable(format!("database ping failed: {}", e)))
    }
}

impl SeaOrmLedgerStore {
    /// Delete processed webhook markers older than `cutoff`.
    pub async fn prune_processed_events(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = processed_webhook_event::Entity::delete_many()
            .filter(processed_webhook_event::Column::ProcessedAt.lt(cutoff.fixed_offset()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}
