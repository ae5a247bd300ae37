//! SeaORM-backed bundle storage.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    entity::prelude::*, sea_query::OnConflict, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};

use super::bundles::{Bundle, BundlePurchase};
use super::storage::BundleStore;
use crate::error::Result;

pub(crate) mod entity {
    pub mod bundle {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "bundles")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            #[sea_orm(unique)]
            pub slug: String,
            pub title: String,
            pub description: String,
            pub price_cents: i64,
            pub currency: String,
            #[sea_orm(column_type = "Json")]
            pub preview_urls: Json,
            #[sea_orm(column_type = "Json")]
            pub asset_urls: Json,
            pub active: bool,
            pub created_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod bundle_purchase {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "bundle_purchases")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub order_id: String,
            pub user_id: String,
            pub bundle_id: String,
            pub purchased_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{bundle, bundle_purchase};

fn urls_from_json(value: Json) -> Vec<String> {
    serde_json::from_value(value).unwrap_or_default()
}

fn model_to_bundle(model: bundle::Model) -> Bundle {
    Bundle {
        id: model.id,
        slug: model.slug,
        title: model.title,
        description: model.description,
        price_cents: u32::try_from(model.price_cents).unwrap_or(0),
        currency: model.currency,
        preview_urls: urls_from_json(model.preview_urls),
        asset_urls: urls_from_json(model.asset_urls),
        active: model.active,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

fn model_to_purchase(model: bundle_purchase::Model) -> BundlePurchase {
    BundlePurchase {
        order_id: model.order_id,
        user_id: model.user_id,
        bundle_id: model.bundle_id,
        purchased_at: model.purchased_at.with_timezone(&Utc),
    }
}

/// SeaORM-backed implementation of [`BundleStore`].
#[derive(Clone)]
pub struct SeaOrmBundleStore {
    db: DatabaseConnection,
}

impl SeaOrmBundleStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BundleStore for SeaOrmBundleStore {
    async fn list_active(&self) -> Result<Vec<Bundle>> {
        let rows = bundle::Entity::find()
            .filter(bundle::Column::Active.eq(true))
            .order_by_desc(bundle::Column::CreatedAt)
            .order_by_asc(bundle::Column::Slug)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(model_to_bundle).collect())
    }

    async fn get(&self, id: &str) -> Result<Option<Bundle>> {
        let row = bundle::Entity::find_by_id(id.to_string())
            .one(&self.db)
            .await?;
        Ok(row.map(model_to_bundle))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Bundle>> {
        let row = bundle::Entity::find()
            .filter(bundle::Column::Slug.eq(slug))
            .one(&self.db)
            .await?;
        Ok(row.map(model_to_bundle))
    }

    async fn create(&self, new: &Bundle) -> Result<bool> {
        tracing::debug!(bundle_id = %new.id, slug = %new.slug, "creating bundle");

        let row = bundle::ActiveModel {
            id: Set(new.id.clone()),
            slug: Set(new.slug.clone()),
            title: Set(new.title.clone()),
            description: Set(new.description.clone()),
            price_cents: Set(i64::from(new.price_cents)),
            currency: Set(new.currency.clone()),
            preview_urls: Set(serde_json::to_value(&new.preview_urls)?),
            asset_urls: Set(serde_json::to_value(&new.asset_urls)?),
            active: Set(new.active),
            created_at: Set(new.created_at.fixed_offset()),
        };

        let inserted = bundle::Entity::insert(row)
            .on_conflict(OnConflict::column(bundle::Column::Slug).do_nothing().to_owned())
            .exec_without_returning(&self.db)
            .await?;

        Ok(inserted > 0)
    }

    async fn record_purchase(&self, purchase: &BundlePurchase) -> Result<bool> {
        let row = bundle_purchase::ActiveModel {
            order_id: Set(purchase.order_id.clone()),
            user_id: Set(purchase.user_id.clone()),
            bundle_id: Set(purchase.bundle_id.clone()),
            purchased_at: Set(purchase.purchased_at.fixed_offset()),
        };

        let inserted = bundle_purchase::Entity::insert(row)
            .on_conflict(
                OnConflict::column(bundle_purchase::Column::OrderId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(inserted > 0)
    }

    async fn has_purchased(&self, user_id: &str, bundle_id: &str) -> Result<bool> {
        let count = bundle_purchase::Entity::find()
            .filter(bundle_purchase::Column::UserId.eq(user_id))
            .filter(bundle_purchase::Column::BundleId.eq(bundle_id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }

    async fn list_purchases(&self, user_id: &str) -> Result<Vec<BundlePurchase>> {
        let rows = bundle_purchase::Entity::find()
            .filter(bundle_purchase::Column::UserId.eq(user_id))
            .order_by_desc(bundle_purchase::Column::PurchasedAt)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(model_to_purchase).collect())
    }
}
