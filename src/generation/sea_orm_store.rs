//! SeaORM-backed gallery storage.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    entity::prelude::*, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use super::gallery::{GalleryImage, GalleryStore};
use crate::error::Result;

pub(crate) mod entity {
    pub mod gallery_image {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "gallery_images")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub user_id: String,
            #[sea_orm(column_type = "Text")]
            pub prompt: String,
            #[sea_orm(column_type = "Text", nullable)]
            pub negative_prompt: Option<String>,
            pub style: Option<String>,
            pub width: i32,
            pub height: i32,
            pub seed: Option<i64>,
            #[sea_orm(column_type = "Text")]
            pub url: String,
            pub provider: String,
            pub credits_spent: i64,
            pub created_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::gallery_image;

fn model_to_image(model: gallery_image::Model) -> GalleryImage {
    GalleryImage {
        id: model.id,
        user_id: model.user_id,
        prompt: model.prompt,
        negative_prompt: model.negative_prompt,
        style: model.style,
        width: u32::try_from(model.width).unwrap_or(0),
        height: u32::try_from(model.height).unwrap_or(0),
        // Seeds are stored bit-for-bit.
        seed: model.seed.map(|s| s as u64),
        url: model.url,
        provider: model.provider,
        credits_spent: u64::try_from(model.credits_spent).unwrap_or(0),
        created_at: model.created_at.with_timezone(&Utc),
    }
}

/// SeaORM-backed implementation of [`GalleryStore`].
#[derive(Clone)]
pub struct SeaOrmGalleryStore {
    db: DatabaseConnection,
}

impl SeaOrmGalleryStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl GalleryStore for SeaOrmGalleryStore {
    async fn save(&self, image: &GalleryImage) -> Result<()> {
        let row = gallery_image::ActiveModel {
            id: Set(image.id.clone()),
            user_id: Set(image.user_id.clone()),
            prompt: Set(image.prompt.clone()),
            negative_prompt: Set(image.negative_prompt.clone()),
            style: Set(image.style.clone()),
            width: Set(i32::try_from(image.width).unwrap_or(i32::MAX)),
            height: Set(i32::try_from(image.height).unwrap_or(i32::MAX)),
            seed: Set(image.seed.map(|s| s as i64)),
            url: Set(image.url.clone()),
            provider: Set(image.provider.clone()),
            credits_spent: Set(i64::try_from(image.credits_spent).unwrap_or(i64::MAX)),
            created_at: Set(image.created_at.fixed_offset()),
        };

        gallery_image::Entity::insert(row)
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn list(&self, user_id: &str, limit: u64, offset: u64) -> Result<Vec<GalleryImage>> {
        let rows = gallery_image::Entity::find()
            .filter(gallery_image::Column::UserId.eq(user_id))
            .order_by_desc(gallery_image::Column::CreatedAt)
            .order_by_desc(gallery_image::Column::Id)
            .limit(limit)
            .offset(offset)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(model_to_image).collect())
    }

    async fn count(&self, user_id: &str) -> Result<u64> {
        Ok(gallery_image::Entity::find()
            .filter(gallery_image::Column::UserId.eq(user_id))
            .count(&self.db)
            .await?)
    }

    async fn get(&self, user_id: &str, image_id: &str) -> Result<Option<GalleryImage>> {
        let row = gallery_image::Entity::find_by_id(image_id.to_string())
            .filter(gallery_image::Column::UserId.eq(user_id))
            .one(&self.db)
            .await?;
        Ok(row.map(model_to_image))
    }
}
