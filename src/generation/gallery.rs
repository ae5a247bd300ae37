//! Per-user gallery of generated images.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::client::{GeneratedImage, GenerationRequest};
use crate::error::Result;

/// A stored, paid-for image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryImage {
    pub id: String,
    pub user_id: String,
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub style: Option<String>,
    pub width: u32,
    pub height: u32,
    pub seed: Option<u64>,
    pub url: String,
    pub provider: String,
    pub credits_spent: u64,
    pub created_at: DateTime<Utc>,
}

impl GalleryImage {
    #[must_use]
    pub fn new(
        user_id: &str,
        request: &GenerationRequest,
        image: GeneratedImage,
        credits_spent: u64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt.clone(),
            style: request.style.clone(),
            width: request.width,
            height: request.height,
            seed: image.seed,
            url: image.url,
            provider: image.provider,
            credits_spent,
            created_at: Utc::now(),
        }
    }
}

/// Gallery persistence. Every read is scoped to one user.
#[async_trait]
pub trait GalleryStore: Send + Sync {
    async fn save(&self, image: &GalleryImage) -> Result<()>;

    /// Newest first.
    async fn list(&self, user_id: &str, limit: u64, offset: u64) -> Result<Vec<GalleryImage>>;

    async fn count(&self, user_id: &str) -> Result<u64>;

    async fn get(&self, user_id: &str, image_id: &str) -> Result<Option<GalleryImage>>;
}

pub mod memory {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::RwLock;

    /// In-memory gallery.
    #[derive(Default, Clone)]
    pub struct InMemoryGalleryStore {
        images: Arc<RwLock<Vec<GalleryImage>>>,
    }

    impl InMemoryGalleryStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl GalleryStore for InMemoryGalleryStore {
        async fn save(&self, image: &GalleryImage) -> Result<()> {
            self.images.write().await.push(image.clone());
            Ok(())
        }

        async fn list(&self, user_id: &str, limit: u64, offset: u64) -> Result<Vec<GalleryImage>> {
            let images = self.images.read().await;
            Ok(images
                .iter()
                .rev()
                .filter(|i| i.user_id == user_id)
                .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .cloned()
                .collect())
        }

        async fn count(&self, user_id: &str) -> Result<u64> {
            let images = self.images.read().await;
            Ok(images.iter().filter(|i| i.user_id == user_id).count() as u64)
        }

        async fn get(&self, user_id: &str, image_id: &str) -> Result<Option<GalleryImage>> {
            Ok(self
                .images
                .read()
                .await
                .iter()
                .find(|i| i.id == image_id && i.user_id == user_id)
                .cloned())
        }
    }
}
