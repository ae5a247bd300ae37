//! Image generation: provider clients, the gallery, and the service that
//! charges credits around each provider call.

mod client;
mod gallery;
pub mod sea_orm_store;
mod service;

pub use client::{
    GeneratedImage, GenerationRequest, HttpImageGenerator, ImageGenerator,
    PlaceholderImageGenerator,
};
pub use gallery::memory::InMemoryGalleryStore;
pub use gallery::{GalleryImage, GalleryStore};
pub use sea_orm_store::SeaOrmGalleryStore;
pub use service::{
    BulkGenerationRequest, BulkGenerationResult, BulkItem, DEFAULT_MAX_BULK,
    DEFAULT_MAX_PARALLEL, GenerationResult, GenerationService,
};
