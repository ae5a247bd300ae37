//! Image provider clients.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use validator::Validate;

use crate::error::{ForgeError, Result};

fn default_dimension() -> u32 {
    1024
}

/// One image to generate.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct GenerationRequest {
    #[validate(length(min = 1, max = 1000))]
    pub prompt: String,
    #[serde(default)]
    #[validate(length(max = 1000))]
    pub negative_prompt: Option<String>,
    #[serde(default = "default_dimension")]
    #[validate(range(min = 256, max = 2048))]
    pub width: u32,
    #[serde(default = "default_dimension")]
    #[validate(range(min = 256, max = 2048))]
    pub height: u32,
    #[serde(default)]
    #[validate(length(max = 64))]
    pub style: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
}

impl GenerationRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            width: default_dimension(),
            height: default_dimension(),
            style: None,
            seed: None,
        }
    }
}

/// What a provider hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedImage {
    pub url: String,
    pub provider: String,
    pub seed: Option<u64>,
}

/// An image generation backend.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage>;
}

/// Returns placeholder URLs. Same request, same URL.
#[derive(Debug, Clone, Default)]
pub struct PlaceholderImageGenerator {
    base_url: Option<String>,
}

impl PlaceholderImageGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

#[async_trait]
impl ImageGenerator for PlaceholderImageGenerator {
    fn name(&self) -> &str {
        "placeholder"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let seed = request.seed.unwrap_or_else(|| {
            let mut hasher = DefaultHasher::new();
            request.prompt.hash(&mut hasher);
            request.style.hash(&mut hasher);
            hasher.finish()
        });

        let label: String = request.prompt.chars().take(40).collect();
        let base = self.base_url.as_deref().unwrap_or("https://placehold.co");
        let url = format!(
            "{}/{}x{}.png?text={}&seed={}",
            base.trim_end_matches('/'),
            request.width,
            request.height,
            urlencoding::encode(&label),
            seed
        );

        Ok(GeneratedImage {
            url,
            provider: self.name().to_string(),
            seed: Some(seed),
        })
    }
}

#[derive(Serialize)]
struct ProviderRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<&'a str>,
    width: u32,
    height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    style: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct ProviderResponse {
    #[serde(default)]
    images: Vec<ProviderImage>,
}

#[derive(Deserialize)]
struct ProviderImage {
    url: String,
    #[serde(default)]
    seed: Option<u64>,
}

/// Calls a hosted text-to-image API over HTTP.
pub struct HttpImageGenerator {
    client: Client,
    endpoint: String,
    api_key: SecretString,
    model: String,
}

impl HttpImageGenerator {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<SecretString>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ForgeError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
        })
    }
}

#[async_trait]
impl ImageGenerator for HttpImageGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedImage> {
        let body = ProviderRequest {
            model: &self.model,
            prompt: &request.prompt,
            negative_prompt: request.negative_prompt.as_deref(),
            width: request.width,
            height: request.height,
            style: request.style.as_deref(),
            seed: request.seed,
        };

        let started = std::time::Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: ProviderResponse = response.json().await?;
        tracing::debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            images = parsed.images.len(),
            "image provider responded"
        );

        let image = parsed
            .images
            .into_iter()
            .next()
            .ok_or_else(|| ForgeError::service_unavailable("Image provider returned no images"))?;

        Ok(GeneratedImage {
            url: image.url,
            provider: self.model.clone(),
            seed: image.seed.or(request.seed),
        })
    }
}
