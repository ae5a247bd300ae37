//! promptforge: the backend of an AI image-generation service.
//!
//! - **Credits**: a per-user credit ledger with plan tiers, subscription
//!   windows, one-time license keys, and an append-only history
//! - **Generation**: charge-first image generation against a hosted provider,
//!   with refunds on failure and a per-user gallery
//! - **Marketplace**: image bundles sold through the payment provider
//! - **Payments**: signed webhooks that top up credits or record purchases
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use promptforge::{App, ConfigBuilder};
//!
//! #[tokio::main]
//! async fn main() -> promptforge::Result<()> {
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     promptforge::init_tracing_with_config(&config);
//!     App::from_config(config).await?.serve().await
//! }
//! ```

pub mod api;
mod app;
pub mod auth;
pub mod config;
mod core;
mod cors;
pub mod credits;
pub mod database;
mod error;
pub mod generation;
pub mod health;
pub mod http;
pub mod jobs;
pub mod marketplace;
mod middleware;
pub mod payments;
pub mod testing;
mod utils;

pub use app::{AppContext, AppContextBuilder};
pub use config::{Config, ConfigBuilder};
pub use core::App;
pub use error::{ErrorResponse, ForgeError, Result};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber from environment variables alone.
///
/// `RUST_LOG` sets the filter (default `info`); `FORGE_LOG_JSON=true`
/// switches to JSON lines.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = utils::get_env_with_prefix("LOG_JSON")
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);
    install_subscriber(filter, json);
}

/// Install the global subscriber from `config.logging`. `RUST_LOG`, when set,
/// still wins over the configured level.
pub fn init_tracing_with_config(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    install_subscriber(filter, config.logging.json);
}

fn install_subscriber(filter: EnvFilter, json: bool) {
    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
