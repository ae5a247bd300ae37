use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

use crate::error::{ForgeError, Result};
use crate::utils::{get_env_with_prefix, parse_env};

/// Service configuration, loaded from `FORGE_*` environment variables
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub licenses: LicenseConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub sweeper: SweeperConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes (default: 2MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Whole-request timeout. Bulk generation runs inside this budget.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Allowed origins. Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_cors_max_age")]
    pub max_age_seconds: u64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Connection URL. When unset the service runs on in-memory stores.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider.
    #[serde(default, skip_serializing)]
    pub jwt_secret: Option<String>,
    /// JWKS endpoint for RS256 identity providers.
    #[serde(default)]
    pub jwks_url: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    /// Role claim value that grants admin routes.
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LedgerConfig {
    /// Credits granted when an account is opened on the Free Trial plan.
    #[serde(default = "default_trial_credits")]
    pub trial_credits: u64,
    /// Length of a paid plan window.
    #[serde(default = "default_plan_duration_days")]
    pub plan_duration_days: i64,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// `placeholder` or `http`
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_generation_timeout")]
    pub timeout_seconds: u64,
    /// Concurrent upstream calls per bulk request.
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_max_bulk")]
    pub max_bulk: usize,
}

impl GenerationConfig {
    /// Longest a full bulk request may spend waiting on the provider: one
    /// provider timeout per wave of `max_parallel` calls.
    #[must_use]
    pub fn bulk_budget_seconds(&self) -> u64 {
        let waves = self.max_bulk.div_ceil(self.max_parallel.max(1)) as u64;
        self.timeout_seconds.saturating_mul(waves)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LicenseConfig {
    /// `static` or `http`
    #[serde(default = "default_license_provider")]
    pub provider: String,
    #[serde(default)]
    pub verify_url: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct PaymentsConfig {
    #[serde(default, skip_serializing)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_webhook_tolerance")]
    pub tolerance_seconds: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SweeperConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_sweep_interval")]
    pub interval_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_origins: Vec::new(),
            max_age_seconds: default_cors_max_age(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            trial_credits: default_trial_credits(),
            plan_duration_days: default_plan_duration_days(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            endpoint: None,
            api_key: None,
            model: default_model(),
            timeout_seconds: default_generation_timeout(),
            max_parallel: default_max_parallel(),
            max_bulk: default_max_bulk(),
        }
    }
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            provider: default_license_provider(),
            verify_url: None,
            product_id: None,
        }
    }
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            tolerance_seconds: default_webhook_tolerance(),
        }
    }
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_sweep_interval(),
        }
    }
}

// Secrets never reach logs through `{:?}`.

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret.as_ref().map(|_| "[REDACTED]"))
            .field("jwks_url", &self.jwks_url)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("admin_role", &self.admin_role)
            .finish()
    }
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_parallel", &self.max_parallel)
            .field("max_bulk", &self.max_bulk)
            .finish()
    }
}

impl fmt::Debug for PaymentsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentsConfig")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("tolerance_seconds", &self.tolerance_seconds)
            .finish()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_body_size() -> usize {
    2 * 1024 * 1024
}

fn default_request_timeout() -> u64 {
    200
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_cors_max_age() -> u64 {
    3600
}

fn default_max_connections() -> u32 {
    10
}

fn default_admin_role() -> String {
    "admin".to_string()
}

fn default_trial_credits() -> u64 {
    10
}

fn default_plan_duration_days() -> i64 {
    30
}

fn default_generation_provider() -> String {
    "placeholder".to_string()
}

fn default_model() -> String {
    "sdxl".to_string()
}

fn default_generation_timeout() -> u64 {
    60
}

fn default_max_parallel() -> usize {
    4
}

fn default_max_bulk() -> usize {
    10
}

fn default_license_provider() -> String {
    "static".to_string()
}

fn default_webhook_tolerance() -> i64 {
    300
}

fn default_sweep_interval() -> u64 {
    3600
}

impl ServerConfig {
    pub fn addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.config.server.request_timeout_seconds = seconds;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.config.server.max_body_size = max_body_size;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_cors(mut self, cors: CorsConfig) -> Self {
        self.config.cors = cors;
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.config.database.url = Some(url.into());
        self
    }

    pub fn with_jwt_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.auth.jwt_secret = Some(secret.into());
        self
    }

    pub fn with_jwks_url(mut self, url: impl Into<String>) -> Self {
        self.config.auth.jwks_url = Some(url.into());
        self
    }

    pub fn with_trial_credits(mut self, credits: u64) -> Self {
        self.config.ledger.trial_credits = credits;
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.config.generation = generation;
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.payments.webhook_secret = Some(secret.into());
        self
    }

    pub fn with_sweeper(mut self, sweeper: SweeperConfig) -> Self {
        self.config.sweeper = sweeper;
        self
    }

    /// Load configuration from environment variables with the FORGE_ prefix
    pub fn from_env(mut self) -> Self {
        let c = &mut self.config;

        if let Some(host) = get_env_with_prefix("HOST") {
            c.server.host = host;
        }
        if let Some(port) = parse_env("PORT") {
            c.server.port = port;
        }
        if let Some(size) = parse_env("MAX_BODY_SIZE") {
            c.server.max_body_size = size;
        }
        if let Some(secs) = parse_env("REQUEST_TIMEOUT_SECONDS") {
            c.server.request_timeout_seconds = secs;
        }

        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            c.logging.level = level;
        }
        if let Some(json) = parse_env("LOG_JSON") {
            c.logging.json = json;
        }

        if let Some(enabled) = parse_env("CORS_ENABLED") {
            c.cors.enabled = enabled;
        }
        if let Some(origins) = get_env_with_prefix("CORS_ALLOWED_ORIGINS") {
            c.cors.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        if let Some(url) = get_env_with_prefix("DATABASE_URL") {
            c.database.url = Some(url);
        }
        if let Some(max) = parse_env("DATABASE_MAX_CONNECTIONS") {
            c.database.max_connections = max;
        }
        if let Some(run) = parse_env("DATABASE_RUN_MIGRATIONS") {
            c.database.run_migrations = run;
        }

        if let Some(secret) = get_env_with_prefix("JWT_SECRET") {
            c.auth.jwt_secret = Some(secret);
        }
        if let Some(url) = get_env_with_prefix("JWKS_URL") {
            c.auth.jwks_url = Some(url);
        }
        if let Some(issuer) = get_env_with_prefix("JWT_ISSUER") {
            c.auth.issuer = Some(issuer);
        }
        if let Some(audience) = get_env_with_prefix("JWT_AUDIENCE") {
            c.auth.audience = Some(audience);
        }
        if let Some(role) = get_env_with_prefix("ADMIN_ROLE") {
            c.auth.admin_role = role;
        }

        if let Some(credits) = parse_env("TRIAL_CREDITS") {
            c.ledger.trial_credits = credits;
        }
        if let Some(days) = parse_env("PLAN_DURATION_DAYS") {
            c.ledger.plan_duration_days = days;
        }

        if let Some(provider) = get_env_with_prefix("GENERATION_PROVIDER") {
            c.generation.provider = provider;
        }
        if let Some(endpoint) = get_env_with_prefix("GENERATION_ENDPOINT") {
            c.generation.endpoint = Some(endpoint);
        }
        if let Some(key) = get_env_with_prefix("GENERATION_API_KEY") {
            c.generation.api_key = Some(key);
        }
        if let Some(model) = get_env_with_prefix("GENERATION_MODEL") {
            c.generation.model = model;
        }
        if let Some(secs) = parse_env("GENERATION_TIMEOUT_SECONDS") {
            c.generation.timeout_seconds = secs;
        }
        if let Some(n) = parse_env("GENERATION_MAX_PARALLEL") {
            c.generation.max_parallel = n;
        }
        if let Some(n) = parse_env("GENERATION_MAX_BULK") {
            c.generation.max_bulk = n;
        }

        if let Some(provider) = get_env_with_prefix("LICENSE_PROVIDER") {
            c.licenses.provider = provider;
        }
        if let Some(url) = get_env_with_prefix("LICENSE_VERIFY_URL") {
            c.licenses.verify_url = Some(url);
        }
        if let Some(product) = get_env_with_prefix("LICENSE_PRODUCT_ID") {
            c.licenses.product_id = Some(product);
        }

        if let Some(secret) = get_env_with_prefix("PAYMENTS_WEBHOOK_SECRET") {
            c.payments.webhook_secret = Some(secret);
        }
        if let Some(secs) = parse_env("PAYMENTS_TOLERANCE_SECONDS") {
            c.payments.tolerance_seconds = secs;
        }

        if let Some(enabled) = parse_env("SWEEP_ENABLED") {
            c.sweeper.enabled = enabled;
        }
        if let Some(secs) = parse_env("SWEEP_INTERVAL_SECONDS") {
            c.sweeper.interval_seconds = secs;
        }

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` naming the first invalid setting.
    pub fn build(self) -> Result<Config> {
        let c = &self.config;

        c.server.addr().map_err(|e| {
            ForgeError::bad_request(format!(
                "Invalid server address {}:{} - {}",
                c.server.host, c.server.port, e
            ))
        })?;

        if c.server.port == 0 {
            return Err(ForgeError::bad_request("Server port must be greater than 0"));
        }

        if c.server.max_body_size == 0 {
            return Err(ForgeError::bad_request(
                "Maximum body size must be greater than 0",
            ));
        }

        if c.server.request_timeout_seconds == 0 {
            return Err(ForgeError::bad_request(
                "Request timeout must be greater than 0",
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&c.logging.level.to_lowercase().as_str()) {
            return Err(ForgeError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                c.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if c.auth.jwt_secret.is_none() && c.auth.jwks_url.is_none() {
            return Err(ForgeError::bad_request(
                "Either FORGE_JWT_SECRET or FORGE_JWKS_URL must be set",
            ));
        }

        if c.ledger.plan_duration_days <= 0 {
            return Err(ForgeError::bad_request(
                "Plan duration must be at least one day",
            ));
        }

        match c.generation.provider.as_str() {
            "placeholder" => {}
            "http" => {
                if c.generation.endpoint.is_none() {
                    return Err(ForgeError::bad_request(
                        "The http generation provider requires FORGE_GENERATION_ENDPOINT",
                    ));
                }
            }
            other => {
                return Err(ForgeError::bad_request(format!(
                    "Generation provider must be 'placeholder' or 'http', got: {}",
                    other
                )));
            }
        }

        if c.generation.max_parallel == 0 || c.generation.max_bulk == 0 {
            return Err(ForgeError::bad_request(
                "Generation max_parallel and max_bulk must be greater than 0",
            ));
        }

        if c.server.request_timeout_seconds < c.generation.bulk_budget_seconds() {
            return Err(ForgeError::bad_request(format!(
                "Request timeout of {}s is shorter than a full bulk generation ({}s)",
                c.server.request_timeout_seconds,
                c.generation.bulk_budget_seconds()
            )));
        }

        match c.licenses.provider.as_str() {
            "static" => {}
            "http" => {
                if c.licenses.verify_url.is_none() || c.licenses.product_id.is_none() {
                    return Err(ForgeError::bad_request(
                        "The http license provider requires a verify URL and product id",
                    ));
                }
            }
            other => {
                return Err(ForgeError::bad_request(format!(
                    "License provider must be 'static' or 'http', got: {}",
                    other
                )));
            }
        }

        if c.payments.tolerance_seconds <= 0 {
            return Err(ForgeError::bad_request(
                "Webhook tolerance must be greater than 0",
            ));
        }

        if c.sweeper.enabled && c.sweeper.interval_seconds == 0 {
            return Err(ForgeError::bad_request(
                "Sweep interval must be greater than 0 when the sweeper is enabled",
            ));
        }

        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConfigBuilder {
        ConfigBuilder::new().with_jwt_secret("test-secret")
    }

    #[test]
    fn test_defaults_build() {
        let config = base().build().unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.ledger.trial_credits, 10);
        assert_eq!(config.ledger.plan_duration_days, 30);
        assert_eq!(config.generation.provider, "placeholder");
        assert_eq!(config.sweeper.interval_seconds, 3600);
    }

    #[test]
    fn test_requires_auth_material() {
        let err = ConfigBuilder::new().build().unwrap_err();
        assert!(err.to_string().contains("FORGE_JWT_SECRET"));
    }

    #[test]
    fn test_rejects_invalid_log_level() {
        let err = base().with_log_level("loud").build().unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_http_generation_needs_endpoint() {
        let generation = GenerationConfig {
            provider: "http".to_string(),
            ..Default::default()
        };
        assert!(base().with_generation(generation).build().is_err());
    }

    #[test]
    fn test_request_timeout_covers_bulk_generation() {
        let defaults = base().build().unwrap();
        assert_eq!(defaults.generation.bulk_budget_seconds(), 180);
        assert!(defaults.server.request_timeout_seconds >= 180);

        let err = base().with_request_timeout(120).build().unwrap_err();
        assert!(err.to_string().contains("shorter than a full bulk generation"));

        let generation = GenerationConfig {
            timeout_seconds: 1,
            max_parallel: 1,
            max_bulk: 1,
            ..Default::default()
        };
        assert!(
            base()
                .with_request_timeout(1)
                .with_generation(generation)
                .build()
                .is_ok()
        );
    }

    #[test]
    fn test_enabled_sweeper_needs_interval() {
        let sweeper = SweeperConfig {
            enabled: true,
            interval_seconds: 0,
        };
        assert!(base().with_sweeper(sweeper).build().is_err());

        let sweeper = SweeperConfig {
            enabled: false,
            interval_seconds: 0,
        };
        assert!(base().with_sweeper(sweeper).build().is_ok());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = base().with_webhook_secret("whsec_123").build().unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("test-secret"));
        assert!(!debug.contains("whsec_123"));
        assert!(debug.contains("[REDACTED]"));
    }
}
