//! Database connection and migrations.

pub mod migrations;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::{ForgeError, Result};

pub use migrations::Migrator;

/// Open a connection pool for `url`.
pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(url);
    options
        .max_connections(config.max_connections)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .sqlx_logging(false);

    let db = Database::connect(options).await.map_err(|e| {
        ForgeError::database(format!(
            "Failed to connect to {}: {}",
            redact_database_url(url),
            e
        ))
    })?;

    tracing::info!(url = %redact_database_url(url), "Database connected");
    Ok(db)
}

/// Apply every pending migration.
pub async fn run_migrations(db: &DatabaseConnection) -> Result<()> {
    Migrator::up(db, None)
        .await
        .map_err(|e| ForgeError::internal(format!("Migration failed: {}", e)))?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Replace the password in a connection URL so it can be logged.
#[must_use]
pub fn redact_database_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _password)) => format!("{}://{}:[REDACTED]@{}", scheme, user, host),
        None => url.to_string(),
    }
}
