//! SQLite-backed databases for tests.

use crate::database::Migrator;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

/// A migrated in-memory SQLite database.
///
/// The pool is pinned to one connection: every `sqlite::memory:` connection
/// opens its own private database, so a second one would see empty tables.
pub struct TestDb {
    pub connection: DatabaseConnection,
}

impl TestDb {
    pub async fn new() -> Result<Self, DbErr> {
        let connection = Self::connect().await?;
        Migrator::up(&connection, None).await?;
        Ok(Self { connection })
    }

    /// An empty database, for tests that exercise the migrator itself.
    pub async fn unmigrated() -> Result<Self, DbErr> {
        Ok(Self {
            connection: Self::connect().await?,
        })
    }

    pub fn connection(&self) -> DatabaseConnection {
        self.connection.clone()
    }

    /// Run raw SQL statements, one per entry.
    pub async fn seed(&self, statements: &[&str]) -> Result<(), DbErr> {
        for statement in statements {
            self.connection.execute_unprepared(statement).await?;
        }
        Ok(())
    }

    async fn connect() -> Result<DatabaseConnection, DbErr> {
        let mut options = ConnectOptions::new("sqlite::memory:");
        options
            .max_connections(1)
            .min_connections(1)
            .sqlx_logging(false);
        Database::connect(options).await
    }
}
