//! Statement execution against a target database.
//!
//! The pipeline only sees the [`StatementExecutor`] trait. Concrete
//! executors wrap a `sqlx` pool and run every batch inside one transaction
//! bounded by the configured query timeout. There is no retry: a failed
//! batch is rolled back and the error is returned to the caller.

use crate::Result;
use crate::config::{ConnectionConfig, detect_database_type};
use crate::error::{DbForgeError, redact_database_url};
use crate::models::DatabaseType;
use async_trait::async_trait;

#[cfg(feature = "postgresql")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Executes generated SQL statements.
///
/// # Object Safety
/// This trait is object-safe, allowing for dynamic dispatch through
/// `Box<dyn StatementExecutor>`.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Tests the database connection with a trivial query.
    ///
    /// # Errors
    /// Returns error if connection fails or times out
    async fn test_connection(&self) -> Result<()>;

    /// Executes `statements` in order inside one transaction.
    ///
    /// Returns the total number of affected rows.
    ///
    /// # Errors
    /// Connection or query errors; the transaction is rolled back and no
    /// statement of the batch stays applied.
    async fn execute_batch(&self, statements: &[String]) -> Result<u64>;

    /// Returns the database type this executor targets.
    fn database_type(&self) -> DatabaseType;
}

/// Factory function creating an executor from a connection URL.
///
/// # Security
/// The URL only ever appears in logs and errors in redacted form.
///
/// # Errors
/// Returns error if:
/// - the URL format is not recognized
/// - the matching driver feature is not compiled in
/// - the pool cannot be created
pub async fn create_executor(
    database_url: &str,
    config: &ConnectionConfig,
) -> Result<Box<dyn StatementExecutor>> {
    config.validate()?;
    let database_type = detect_database_type(database_url)?;
    tracing::info!(
        "Connecting to {} target {}",
        database_type,
        redact_database_url(database_url)
    );

    match database_type {
        #[cfg(feature = "postgresql")]
        DatabaseType::PostgreSQL => {
            let executor = postgres::PostgresExecutor::connect(database_url, config).await?;
            Ok(Box::new(executor))
        }
        #[cfg(not(feature = "postgresql"))]
        DatabaseType::PostgreSQL => Err(DbForgeError::unsupported_feature(
            "PostgreSQL executor",
            "Compile with --features postgresql to enable PostgreSQL support",
        )),
        #[cfg(feature = "sqlite")]
        DatabaseType::SQLite => {
            let executor = sqlite::SqliteExecutor::connect(database_url, config).await?;
            Ok(Box::new(executor))
        }
        #[cfg(not(feature = "sqlite"))]
        DatabaseType::SQLite => Err(DbForgeError::unsupported_feature(
            "SQLite executor",
            "Compile with --features sqlite to enable SQLite support",
        )),
    }
}

/// Wraps a driver error raised while running statements.
#[cfg(any(feature = "postgresql", feature = "sqlite"))]
pub(crate) fn statement_failed(error: &sqlx::Error) -> DbForgeError {
    match error {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            DbForgeError::Connection {
                context: "Database connection failed".to_string(),
                source: error.to_string().into(),
            }
        }
        other => DbForgeError::query_failed(other.to_string()),
    }
}

/// Error for a batch that ran past the query timeout.
#[cfg(any(feature = "postgresql", feature = "sqlite"))]
pub(crate) fn batch_timed_out(timeout: std::time::Duration) -> DbForgeError {
    DbForgeError::query_failed(format!(
        "batch did not complete within {}s",
        timeout.as_secs()
    ))
}
