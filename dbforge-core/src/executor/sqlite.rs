//! SQLite statement executor.
//!
//! # Connection Modes
//! - File-based: `sqlite:///path/to/database.db` or `sqlite://./relative.db`
//! - In-memory: `sqlite::memory:` or `:memory:`
//!
//! The database file is created when missing. Pooled connections are never
//! recycled, so an in-memory database lives as long as the executor.

use super::{StatementExecutor, batch_timed_out, statement_failed};
use crate::Result;
use crate::config::ConnectionConfig;
use crate::error::DbForgeError;
use crate::models::DatabaseType;
use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

/// Executor backed by a `sqlx` SQLite pool.
pub struct SqliteExecutor {
    pool: SqlitePool,
    config: ConnectionConfig,
}

impl SqliteExecutor {
    /// Opens (or creates) the database.
    ///
    /// # Errors
    /// Configuration error for a malformed URL, connection error when the
    /// database cannot be opened.
    pub async fn connect(database_url: &str, config: &ConnectionConfig) -> Result<Self> {
        config.validate()?;
        let normalized = normalize_connection_string(database_url);

        let options = SqliteConnectOptions::from_str(&normalized)
            .map_err(|e| {
                DbForgeError::configuration(format!("Invalid SQLite connection string: {}", e))
            })?
            .create_if_missing(true);

        // Every connection to an in-memory database sees its own database.
        let max_connections = if is_in_memory(&normalized) {
            1
        } else {
            config.max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(DbForgeError::connection_failed)?;

        tracing::debug!("SQLite pool ready ({})", config);
        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    /// Underlying pool, for reading back what was loaded.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the connection gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StatementExecutor for SqliteExecutor {
    async fn test_connection(&self) -> Result<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(DbForgeError::connection_failed)?;
        Ok(())
    }

    async fn execute_batch(&self, statements: &[String]) -> Result<u64> {
        let batch = async {
            let mut tx = self.pool.begin().await.map_err(|e| statement_failed(&e))?;
            let mut affected = 0u64;
            for statement in statements {
                let result = sqlx::query(statement)
                    .persistent(false)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| statement_failed(&e))?;
                affected = affected.saturating_add(result.rows_affected());
            }
            tx.commit().await.map_err(|e| statement_failed(&e))?;
            Ok::<_, DbForgeError>(affected)
        };

        tokio::time::timeout(self.config.query_timeout, batch)
            .await
            .map_err(|_| batch_timed_out(self.config.query_timeout))?
    }

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }
}

fn is_in_memory(connection_string: &str) -> bool {
    connection_string.contains(":memory:") || connection_string.contains("mode=memory")
}

/// Normalizes a connection string to the `sqlite:` URL form.
fn normalize_connection_string(connection_string: &str) -> String {
    if connection_string == ":memory:" {
        return "sqlite::memory:".to_string();
    }
    if connection_string.starts_with("sqlite:") {
        return connection_string.to_string();
    }
    format!("sqlite://{}", connection_string)
}
