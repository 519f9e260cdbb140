//! PostgreSQL statement executor.
//!
//! Every pooled connection gets a server-side `statement_timeout` matching
//! the configured query timeout and an `application_name` identifying the
//! loader.

use super::{StatementExecutor, batch_timed_out, statement_failed};
use crate::Result;
use crate::config::ConnectionConfig;
use crate::error::{DbForgeError, redact_database_url};
use crate::models::DatabaseType;
use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Executor backed by a `sqlx` PostgreSQL pool.
pub struct PostgresExecutor {
    pool: PgPool,
    config: ConnectionConfig,
}

impl PostgresExecutor {
    /// Creates the connection pool.
    ///
    /// Connections are opened lazily; use
    /// [`StatementExecutor::test_connection`] to check reachability.
    ///
    /// # Errors
    /// Returns a configuration error for a malformed URL.
    pub async fn connect(database_url: &str, config: &ConnectionConfig) -> Result<Self> {
        use sqlx::Executor;

        config.validate()?;
        let statement_timeout_ms = config.query_timeout.as_millis();

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.min(100))
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    conn.execute(
                        format!("SET statement_timeout = {}", statement_timeout_ms).as_str(),
                    )
                    .await?;
                    let app_name = format!("dbforge-{}", env!("CARGO_PKG_VERSION"));
                    conn.execute(format!("SET application_name = '{}'", app_name).as_str())
                        .await?;
                    Ok(())
                })
            })
            .connect_lazy(database_url)
            .map_err(|e| {
                DbForgeError::configuration(format!(
                    "Failed to create PostgreSQL connection pool for {}: {}",
                    redact_database_url(database_url),
                    e
                ))
            })?;

        tracing::debug!("PostgreSQL pool ready ({})", config);
        Ok(Self {
            pool,
            config: config.clone(),
        })
    }

    /// Closes the connection pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl StatementExecutor for PostgresExecutor {
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
        DatabaseType::PostgreSQL
    }
}
