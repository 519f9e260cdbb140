//! Database connection configuration.
//!
//! `ConnectionConfig` carries pool sizing and timeouts for the statement
//! executors. It never stores a password: the full URL is handed to the
//! executor factory separately and only ever logged in redacted form.

use crate::error::DbForgeError;
use crate::models::DatabaseType;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Configuration for database connections.
///
/// # Example
/// ```rust
/// use dbforge_core::config::ConnectionConfig;
/// use std::time::Duration;
///
/// let config = ConnectionConfig::new("localhost".to_string())
///     .with_port(5432)
///     .with_database("ventas".to_string())
///     .with_query_timeout(Duration::from_secs(120));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host address
    pub host: String,
    /// Optional port number
    pub port: Option<u16>,
    /// Optional database name
    pub database: Option<String>,
    /// Optional username (password handled separately)
    pub username: Option<String>,
    /// Pool acquire timeout
    pub connect_timeout: Duration,
    /// Upper bound for executing one batch
    pub query_timeout: Duration,
    /// Maximum number of connections in pool
    pub max_connections: u32,
    /// How long an idle pooled connection is kept
    pub idle_timeout: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            database: None,
            username: None,
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(300),
            max_connections: 5,
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

impl std::fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ConnectionConfig({}{}{})",
            self.host,
            self.port.map_or_else(String::new, |p| format!(":{}", p)),
            self.database
                .as_ref()
                .map_or_else(String::new, |db| format!("/{}", db))
        )
    }
}

impl ConnectionConfig {
    /// Validates connection configuration parameters.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(DbForgeError::configuration("host cannot be empty"));
        }

        if self.port == Some(0) {
            return Err(DbForgeError::configuration("port must be greater than 0"));
        }

        if self.max_connections == 0 {
            return Err(DbForgeError::configuration(
                "max_connections must be greater than 0",
            ));
        }

        if self.max_connections > 100 {
            return Err(DbForgeError::configuration(
                "max_connections should not exceed 100",
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(DbForgeError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(DbForgeError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Creates a new connection config with default pool settings.
    pub fn new(host: String) -> Self {
        Self {
            host,
            ..Default::default()
        }
    }

    /// Derives host, port, database and username from a connection URL.
    ///
    /// The password component is ignored.
    ///
    /// # Errors
    /// Returns a configuration error for an unrecognized URL.
    pub fn from_url(database_url: &str) -> Result<Self> {
        match detect_database_type(database_url)? {
            DatabaseType::SQLite => {
                let mut config = Self::new("localhost".to_string());
                config.max_connections = 1;
                config.database = Some(sqlite_database_name(database_url));
                Ok(config)
            }
            DatabaseType::PostgreSQL => {
                let url = Url::parse(database_url).map_err(|e| {
                    DbForgeError::configuration(format!(
                        "Invalid PostgreSQL connection string format: {}",
                        e
                    ))
                })?;
                let mut config = Self::new(url.host_str().unwrap_or("localhost").to_string())
                    .with_port(url.port().unwrap_or(5432));

                let database = url.path().trim_start_matches('/');
                if !database.is_empty() {
                    config = config.with_database(database.to_string());
                }
                if !url.username().is_empty() {
                    config = config.with_username(url.username().to_string());
                }
                Ok(config)
            }
        }
    }

    /// Builder method to set port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Builder method to set database.
    pub fn with_database(mut self, database: String) -> Self {
        self.database = Some(database);
        self
    }

    /// Builder method to set username.
    pub fn with_username(mut self, username: String) -> Self {
        self.username = Some(username);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }
}

/// Detects the database type from a connection string.
///
/// # Errors
/// Returns a configuration error if the format is unrecognized.
pub fn detect_database_type(connection_string: &str) -> Result<DatabaseType> {
    if connection_string.starts_with("postgres://")
        || connection_string.starts_with("postgresql://")
    {
        Ok(DatabaseType::PostgreSQL)
    } else if connection_string.starts_with("sqlite:")
        || connection_string == ":memory:"
        || connection_string.ends_with(".db")
        || connection_string.ends_with(".sqlite")
        || connection_string.ends_with(".sqlite3")
    {
        Ok(DatabaseType::SQLite)
    } else {
        Err(DbForgeError::configuration(
            "Unrecognized database connection string format (expected postgres://, postgresql:// or sqlite:)",
        ))
    }
}

fn sqlite_database_name(connection_string: &str) -> String {
    if connection_string.contains(":memory:") || connection_string.contains("mode=memory") {
        return ":memory:".to_string();
    }
    let path = connection_string
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map_or_else(|| "main".to_string(), str::to_string)
}
