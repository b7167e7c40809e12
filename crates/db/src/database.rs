//! Database connection and pool management

use sea_orm::{ConnectOptions, ConnectionTrait, Database as SeaOrmDatabase, DatabaseConnection};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::StoreResult;

/// Connection pool settings (`[database]` section of the server config)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Log every statement through sqlx
    #[serde(default)]
    pub sql_logging: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout(),
            sql_logging: false,
        }
    }
}

impl PoolConfig {
    /// A pool pinned to one connection. Required for `sqlite::memory:`, where
    /// every connection would otherwise open its own empty database.
    pub fn single_connection() -> Self {
        Self {
            max_connections: 1,
            min_connections: 1,
            ..Self::default()
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    10
}

/// Pooled database handle shared by every request
#[derive(Clone)]
pub struct Database {
    connection: DatabaseConnection,
}

impl Database {
    /// Connect with retries; the pool is shared by all stores
    pub async fn connect(database_url: &str, pool: &PoolConfig) -> StoreResult<Self> {
        info!("Connecting to database: {}", mask_connection_string(database_url));

        let mut attempts = 0;
        const MAX_ATTEMPTS: u32 = 3;
        const RETRY_DELAY: Duration = Duration::from_secs(2);

        loop {
            attempts += 1;

            let mut opt = ConnectOptions::new(database_url.to_string());
            opt.max_connections(pool.max_connections)
                .min_connections(pool.min_connections)
                .connect_timeout(Duration::from_secs(pool.connect_timeout_secs))
                .acquire_timeout(Duration::from_secs(30))
                .sqlx_logging(pool.sql_logging);

            match SeaOrmDatabase::connect(opt).await {
                Ok(connection) => {
                    info!(
                        "Database connection established (pool max: {}, min: {})",
                        pool.max_connections, pool.min_connections
                    );
                    return Ok(Self { connection });
                }
                Err(e) if attempts < MAX_ATTEMPTS => {
                    warn!(
                        "Failed to connect to database (attempt {}/{}): {}",
                        attempts, MAX_ATTEMPTS, e
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
                Err(e) => {
                    error!("Failed to connect to database after {} attempts", MAX_ATTEMPTS);
                    return Err(e.into());
                }
            }
        }
    }

    /// Get a reference to the database connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// Health check
    pub async fn ping(&self) -> StoreResult<()> {
        self.connection.ping().await?;
        Ok(())
    }

    /// Create the `users` and `vaults` tables when they are missing
    pub async fn bootstrap_schema(&self) -> StoreResult<()> {
        let backend = self.connection.get_database_backend();
        for statement in crate::schema::statements(backend) {
            self.connection.execute_unprepared(statement).await?;
        }
        info!("Schema bootstrapped for {:?}", backend);
        Ok(())
    }
}

/// Mask the credentials of a connection string for logging
pub fn mask_connection_string(conn_str: &str) -> String {
    if let Some(at_pos) = conn_str.rfind('@') {
        if let Some(double_slash_pos) = conn_str.find("//") {
            if double_slash_pos < at_pos {
                let prefix = &conn_str[..double_slash_pos + 2];
                let suffix = &conn_str[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
    }
    conn_str.to_string()
}
