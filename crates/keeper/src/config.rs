//! Server configuration
//!
//! Loaded from a TOML file, then selected fields are overridden from the
//! environment so secrets can stay out of the file.

use db::PoolConfig;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::S3Config;
use thiserror::Error;

/// Environment variables that override file values
pub const TOKEN_SECRET_ENV: &str = "KEEPER_TOKEN_SECRET";
pub const STORAGE_PATH_ENV: &str = "KEEPER_STORAGE_PATH";
pub const MINIO_PASSWORD_ENV: &str = "KEEPER_MINIO_PASSWORD";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub env: Environment,

    /// Relational store connection string (postgres://, mysql://, sqlite:)
    #[serde(default)]
    pub storage_path: String,

    #[serde(default)]
    pub grpc: GrpcConfig,

    #[serde(default)]
    pub token: TokenConfig,

    #[serde(default)]
    pub database: PoolConfig,

    #[serde(default)]
    pub objects: ObjectsConfig,

    /// Required when `objects.backend = "minio"`
    #[serde(default)]
    pub minio: Option<S3Config>,

    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GrpcConfig {
    #[serde(default = "default_server_address")]
    pub server_address: String,

    /// Per-call ceiling, long enough for large uploads
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Largest accepted upload chunk and largest emitted download chunk
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    #[serde(default)]
    pub enable_reflection: bool,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            timeout_secs: default_timeout_secs(),
            max_chunk_size: default_max_chunk_size(),
            enable_reflection: false,
        }
    }
}

impl GrpcConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server_address.parse().map_err(|e| {
            ConfigError::Invalid(format!(
                "grpc.server_address '{}': {}",
                self.server_address, e
            ))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// HMAC key; prefer `KEEPER_TOKEN_SECRET` over the file
    #[serde(default)]
    pub secret: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            secret: String::new(),
        }
    }
}

impl TokenConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectBackend {
    #[default]
    Minio,
    Local,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectsConfig {
    #[serde(default)]
    pub backend: ObjectBackend,

    /// Root directory of the local backend
    #[serde(default = "default_objects_root")]
    pub root: PathBuf,
}

impl Default for ObjectsConfig {
    fn default() -> Self {
        Self {
            backend: ObjectBackend::default(),
            root: default_objects_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub address: SocketAddr,
}

fn default_server_address() -> String {
    "0.0.0.0:3200".to_string()
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_max_chunk_size() -> usize {
    1024 * 1024
}

fn default_ttl_secs() -> u64 {
    3600
}

fn default_objects_root() -> PathBuf {
    PathBuf::from("./data/objects")
}

impl Config {
    /// Read, apply environment overrides, validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config = Self::from_toml_str(&raw)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse without overrides or validation
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Replace secrets and the connection string with values from `lookup`
    /// (the process environment in production). Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(secret) = lookup(TOKEN_SECRET_ENV) {
            self.token.secret = secret;
        }
        if let Some(storage_path) = lookup(STORAGE_PATH_ENV) {
            self.storage_path = storage_path;
        }
        if let Some(password) = lookup(MINIO_PASSWORD_ENV) {
            if let Some(minio) = self.minio.as_mut() {
                minio.password = password;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.storage_path.is_empty() {
            return invalid("storage_path is required");
        }
        if self.token.secret.is_empty() {
            return invalid("token.secret is required (or set KEEPER_TOKEN_SECRET)");
        }
        if self.token.ttl_secs == 0 {
            return invalid("token.ttl_secs must be positive");
        }
        if self.grpc.timeout_secs == 0 {
            return invalid("grpc.timeout_secs must be positive");
        }
        if self.grpc.max_chunk_size == 0 {
            return invalid("grpc.max_chunk_size must be positive");
        }
        self.grpc.listen_addr()?;

        if self.objects.backend == ObjectBackend::Minio {
            match &self.minio {
                None => return invalid("[minio] section is required for the minio backend"),
                Some(minio) if minio.bucket.is_empty() => {
                    return invalid("minio.bucket must not be empty")
                }
                Some(minio) if minio.endpoint.is_empty() => {
                    return invalid("minio.endpoint must not be empty")
                }
                Some(_) => {}
            }
        }

        Ok(())
    }
}
