//! Keeper server library
//!
//! Wires the user and item stores, the object store and the token manager
//! into two gRPC services (`keeper.v1.AuthService`, `keeper.v1.KeeperService`)
//! behind a bearer-token auth layer.

pub mod config;
pub mod error;
pub mod handlers;
pub mod interceptor;
pub mod password;
pub mod service;
pub mod services;
pub mod token;
pub mod validation;

pub use config::{Config, ConfigError, Environment};
pub use error::ServiceError;
pub use interceptor::{AuthInfo, AuthLayer};
pub use password::PasswordHasher;
pub use service::ServiceRunner;
pub use token::{Claims, TokenError, TokenManager};
