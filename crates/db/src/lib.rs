//! Relational persistence for keeper
//!
//! This crate provides:
//! - Sea-ORM entities for the `users` and `vaults` tables
//! - the [`UserStore`] and [`ItemStore`] contracts consumed by the services
//! - [`Database`], the pooled sea-orm implementation of both (Postgres, MySQL/TiDB, SQLite)

pub mod database;
pub mod entity;
pub mod error;
pub mod items;
pub mod schema;
pub mod users;

pub use database::{Database, PoolConfig};
pub use error::{StoreError, StoreResult};
pub use items::{Item, ItemStore, NewItem};
pub use users::{User, UserStore};
