//! Request-scoped domain operations, independent of the wire protocol

pub mod auth;
pub mod keeper;

pub use auth::AuthService;
pub use keeper::KeeperService;
