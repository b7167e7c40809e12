//! # Keeper Monitoring
//!
//! Logging and metrics shared by the keeper binaries.
//!
//! ## Available Metrics
//!
//! - `keeper_grpc_requests_total{method,code}` - Total gRPC requests
//! - `keeper_grpc_request_duration_seconds{method,code}` - Request duration histogram
//!
//! ## Usage
//!
//! ```rust,no_run
//! use anyhow::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // keep the guard alive for the lifetime of the process
//!     let _guard = monitoring::init_logging("dev")?;
//!     monitoring::init_metrics()?;
//!     tokio::spawn(monitoring::start_metrics_server("127.0.0.1:9100".parse()?));
//!     Ok(())
//! }
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, truncate_message};
pub use metrics::{create_metrics_server, init_metrics, record_grpc_request, start_metrics_server};
