//! gRPC adapters over the keeper services

pub mod auth;
pub mod keeper;
pub mod upload;

pub use auth::AuthServiceImpl;
pub use keeper::KeeperServiceImpl;

use std::time::Instant;
use tonic::{Code, Response, Status};

use crate::error::ServiceError;

/// Finish a call: convert the outcome into a gRPC response and record it
pub(crate) fn observe<T>(
    method: &'static str,
    started: Instant,
    result: Result<T, ServiceError>,
) -> Result<Response<T>, Status> {
    let result = result.map(Response::new).map_err(Status::from);
    let code = match &result {
        Ok(_) => Code::Ok,
        Err(status) => status.code(),
    };
    monitoring::record_grpc_request(
        method,
        &format!("{:?}", code),
        started.elapsed().as_secs_f64(),
    );
    result
}
