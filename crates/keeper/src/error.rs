//! Domain errors of the keeper services and their gRPC status mapping

use db::StoreError;
use storage::{BoxError, StorageError};
use thiserror::Error;
use tonic::Status;
use tracing::error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed request; the message is returned to the client
    #[error("{0}")]
    InvalidInput(String),

    /// Wrong password or unknown email, deliberately indistinguishable
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Storage, object store or worker failure; logged, never echoed
    #[error("internal error in {operation}: {detail}")]
    Internal {
        operation: &'static str,
        detail: String,
    },

    /// Transport-level status (cancelled, deadline exceeded) passed through
    #[error("transport: {0}")]
    Transport(Status),
}

impl ServiceError {
    pub fn internal(operation: &'static str, err: impl std::fmt::Display) -> Self {
        ServiceError::Internal {
            operation,
            detail: err.to_string(),
        }
    }

    /// Translate a store error, keeping the conflict and missing-row kinds
    pub fn store(operation: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(what) => ServiceError::AlreadyExists(what),
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            StoreError::Conflict(what) => ServiceError::AlreadyExists(what),
            StoreError::Database(e) => ServiceError::internal(operation, e),
        }
    }

    pub fn storage(operation: &'static str, err: StorageError) -> Self {
        match err {
            StorageError::NotFound(handle) => ServiceError::NotFound(format!("object {}", handle)),
            StorageError::Body(body) => ServiceError::from_body(operation, body),
            other => ServiceError::internal(operation, other),
        }
    }

    /// Recover the error an upload body failed with. Frame validation and
    /// transport errors travel through the object store boxed.
    pub fn from_body(operation: &'static str, err: BoxError) -> Self {
        match err.downcast::<ServiceError>() {
            Ok(service_error) => *service_error,
            Err(other) => ServiceError::internal(operation, other),
        }
    }
}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidInput(msg) => Status::invalid_argument(msg),
            ServiceError::InvalidCredentials => Status::invalid_argument("invalid credentials"),
            ServiceError::AlreadyExists(what) => Status::already_exists(what),
            ServiceError::NotFound(what) => Status::not_found(what),
            ServiceError::Unauthenticated(msg) => Status::unauthenticated(msg),
            ServiceError::PermissionDenied(msg) => Status::permission_denied(msg),
            ServiceError::Internal { operation, detail } => {
                error!(
                    "Internal error in {}: {}",
                    operation,
                    monitoring::truncate_message(&detail)
                );
                Status::internal("internal error")
            }
            ServiceError::Transport(status) => status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ServiceError::InvalidInput("name is required".into()), Code::InvalidArgument),
            (ServiceError::InvalidCredentials, Code::InvalidArgument),
            (ServiceError::AlreadyExists("gmail".into()), Code::AlreadyExists),
            (ServiceError::NotFound("gmail".into()), Code::NotFound),
            (ServiceError::Unauthenticated("expired".into()), Code::Unauthenticated),
            (ServiceError::PermissionDenied("no".into()), Code::PermissionDenied),
            (ServiceError::internal("get_item", "boom"), Code::Internal),
            (ServiceError::Transport(Status::cancelled("gone")), Code::Cancelled),
            (
                ServiceError::Transport(Status::deadline_exceeded("slow")),
                Code::DeadlineExceeded,
            ),
        ];

        for (err, code) in cases {
            assert_eq!(Status::from(err).code(), code);
        }
    }

    #[test]
    fn test_internal_detail_is_not_echoed() {
        let status = Status::from(ServiceError::internal(
            "create_item",
            "connection refused: postgres://keeper@db:5432",
        ));
        assert_eq!(status.message(), "internal error");
    }

    #[test]
    fn test_store_errors_keep_their_kind() {
        assert!(matches!(
            ServiceError::store("create_item", StoreError::AlreadyExists("gmail".into())),
            ServiceError::AlreadyExists(_)
        ));
        assert!(matches!(
            ServiceError::store("get_item", StoreError::NotFound("gmail".into())),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            ServiceError::store("create_item_stream", StoreError::Conflict("photo".into())),
            ServiceError::AlreadyExists(_)
        ));
    }

    #[test]
    fn test_body_error_round_trips_through_box() {
        let boxed: BoxError = Box::new(ServiceError::InvalidInput("chunk too large".into()));
        match ServiceError::storage("create_item_stream", StorageError::Body(boxed)) {
            ServiceError::InvalidInput(msg) => assert_eq!(msg, "chunk too large"),
            other => panic!("unexpected error: {:?}", other),
        }

        let foreign: BoxError = "socket closed".into();
        assert!(matches!(
            ServiceError::from_body("create_item_stream", foreign),
            ServiceError::Internal { .. }
        ));
    }
}
