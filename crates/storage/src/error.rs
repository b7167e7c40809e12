use thiserror::Error;

/// Error carried by upload bodies. Callers downcast it to recover their own
/// error type after it has travelled through [`StorageError::Body`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid object handle: {0}")]
    InvalidHandle(String),

    /// The upload body failed; the object was not stored
    #[error("Upload body failed: {0}")]
    Body(#[source] BoxError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("S3 error: {0}")]
    S3(String),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
