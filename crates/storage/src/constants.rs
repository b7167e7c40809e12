//! Centralized constants for the storage crate

// =============================================================================
// S3 Configuration
// =============================================================================

/// Multipart part size (5 MiB, the smallest part S3 accepts except the last).
/// Bodies shorter than one part are sent with a single PutObject.
pub const PART_SIZE: usize = 5 * 1024 * 1024;

/// Default bucket for item payloads.
pub const DEFAULT_BUCKET: &str = "keeper";

/// MinIO ignores the region, the SDK still requires one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Content type used for item payloads; the server never interprets them.
pub const OCTET_STREAM: &str = "application/octet-stream";

// =============================================================================
// File System Settings
// =============================================================================

/// Read size of the local backend when streaming an object back.
pub const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Suffix of in-flight local uploads; renamed away on success.
pub const PARTIAL_SUFFIX: &str = ".partial";
