//! Proto definitions for the keeper service
//!
//! This crate contains the protobuf definitions, the generated tonic stubs
//! shared by the server and its clients, and the codec for the client-side
//! secret envelope.

pub mod keeper {
    pub mod v1 {
        tonic::include_proto!("keeper.v1");
    }

    pub mod envelope {
        pub mod v1 {
            tonic::include_proto!("keeper.envelope.v1");
        }
    }
}

pub mod secret;

// Re-export the service types for convenience
pub use keeper::v1::*;
pub use secret::{Secret, SecretError};

/// File descriptor set for gRPC reflection
pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("keeper_descriptor");
