//! Object storage surface consumed by the upload engine.
//!
//! The engine talks to storage only through the [`ObjectStore`] trait so
//! the whole pipeline can run against mocks in tests; [`S3ObjectStore`] is
//! the production implementation over an S3-compatible endpoint reached
//! with short-lived security-token credentials.

mod content_type;
mod presigned;
mod s3;
mod traits;
mod types;

pub use content_type::content_type_for_path;
pub use presigned::{PresignedDestination, parse_presigned_url};
pub use s3::{S3Config, S3ObjectStore};
pub use traits::{BodyStream, ObjectStore};
pub use types::{ObjectPart, PutOptions};

/// Errors produced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid pre-signed url: {0}")]
    InvalidUrl(String),

    #[error("object store request failed: {0}")]
    Request(String),

    #[error("unexpected object store response: {0}")]
    Response(String),
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
