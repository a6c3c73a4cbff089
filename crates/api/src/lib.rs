//! Control-plane surface consumed by the upload engine.
//!
//! The engine needs three calls from the data platform: a security token
//! to reach object storage, a file probe for deduplication, and batched
//! pre-signed upload URLs. They live behind the [`ControlPlane`] trait so
//! tests can swap in mocks; [`HttpControlPlane`] is the JSON-over-HTTP
//! implementation.

mod client;
mod parent;
mod types;

pub use client::{ControlPlane, HttpControlPlane};
pub use parent::UploadParent;
pub use types::{FileDescriptor, RemoteFile, SecurityToken};

/// Errors produced by the control-plane client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid api endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Response(String),
}

/// Result type for control-plane operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
