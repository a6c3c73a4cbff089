//! Durable checkpoints for resumable multipart uploads.
//!
//! Each upload destination gets one small key/value file on disk holding
//! the upload-id and the list of parts the object store has already
//! accepted, so an interrupted multi-gigabyte upload can resume without
//! retransmitting completed parts.

mod store;
mod types;

pub use store::CheckpointStore;
pub use types::{CompletedPart, MultipartCheckpoint};

/// Well-known key under which the checkpoint is stored inside a store file.
pub const MULTIPART_UPLOAD_INFO_KEY: &str = "STORE-KEY-MULTIPART-UPLOAD-INFO";

/// Errors produced by the checkpoint store.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint corrupted: {0}")]
    Corrupt(String),
}
