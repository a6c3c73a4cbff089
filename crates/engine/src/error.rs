use skylift_api::ApiError;
use skylift_checkpoint::CheckpointError;
use skylift_storage::StorageError;

/// Errors surfaced by the upload engine.
///
/// Per-file failures accumulate in the run report; only pre-flight
/// problems abort the run itself.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid upload configuration: {0}")]
    InvalidConfig(String),

    #[error("unable to calculate sha256: {0}")]
    Digest(#[source] std::io::Error),

    #[error("unable to generate security token: {0}")]
    SecurityToken(#[source] ApiError),

    #[error("unable to generate upload urls: {0}")]
    UrlGeneration(String),

    #[error("checkpoint corrupted: {0}")]
    CheckpointCorruption(String),

    #[error("initiate multipart upload failed: {0}")]
    InitiateMultipart(#[source] StorageError),

    #[error("part upload failed: {0}")]
    PartUpload(#[source] StorageError),

    #[error("complete multipart upload failed: {0}")]
    CompleteMultipart(#[source] StorageError),

    #[error("proposed upload size {size} exceeds the maximum object size {max}")]
    FileTooLarge { size: u64, max: u64 },

    #[error("upload cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CheckpointError> for EngineError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::Io(e) => Self::Io(e),
            CheckpointError::Corrupt(msg) => Self::CheckpointCorruption(msg),
        }
    }
}
