use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use skylift_checkpoint::CheckpointStore;
use skylift_storage::ObjectPart;

use crate::EngineError;

/// A self-contained unit of work handed from the producer to a worker.
pub(crate) struct UploadJob {
    pub path: PathBuf,
    pub bucket: String,
    pub key: String,
    pub tags: BTreeMap<String, String>,
    /// Read handle shared by every job of the same file; workers read it
    /// positionally through non-overlapping sections.
    pub file: Arc<std::fs::File>,
    /// Exact bytes this job reads: the whole file for a single PUT, the
    /// part length for a multipart part.
    pub size: u64,
    pub kind: JobKind,
}

pub(crate) enum JobKind {
    Single {
        sha256: String,
    },
    Part {
        upload_id: String,
        part_number: u16,
        total_parts: u16,
        offset: u64,
        store: Arc<CheckpointStore>,
    },
}

impl UploadJob {
    /// Part number for scheduling; single PUTs count as part 0 and are
    /// always admissible.
    pub fn part_number(&self) -> u16 {
        match &self.kind {
            JobKind::Single { .. } => 0,
            JobKind::Part { part_number, .. } => *part_number,
        }
    }
}

/// Outcome of one job, flowing from worker back to the result sink.
pub(crate) struct JobResult {
    pub job: UploadJob,
    /// `Some(part)` for multipart parts, `None` for single PUTs.
    pub outcome: Result<Option<ObjectPart>, EngineError>,
}
