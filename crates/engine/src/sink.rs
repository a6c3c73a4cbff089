//! Result sink.
//!
//! Persists each successful part to the checkpoint store and, once every
//! part of a file has landed, completes the multipart upload, deletes the
//! checkpoint and marks the file done.

use std::collections::BTreeMap;
use std::path::Path;

use skylift_checkpoint::{CheckpointStore, CompletedPart, MultipartCheckpoint};
use skylift_storage::{ObjectPart, ObjectStore, PutOptions, content_type_for_path};
use tracing::debug;

use crate::pipeline::{JobKind, JobResult};
use crate::state::{EngineShared, UploadStatus};
use crate::EngineError;

/// Handles one worker result. Returns the error that should fail the
/// file, if any.
pub(crate) async fn handle_result(
    shared: &EngineShared,
    object_store: &dyn ObjectStore,
    result: JobResult,
) -> Result<(), EngineError> {
    let JobResult { job, outcome } = result;
    let part = outcome?;

    match (&job.kind, part) {
        (JobKind::Single { .. }, _) => {
            shared.complete_file(&job.path);
            Ok(())
        }
        (
            JobKind::Part {
                upload_id,
                part_number,
                total_parts,
                store,
                ..
            },
            Some(object_part),
        ) => {
            // Transactional append: read, add the part, write back under
            // the store lock.
            let record = CompletedPart {
                part_number: *part_number,
                etag: object_part.etag,
                checksum_crc32: object_part.checksum_crc32,
                checksum_crc32c: object_part.checksum_crc32c,
                checksum_sha1: object_part.checksum_sha1,
                checksum_sha256: object_part.checksum_sha256,
            };
            let size = job.size;
            let upload_id = upload_id.clone();
            let checkpoint = store.update(move |checkpoint| {
                checkpoint.upload_id = upload_id;
                checkpoint.record_part(record, size);
            })?;

            if checkpoint.is_complete(*total_parts) {
                finalize_multipart(
                    shared,
                    object_store,
                    &job.path,
                    &job.bucket,
                    &job.key,
                    &job.tags,
                    &checkpoint,
                    store,
                )
                .await?;
            }
            Ok(())
        }
        (JobKind::Part { .. }, None) => Ok(()),
    }
}

/// Completes a multipart upload whose parts have all been persisted:
/// sorts the parts, issues the completion call, deletes the checkpoint
/// and marks the file uploaded. Skipped under cancellation so a later
/// run can resume instead.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn finalize_multipart(
    shared: &EngineShared,
    object_store: &dyn ObjectStore,
    path: &Path,
    bucket: &str,
    key: &str,
    tags: &BTreeMap<String, String>,
    checkpoint: &MultipartCheckpoint,
    store: &CheckpointStore,
) -> Result<(), EngineError> {
    if shared.cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    if let Some(entry) = shared.set.get(path) {
        entry.set_status(UploadStatus::MultipartCompletionInProgress);
    }

    let parts: Vec<ObjectPart> = checkpoint
        .sorted_parts()
        .into_iter()
        .map(|part| ObjectPart {
            part_number: part.part_number,
            etag: part.etag,
            checksum_crc32: part.checksum_crc32,
            checksum_crc32c: part.checksum_crc32c,
            checksum_sha1: part.checksum_sha1,
            checksum_sha256: part.checksum_sha256,
        })
        .collect();

    let opts = PutOptions {
        user_tags: tags.clone(),
        content_type: Some(content_type_for_path(path).to_string()),
    };
    object_store
        .complete_multipart_upload(bucket, key, &checkpoint.upload_id, &parts, &opts)
        .await
        .map_err(EngineError::CompleteMultipart)?;

    if let Err(e) = store.delete() {
        debug!(path = %path.display(), error = %e, "failed to delete checkpoint");
    }
    shared.complete_file(path);
    Ok(())
}
