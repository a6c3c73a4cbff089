//! Upload planning.
//!
//! Walks the file list in discovery order and turns each file into either
//! one single-PUT job or a sequence of multipart part jobs, reconciling
//! multipart files with the durable checkpoint store first so completed
//! parts are never retransmitted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use skylift_checkpoint::{CheckpointError, CheckpointStore, MultipartCheckpoint};
use skylift_storage::{ObjectStore, PresignedDestination, PutOptions, parse_presigned_url};
use tracing::debug;

use crate::pipeline::{JobKind, UploadJob};
use crate::state::{EngineShared, FileEntry, UploadStatus};
use crate::{EngineError, MAX_OBJECT_SIZE, sink};

/// Upper bound the object store places on parts per upload. The part size
/// is grown past the configured value for files that would not fit.
pub(crate) const MAX_PARTS: u64 = 10_000;

pub(crate) struct ProducerContext {
    pub shared: Arc<EngineShared>,
    pub object_store: Arc<dyn ObjectStore>,
    pub checkpoint_dir: PathBuf,
    pub scope_id: String,
    pub part_size: u64,
}

/// Emits jobs for every file that received an upload URL, in discovery
/// order. Per-file planning failures mark that file failed and move on.
pub(crate) async fn produce_jobs(
    ctx: ProducerContext,
    urls: HashMap<PathBuf, String>,
    jobs_tx: flume::Sender<UploadJob>,
) {
    for entry in ctx.shared.set.entries_in_order() {
        if ctx.shared.cancel.is_cancelled() {
            break;
        }
        let path = entry.path().to_path_buf();
        let Some(url) = urls.get(&path) else {
            continue;
        };
        let dest = match parse_presigned_url(url) {
            Ok(dest) => dest,
            Err(e) => {
                ctx.shared.fail_file(
                    &path,
                    EngineError::InvalidConfig(format!("unable to parse upload url: {e}")),
                );
                continue;
            }
        };

        if entry.size() <= ctx.part_size {
            let file = match std::fs::File::open(&path) {
                Ok(file) => Arc::new(file),
                Err(e) => {
                    ctx.shared.fail_file(&path, EngineError::Io(e));
                    continue;
                }
            };
            let job = UploadJob {
                path: path.clone(),
                bucket: dest.bucket,
                key: dest.key,
                tags: dest.user_tags,
                file,
                size: entry.size(),
                kind: JobKind::Single {
                    sha256: entry.sha256(),
                },
            };
            if jobs_tx.send_async(job).await.is_err() {
                break;
            }
            continue;
        }

        match plan_multipart(&ctx, &entry, &path, &dest).await {
            Ok(Plan::Jobs(jobs)) => {
                let mut first = true;
                let mut closed = false;
                for job in jobs {
                    if jobs_tx.send_async(job).await.is_err() {
                        closed = true;
                        break;
                    }
                    if first {
                        entry.set_status(UploadStatus::UploadInProgress);
                        first = false;
                    }
                }
                if closed {
                    break;
                }
            }
            Ok(Plan::AlreadyComplete { checkpoint, store }) => {
                // Every part landed in a previous run; only completion is
                // left to do.
                debug!(path = %path.display(), "checkpoint already holds all parts");
                if let Err(err) = sink::finalize_multipart(
                    &ctx.shared,
                    ctx.object_store.as_ref(),
                    &path,
                    &dest.bucket,
                    &dest.key,
                    &dest.user_tags,
                    &checkpoint,
                    &store,
                )
                .await
                {
                    ctx.shared.fail_file(&path, err);
                }
            }
            Err(err) => ctx.shared.fail_file(&path, err),
        }
    }
    debug!("upload producer finished");
}

enum Plan {
    Jobs(Vec<UploadJob>),
    AlreadyComplete {
        checkpoint: MultipartCheckpoint,
        store: Arc<CheckpointStore>,
    },
}

async fn plan_multipart(
    ctx: &ProducerContext,
    entry: &FileEntry,
    path: &Path,
    dest: &PresignedDestination,
) -> Result<Plan, EngineError> {
    let size = entry.size();
    check_object_size(size)?;

    let store = Arc::new(CheckpointStore::open(
        &ctx.checkpoint_dir,
        path,
        &ctx.scope_id,
        &entry.sha256(),
        ctx.part_size,
    )?);

    let mut checkpoint = match store.load() {
        Ok(checkpoint) => checkpoint,
        Err(CheckpointError::Corrupt(msg)) => {
            debug!(path = %path.display(), "resetting corrupt checkpoint: {msg}");
            store.reset()?;
            MultipartCheckpoint::default()
        }
        Err(e) => return Err(e.into()),
    };

    // Verify a remembered upload-id is still alive on the server; an
    // error or an empty part list means it was garbage-collected.
    if !checkpoint.upload_id.is_empty() {
        match ctx
            .object_store
            .list_object_parts(&dest.bucket, &dest.key, &checkpoint.upload_id)
            .await
        {
            Ok(parts) if !parts.is_empty() => {
                debug!(
                    path = %path.display(),
                    upload_id = %checkpoint.upload_id,
                    parts = checkpoint.parts.len(),
                    "resuming multipart upload"
                );
            }
            Ok(_) | Err(_) => {
                debug!(
                    path = %path.display(),
                    upload_id = %checkpoint.upload_id,
                    "stale upload id, starting over"
                );
                store.reset()?;
                checkpoint = MultipartCheckpoint::default();
            }
        }
    }

    if checkpoint.upload_id.is_empty() {
        let opts = PutOptions {
            user_tags: dest.user_tags.clone(),
            content_type: Some(
                skylift_storage::content_type_for_path(path).to_string(),
            ),
        };
        let upload_id = ctx
            .object_store
            .new_multipart_upload(&dest.bucket, &dest.key, &opts)
            .await
            .map_err(EngineError::InitiateMultipart)?;
        checkpoint = MultipartCheckpoint::new(upload_id);
        store.save(&checkpoint)?;
    }

    let (total_parts, part_len, last_len) = optimal_part_plan(size, ctx.part_size);
    debug!(
        path = %path.display(),
        total_parts,
        part_len,
        last_len,
        "planned multipart upload"
    );

    // Pre-set the counter so the display starts mid-progress on resume.
    entry.set_uploaded(checkpoint.uploaded_size as i64);

    if checkpoint.is_complete(total_parts) {
        return Ok(Plan::AlreadyComplete { checkpoint, store });
    }

    let file = Arc::new(std::fs::File::open(path)?);
    let mut jobs = Vec::new();
    for part_number in 1..=total_parts {
        if checkpoint.has_part(part_number) {
            continue;
        }
        let read_size = if part_number == total_parts {
            last_len
        } else {
            part_len
        };
        jobs.push(UploadJob {
            path: path.to_path_buf(),
            bucket: dest.bucket.clone(),
            key: dest.key.clone(),
            tags: dest.user_tags.clone(),
            file: Arc::clone(&file),
            size: read_size,
            kind: JobKind::Part {
                upload_id: checkpoint.upload_id.clone(),
                part_number,
                total_parts,
                offset: u64::from(part_number - 1) * part_len,
                store: Arc::clone(&store),
            },
        });
    }
    Ok(Plan::Jobs(jobs))
}

/// Enforces the hard per-object cap before any planning work.
pub(crate) fn check_object_size(size: u64) -> Result<(), EngineError> {
    if size > MAX_OBJECT_SIZE {
        return Err(EngineError::FileTooLarge {
            size,
            max: MAX_OBJECT_SIZE,
        });
    }
    Ok(())
}

/// Splits `size` into parts: the first `n-1` parts take the configured
/// size, the last takes the remainder. The part size grows only when the
/// file would otherwise exceed the store's part-count limit.
pub(crate) fn optimal_part_plan(size: u64, configured_part_size: u64) -> (u16, u64, u64) {
    let part_size = configured_part_size.max(size.div_ceil(MAX_PARTS));
    let total = size.div_ceil(part_size).max(1);
    let last = size - (total - 1) * part_size;
    (total as u16, part_size, last)
}
