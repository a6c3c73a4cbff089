//! Upload workers.
//!
//! Each worker loops over the ready channel, performs the PUT or part
//! PUT against object storage with a progress-reporting body, and hands
//! the outcome to the result sink. Workers never retry; cancellation is
//! observed at the network-call boundary.

use std::sync::Arc;

use skylift_storage::{ObjectStore, PutOptions, content_type_for_path};
use tracing::debug;

use crate::pipeline::{JobKind, JobResult, UploadJob};
use crate::progress::ProgressBody;
use crate::state::{EngineShared, UploadStatus};
use crate::EngineError;

pub(crate) async fn run_worker(
    id: usize,
    shared: Arc<EngineShared>,
    object_store: Arc<dyn ObjectStore>,
    jobs_rx: flume::Receiver<UploadJob>,
    results_tx: flume::Sender<JobResult>,
) {
    while let Ok(job) = jobs_rx.recv_async().await {
        debug!(
            worker = id,
            path = %job.path.display(),
            part = job.part_number(),
            "worker received upload job"
        );
        let outcome = if shared.cancel.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            upload(&shared, object_store.as_ref(), &job).await
        };
        if results_tx.send_async(JobResult { job, outcome }).await.is_err() {
            break;
        }
    }
    debug!(worker = id, "worker stopped");
}

async fn upload(
    shared: &EngineShared,
    object_store: &dyn ObjectStore,
    job: &UploadJob,
) -> Result<Option<skylift_storage::ObjectPart>, EngineError> {
    match &job.kind {
        JobKind::Single { sha256 } => {
            if let Some(entry) = shared.set.get(&job.path) {
                entry.set_status(UploadStatus::UploadInProgress);
            }
            let body = ProgressBody::new(
                Arc::clone(&job.file),
                job.path.clone(),
                0,
                job.size,
                shared.progress_tx.clone(),
            );
            let opts = PutOptions {
                user_tags: job.tags.clone(),
                content_type: Some(content_type_for_path(&job.path).to_string()),
            };
            object_store
                .put_object(
                    &job.bucket,
                    &job.key,
                    body.into_stream(),
                    job.size,
                    sha256,
                    &opts,
                )
                .await
                .map_err(EngineError::PartUpload)?;
            Ok(None)
        }
        JobKind::Part {
            upload_id,
            part_number,
            offset,
            ..
        } => {
            let body = ProgressBody::new(
                Arc::clone(&job.file),
                job.path.clone(),
                *offset,
                job.size,
                shared.progress_tx.clone(),
            );
            let part = object_store
                .put_object_part(
                    &job.bucket,
                    &job.key,
                    upload_id,
                    *part_number,
                    body.into_stream(),
                    job.size,
                )
                .await
                .map_err(EngineError::PartUpload)?;
            Ok(Some(part))
        }
    }
}
