//! Engine facade: wires discovery, digesting, URL batching, the worker
//! pipeline and the monitor together for one upload run.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use skylift_api::{ControlPlane, FileDescriptor, UploadParent};
use skylift_storage::{ObjectStore, S3Config, S3ObjectStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::opts::{ResolvedSource, SourceOptions, UploadOptions};
use crate::producer::{self, ProducerContext};
use crate::state::{EngineShared, UploadStatus};
use crate::{EngineError, URL_BATCH_SIZE, digest, discovery, monitor, scheduler, worker};

/// Outcome of one engine run.
///
/// Every discovered file lands in exactly one bucket: completed, skipped
/// (previously uploaded) or failed.
#[derive(Debug)]
pub struct UploadReport {
    pub total: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: BTreeMap<PathBuf, EngineError>,
    pub cancelled: bool,
}

impl UploadReport {
    /// `true` when nothing failed and the run was not cancelled.
    pub fn success(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }
}

/// The resumable parallel upload engine.
///
/// Construct once per destination with [`connect`](Self::connect) (or
/// [`with_object_store`](Self::with_object_store) to inject a custom
/// storage backend), then [`run`](Self::run) an upload.
pub struct UploadEngine {
    control: Arc<dyn ControlPlane>,
    object_store: Arc<dyn ObjectStore>,
    opts: UploadOptions,
    part_size: u64,
    interactive: bool,
    cancel: CancellationToken,
    checkpoint_dir: PathBuf,
}

impl UploadEngine {
    /// Builds an engine whose object-store client is constructed from a
    /// freshly generated security token.
    pub async fn connect(
        control: Arc<dyn ControlPlane>,
        project: &str,
        opts: UploadOptions,
    ) -> Result<Self, EngineError> {
        let token = control
            .generate_security_token(project)
            .await
            .map_err(EngineError::SecurityToken)?;
        let object_store = Arc::new(S3ObjectStore::new(&S3Config {
            endpoint: token.endpoint,
            access_key_id: token.access_key_id,
            access_key_secret: token.access_key_secret,
            session_token: token.session_token,
        }));
        Self::with_object_store(control, object_store, opts)
    }

    /// Builds an engine around an existing object-store implementation.
    pub fn with_object_store(
        control: Arc<dyn ControlPlane>,
        object_store: Arc<dyn ObjectStore>,
        opts: UploadOptions,
    ) -> Result<Self, EngineError> {
        let part_size = opts.validate()?;
        let interactive = opts.use_interactive();
        if !opts.no_tty && !opts.tty && !interactive {
            info!("Detected headless environment, automatically using non-interactive mode");
        }
        Ok(Self {
            control,
            object_store,
            opts,
            part_size,
            interactive,
            cancel: CancellationToken::new(),
            checkpoint_dir: default_checkpoint_dir(),
        })
    }

    /// Overrides where checkpoint stores live.
    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    /// Token that aborts the run when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Uploads everything `source` selects into `parent`.
    ///
    /// Runs to completion across sibling files; per-file failures are
    /// collected in the report rather than aborting the run.
    pub async fn run(
        &self,
        parent: &UploadParent,
        source: &SourceOptions,
    ) -> Result<UploadReport, EngineError> {
        let resolved = source.resolve()?;

        let (progress_tx, progress_rx) = flume::unbounded();
        let shared = Arc::new(EngineShared::new(
            self.cancel.clone(),
            progress_tx,
            !self.interactive,
        ));
        let finished = CancellationToken::new();

        // Discovery: expand the source into concrete file entries.
        let mut discovered = Vec::new();
        for path in &resolved.paths {
            discovered.extend(discovery::find_files(
                path,
                source.recursive,
                source.include_hidden,
            ));
        }
        for path in &discovered {
            shared.set.add(path.clone());
        }
        let additional: Vec<PathBuf> = source.additional_uploads.keys().cloned().collect();
        for path in &additional {
            shared.set.add(path.clone());
        }
        // Entries deduplicate, so count what actually landed in the set.
        shared.completion.add(shared.set.len());

        if !self.interactive {
            info!("Starting upload in non-interactive mode...");
        }

        // Progress drainer: the single writer of uploaded counters.
        let drainer = {
            let shared = Arc::clone(&shared);
            let finished = finished.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        msg = progress_rx.recv_async() => match msg {
                            Ok(msg) => {
                                if let Some(entry) = shared.set.get(&msg.path) {
                                    entry.add_uploaded(msg.delta);
                                }
                            }
                            Err(_) => break,
                        },
                        _ = finished.cancelled() => {
                            while let Ok(msg) = progress_rx.try_recv() {
                                if let Some(entry) = shared.set.get(&msg.path) {
                                    entry.add_uploaded(msg.delta);
                                }
                            }
                            break;
                        }
                    }
                }
            })
        };

        // Monitor.
        enum MonitorHandle {
            Interactive(tokio::task::JoinHandle<std::io::Result<bool>>),
            Headless(tokio::task::JoinHandle<()>),
        }
        let monitor_handle = if self.interactive {
            let shared = Arc::clone(&shared);
            let finished = finished.clone();
            MonitorHandle::Interactive(tokio::task::spawn_blocking(move || {
                monitor::run_interactive(shared, finished)
            }))
        } else {
            let shared = Arc::clone(&shared);
            let finished = finished.clone();
            MonitorHandle::Headless(tokio::spawn(monitor::run_headless(shared, finished)))
        };

        // Digest, existence probe and URL batching.
        let urls = self
            .prepare_uploads(&shared, parent, source, &resolved, &discovered)
            .await;

        // Pipeline: producer -> scheduler -> workers -> sink.
        let (jobs_tx, jobs_rx) = flume::bounded(0);
        let (ready_tx, ready_rx) = flume::bounded(0);
        let (results_tx, results_rx) = flume::bounded(0);

        let workers: Vec<_> = (0..self.opts.threads)
            .map(|id| {
                tokio::spawn(worker::run_worker(
                    id,
                    Arc::clone(&shared),
                    Arc::clone(&self.object_store),
                    ready_rx.clone(),
                    results_tx.clone(),
                ))
            })
            .collect();
        drop(ready_rx);
        drop(results_tx);

        let producer_handle = tokio::spawn(producer::produce_jobs(
            ProducerContext {
                shared: Arc::clone(&shared),
                object_store: Arc::clone(&self.object_store),
                checkpoint_dir: self.checkpoint_dir.clone(),
                scope_id: parent.scope_id().to_string(),
                part_size: self.part_size,
            },
            urls,
            jobs_tx,
        ));
        let scheduler_handle = tokio::spawn(scheduler::run_scheduler(
            Arc::clone(&shared),
            Arc::clone(&self.object_store),
            jobs_rx,
            ready_tx,
            results_rx,
            self.opts.threads,
            self.part_size,
        ));

        tokio::select! {
            _ = shared.completion.wait() => {}
            _ = self.cancel.cancelled() => {
                debug!("cancellation observed, draining in-flight uploads");
            }
        }

        let _ = producer_handle.await;
        let _ = scheduler_handle.await;
        for handle in workers {
            let _ = handle.await;
        }

        finished.cancel();
        let manual_quit = match monitor_handle {
            MonitorHandle::Interactive(handle) => match handle.await {
                Ok(Ok(quit)) => quit,
                Ok(Err(e)) => {
                    warn!(error = %e, "status monitor failed");
                    false
                }
                Err(_) => false,
            },
            MonitorHandle::Headless(handle) => {
                let _ = handle.await;
                false
            }
        };
        let _ = drainer.await;

        let failed = shared.take_errors();
        let totals = shared.set.totals();
        if !failed.is_empty() {
            info!("{} files failed to upload", failed.len());
            for (path, err) in &failed {
                error!(path = %path.display(), error = %err, "upload failed");
            }
        }
        if manual_quit {
            warn!("Upload quit manually");
        }

        Ok(UploadReport {
            total: totals.total,
            completed: totals.completed,
            skipped: totals.skipped,
            failed,
            cancelled: self.cancel.is_cancelled(),
        })
    }

    /// Serial digest/probe pass producing the file -> pre-signed URL map.
    async fn prepare_uploads(
        &self,
        shared: &Arc<EngineShared>,
        parent: &UploadParent,
        source: &SourceOptions,
        resolved: &ResolvedSource,
        discovered: &[PathBuf],
    ) -> HashMap<PathBuf, String> {
        let mut urls = HashMap::new();
        let mut batch: Vec<FileDescriptor> = Vec::new();
        let mut batch_paths: HashMap<String, PathBuf> = HashMap::new();

        if !self.interactive && !discovered.is_empty() {
            info!("Processing {} files for upload...", discovered.len());
        }

        for path in discovered {
            if shared.cancel.is_cancelled() {
                break;
            }
            let Some(entry) = shared.set.get(path) else {
                continue;
            };

            entry.set_status(UploadStatus::CalculatingSha256);
            let (sha256, size) = match run_digest(path).await {
                Ok(digest) => digest,
                Err(e) => {
                    shared.fail_file(path, EngineError::Digest(e));
                    continue;
                }
            };
            entry.set_digest(sha256.clone(), size);

            let Ok(relative) = path.strip_prefix(&resolved.rel_dir) else {
                shared.fail_file(
                    path,
                    EngineError::InvalidConfig(format!(
                        "unable to compute relative path for {}",
                        path.display()
                    )),
                );
                continue;
            };
            let remote_path = match source.target_dir.as_deref() {
                Some(target) if !target.is_empty() => Path::new(target).join(relative),
                _ => relative.to_path_buf(),
            };
            let remote_path = remote_path.to_string_lossy().replace('\\', "/");
            let resource_name = parent.resource_name(&remote_path);

            // Dedup probe: an identical remote copy short-circuits the
            // file. Probe errors mean "not present" and we upload.
            if let Ok(Some(remote_file)) = self.control.get_file(&resource_name).await {
                if remote_file.sha256 == sha256 && remote_file.size == size {
                    entry.set_remote_path(remote_path);
                    shared.skip_file(path);
                    continue;
                }
            }

            entry.set_status(UploadStatus::WaitingForUpload);
            entry.set_remote_path(remote_path.clone());
            batch.push(FileDescriptor {
                name: resource_name.clone(),
                filename: remote_path,
                sha256,
                size,
            });
            batch_paths.insert(resource_name, path.clone());

            if batch.len() == URL_BATCH_SIZE {
                self.flush_url_batch(shared, parent, &mut batch, &mut batch_paths, &mut urls)
                    .await;
            }
        }
        if !batch.is_empty() {
            self.flush_url_batch(shared, parent, &mut batch, &mut batch_paths, &mut urls)
                .await;
        }

        // Additional uploads come with their own pre-signed URLs and
        // bypass the probe and the batcher.
        for (path, url) in &source.additional_uploads {
            if shared.cancel.is_cancelled() {
                break;
            }
            let Some(entry) = shared.set.get(path) else {
                continue;
            };
            entry.set_status(UploadStatus::CalculatingSha256);
            match run_digest(path).await {
                Ok((sha256, size)) => {
                    entry.set_digest(sha256, size);
                    entry.set_status(UploadStatus::WaitingForUpload);
                    urls.insert(path.clone(), url.clone());
                }
                Err(e) => shared.fail_file(path, EngineError::Digest(e)),
            }
        }

        urls
    }

    /// Requests URLs for one batch; a batch failure fails every file in
    /// it and the run continues with the next batch.
    async fn flush_url_batch(
        &self,
        shared: &Arc<EngineShared>,
        parent: &UploadParent,
        batch: &mut Vec<FileDescriptor>,
        batch_paths: &mut HashMap<String, PathBuf>,
        urls: &mut HashMap<PathBuf, String>,
    ) {
        let files = std::mem::take(batch);
        let paths = std::mem::take(batch_paths);
        debug!("generating upload urls for {} files", files.len());

        match self
            .control
            .generate_file_upload_urls(&parent.parent_string(), &files)
            .await
        {
            Ok(generated) => {
                for file in &files {
                    let Some(path) = paths.get(&file.name) else {
                        continue;
                    };
                    match generated.get(&file.name) {
                        Some(url) => {
                            urls.insert(path.clone(), url.clone());
                        }
                        None => shared.fail_file(
                            path,
                            EngineError::UrlGeneration(
                                "server returned no upload url".into(),
                            ),
                        ),
                    }
                }
            }
            Err(e) => {
                let msg = e.to_string();
                for file in &files {
                    if let Some(path) = paths.get(&file.name) {
                        shared.fail_file(path, EngineError::UrlGeneration(msg.clone()));
                    }
                }
            }
        }
    }
}

async fn run_digest(path: &Path) -> std::io::Result<(String, u64)> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || digest::sha256_and_size(&path))
        .await
        .map_err(std::io::Error::other)?
}

fn default_checkpoint_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("skylift")
        .join("uploads")
}
