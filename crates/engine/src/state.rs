use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::EngineError;
use crate::progress::ProgressMsg;

/// Lifecycle of one file through the pipeline.
///
/// The status is write-owned by whichever stage currently holds the file;
/// the monitor only reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Unprocessed,
    CalculatingSha256,
    PreviouslyUploaded,
    WaitingForUpload,
    UploadInProgress,
    UploadCompleted,
    MultipartCompletionInProgress,
    UploadFailed,
}

impl UploadStatus {
    /// Terminal states: the file will not be touched again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::PreviouslyUploaded | Self::UploadCompleted | Self::UploadFailed
        )
    }
}

/// Tracked state of one file (thread-safe).
pub(crate) struct FileEntry {
    path: PathBuf,
    inner: RwLock<EntryInner>,
}

struct EntryInner {
    remote_path: String,
    size: u64,
    sha256: String,
    uploaded: i64,
    status: UploadStatus,
}

/// Point-in-time copy for rendering.
#[derive(Debug, Clone)]
pub(crate) struct FileSnapshot {
    pub display_path: String,
    pub size: u64,
    pub uploaded: i64,
    pub status: UploadStatus,
}

impl FileEntry {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            inner: RwLock::new(EntryInner {
                remote_path: String::new(),
                size: 0,
                sha256: String::new(),
                uploaded: 0,
                status: UploadStatus::Unprocessed,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn status(&self) -> UploadStatus {
        self.inner.read().unwrap().status
    }

    pub fn set_status(&self, status: UploadStatus) {
        self.inner.write().unwrap().status = status;
    }

    /// Moves the entry into a terminal status unless it is already in one.
    /// Returns `true` on the first terminal transition.
    pub fn transition_terminal(&self, status: UploadStatus) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.status.is_terminal() {
            return false;
        }
        inner.status = status;
        true
    }

    pub fn set_digest(&self, sha256: String, size: u64) {
        let mut inner = self.inner.write().unwrap();
        inner.sha256 = sha256;
        inner.size = size;
    }

    pub fn set_remote_path(&self, remote_path: String) {
        self.inner.write().unwrap().remote_path = remote_path;
    }

    pub fn sha256(&self) -> String {
        self.inner.read().unwrap().sha256.clone()
    }

    pub fn size(&self) -> u64 {
        self.inner.read().unwrap().size
    }

    pub fn add_uploaded(&self, delta: i64) {
        self.inner.write().unwrap().uploaded += delta;
    }

    pub fn set_uploaded(&self, uploaded: i64) {
        self.inner.write().unwrap().uploaded = uploaded;
    }

    /// Remote path when known, else the local path.
    pub fn display_path(&self) -> String {
        let inner = self.inner.read().unwrap();
        if inner.remote_path.is_empty() {
            self.path.to_string_lossy().into_owned()
        } else {
            inner.remote_path.clone()
        }
    }

    pub fn snapshot(&self) -> FileSnapshot {
        let inner = self.inner.read().unwrap();
        FileSnapshot {
            display_path: if inner.remote_path.is_empty() {
                self.path.to_string_lossy().into_owned()
            } else {
                inner.remote_path.clone()
            },
            size: inner.size,
            uploaded: inner.uploaded,
            status: inner.status,
        }
    }
}

/// All file entries of a run, in discovery order.
pub(crate) struct UploadSet {
    inner: RwLock<SetInner>,
}

struct SetInner {
    order: Vec<PathBuf>,
    entries: HashMap<PathBuf, std::sync::Arc<FileEntry>>,
}

/// Aggregate counters for the monitors and the final report.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Totals {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_bytes: u64,
    pub uploaded_bytes: i64,
}

impl UploadSet {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(SetInner {
                order: Vec::new(),
                entries: HashMap::new(),
            }),
        }
    }

    /// Adds (or returns the existing) entry for `path`.
    pub fn add(&self, path: PathBuf) -> std::sync::Arc<FileEntry> {
        let mut inner = self.inner.write().unwrap();
        if let Some(entry) = inner.entries.get(&path) {
            return std::sync::Arc::clone(entry);
        }
        let entry = std::sync::Arc::new(FileEntry::new(path.clone()));
        inner.order.push(path.clone());
        inner.entries.insert(path, std::sync::Arc::clone(&entry));
        entry
    }

    pub fn get(&self, path: &Path) -> Option<std::sync::Arc<FileEntry>> {
        self.inner.read().unwrap().entries.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().order.len()
    }

    /// Entries in discovery order.
    pub fn entries_in_order(&self) -> Vec<std::sync::Arc<FileEntry>> {
        let inner = self.inner.read().unwrap();
        inner
            .order
            .iter()
            .filter_map(|path| inner.entries.get(path).cloned())
            .collect()
    }

    pub fn totals(&self) -> Totals {
        let mut totals = Totals::default();
        for entry in self.entries_in_order() {
            let snapshot = entry.snapshot();
            totals.total += 1;
            totals.total_bytes += snapshot.size;
            totals.uploaded_bytes += snapshot.uploaded;
            match snapshot.status {
                UploadStatus::UploadCompleted => totals.completed += 1,
                UploadStatus::UploadFailed => totals.failed += 1,
                UploadStatus::PreviouslyUploaded => totals.skipped += 1,
                _ => {}
            }
        }
        totals
    }
}

/// Counts outstanding files; the run finishes when it reaches zero.
pub(crate) struct Completion {
    remaining: AtomicUsize,
    notify: Notify,
}

impl Completion {
    pub fn new() -> Self {
        Self {
            remaining: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    pub fn add(&self, n: usize) {
        self.remaining.fetch_add(n, Ordering::SeqCst);
    }

    pub fn done(&self) {
        if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    pub async fn wait(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        loop {
            // Register before checking so a concurrent `done` cannot slip
            // between the check and the await.
            notified.as_mut().enable();
            if self.remaining.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.as_mut().await;
            notified.set(self.notify.notified());
        }
    }
}

/// State shared by every pipeline stage of one run.
pub(crate) struct EngineShared {
    pub set: UploadSet,
    pub completion: Completion,
    pub cancel: CancellationToken,
    pub progress_tx: flume::Sender<ProgressMsg>,
    pub headless: bool,
    errors: Mutex<BTreeMap<PathBuf, EngineError>>,
}

impl EngineShared {
    pub fn new(
        cancel: CancellationToken,
        progress_tx: flume::Sender<ProgressMsg>,
        headless: bool,
    ) -> Self {
        Self {
            set: UploadSet::new(),
            completion: Completion::new(),
            cancel,
            progress_tx,
            headless,
            errors: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn is_failed(&self, path: &Path) -> bool {
        self.set
            .get(path)
            .map(|entry| entry.status() == UploadStatus::UploadFailed)
            .unwrap_or(false)
    }

    /// Marks a file failed, records its error and releases its completion
    /// slot. Later failures for the same file are ignored.
    pub fn fail_file(&self, path: &Path, err: EngineError) {
        let Some(entry) = self.set.get(path) else {
            return;
        };
        if !entry.transition_terminal(UploadStatus::UploadFailed) {
            debug!(path = %path.display(), error = %err, "ignoring error for settled file");
            return;
        }
        if self.headless {
            error!(path = %path.display(), error = %err, "upload failed");
        } else {
            debug!(path = %path.display(), error = %err, "upload failed");
        }
        self.errors.lock().unwrap().insert(path.to_path_buf(), err);
        self.completion.done();
    }

    /// Marks a file fully uploaded and releases its completion slot.
    pub fn complete_file(&self, path: &Path) {
        let Some(entry) = self.set.get(path) else {
            return;
        };
        if !entry.transition_terminal(UploadStatus::UploadCompleted) {
            return;
        }
        if self.headless {
            info!(file = %entry.display_path(), "completed upload");
        }
        self.completion.done();
    }

    /// Marks a file as already present remotely and releases its slot.
    pub fn skip_file(&self, path: &Path) {
        let Some(entry) = self.set.get(path) else {
            return;
        };
        if !entry.transition_terminal(UploadStatus::PreviouslyUploaded) {
            return;
        }
        if self.headless {
            info!(file = %entry.display_path(), "already uploaded, skipping");
        }
        self.completion.done();
    }

    /// Takes ownership of the accumulated per-file errors.
    pub fn take_errors(&self) -> BTreeMap<PathBuf, EngineError> {
        std::mem::take(&mut self.errors.lock().unwrap())
    }
}
