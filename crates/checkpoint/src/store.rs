use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::{CheckpointError, MULTIPART_UPLOAD_INFO_KEY, MultipartCheckpoint};

/// A process-local key/value store holding one upload checkpoint.
///
/// The backing file lives under a per-user cache directory and is named
/// deterministically from `(file path, destination scope id, content
/// sha256, part size)`, so a re-invocation with matching parameters finds
/// the same checkpoint. Writes go through a store mutex and commit with a
/// write-temp-then-rename, keeping the file intact across crashes.
pub struct CheckpointStore {
    path: PathBuf,
    lock: Mutex<()>,
}

type StoreDoc = BTreeMap<String, serde_json::Value>;

impl CheckpointStore {
    /// Opens (creating `dir` if needed) the store for one upload destination.
    pub fn open(
        dir: &Path,
        file_path: &Path,
        scope_id: &str,
        sha256: &str,
        part_size: u64,
    ) -> Result<Self, CheckpointError> {
        fs::create_dir_all(dir)?;
        let name = store_file_name(file_path, scope_id, sha256, part_size);
        Ok(Self {
            path: dir.join(name),
            lock: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored checkpoint.
    ///
    /// A missing store file or absent key yields an empty checkpoint;
    /// unparseable contents yield [`CheckpointError::Corrupt`] so the
    /// caller can reset and start a fresh upload.
    pub fn load(&self) -> Result<MultipartCheckpoint, CheckpointError> {
        let _guard = self.lock.lock().unwrap();
        self.read_unlocked()
    }

    /// Applies `apply` to the stored checkpoint under the store lock and
    /// commits the result atomically. Returns the updated value.
    pub fn update<F>(&self, apply: F) -> Result<MultipartCheckpoint, CheckpointError>
    where
        F: FnOnce(&mut MultipartCheckpoint),
    {
        let _guard = self.lock.lock().unwrap();
        let mut checkpoint = self.read_unlocked()?;
        apply(&mut checkpoint);
        self.write_unlocked(&checkpoint)?;
        Ok(checkpoint)
    }

    /// Replaces whatever is stored with `checkpoint`.
    pub fn save(&self, checkpoint: &MultipartCheckpoint) -> Result<(), CheckpointError> {
        let _guard = self.lock.lock().unwrap();
        self.write_unlocked(checkpoint)
    }

    /// Clears the store back to an empty checkpoint.
    pub fn reset(&self) -> Result<(), CheckpointError> {
        let _guard = self.lock.lock().unwrap();
        debug!(path = %self.path.display(), "resetting checkpoint store");
        self.write_unlocked(&MultipartCheckpoint::default())
    }

    /// Removes the backing file. Missing files are not an error.
    pub fn delete(&self) -> Result<(), CheckpointError> {
        let _guard = self.lock.lock().unwrap();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_unlocked(&self) -> Result<MultipartCheckpoint, CheckpointError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MultipartCheckpoint::default());
            }
            Err(e) => return Err(e.into()),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(MultipartCheckpoint::default());
        }
        let doc: StoreDoc = serde_json::from_slice(&raw)
            .map_err(|e| CheckpointError::Corrupt(format!("{}: {e}", self.path.display())))?;
        match doc.get(MULTIPART_UPLOAD_INFO_KEY) {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| CheckpointError::Corrupt(format!("{}: {e}", self.path.display()))),
            None => Ok(MultipartCheckpoint::default()),
        }
    }

    fn write_unlocked(&self, checkpoint: &MultipartCheckpoint) -> Result<(), CheckpointError> {
        let mut doc = StoreDoc::new();
        doc.insert(
            MULTIPART_UPLOAD_INFO_KEY.to_string(),
            serde_json::to_value(checkpoint)
                .map_err(|e| CheckpointError::Corrupt(e.to_string()))?,
        );
        let body = serde_json::to_string(&doc)
            .map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
        atomic_write(&self.path, &body)?;
        Ok(())
    }
}

/// Writes via a sibling temp file and renames over the target, so readers
/// never observe a half-written store.
fn atomic_write(path: &Path, body: &str) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body)?;
    fs::rename(&tmp, path)
}

fn store_file_name(file_path: &Path, scope_id: &str, sha256: &str, part_size: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_path.to_string_lossy().as_bytes());
    hasher.update(b"\n");
    hasher.update(scope_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(sha256.as_bytes());
    hasher.update(b"\n");
    hasher.update(part_size.to_le_bytes());
    format!("{}.json", hex::encode(hasher.finalize()))
}
