//! Descriptor scheduling.
//!
//! Multiplexes upload jobs onto the fixed worker pool under three rules:
//! jobs for a file that already failed are discarded; a multipart part is
//! admitted only while it stays within the sliding window above the
//! oldest in-flight part of its file; a job that fails admission waits in
//! a one-slot lookahead buffer while results keep draining.

use std::path::PathBuf;
use std::sync::Arc;

use skylift_storage::ObjectStore;
use tracing::debug;

use crate::pipeline::{JobResult, UploadJob};
use crate::state::EngineShared;
use crate::{WINDOW_SIZE, sink};

pub(crate) async fn run_scheduler(
    shared: Arc<EngineShared>,
    object_store: Arc<dyn ObjectStore>,
    jobs_rx: flume::Receiver<UploadJob>,
    workers_tx: flume::Sender<UploadJob>,
    results_rx: flume::Receiver<JobResult>,
    threads: usize,
    part_size: u64,
) {
    let mut in_flight: Vec<(PathBuf, u16)> = Vec::new();
    let mut held: Option<UploadJob> = None;
    let mut producer_done = false;

    'outer: loop {
        // Fill free worker slots, draining the lookahead buffer first.
        while in_flight.len() < threads && !shared.cancel.is_cancelled() {
            let job = match held.take() {
                Some(job) => job,
                None => {
                    if producer_done {
                        break;
                    }
                    match jobs_rx.recv_async().await {
                        Ok(job) => job,
                        Err(_) => {
                            producer_done = true;
                            break;
                        }
                    }
                }
            };
            if shared.is_failed(&job.path) {
                // A sibling part already failed this file.
                debug!(path = %job.path.display(), part = job.part_number(), "discarding job for failed file");
                continue;
            }
            if admissible(&job, &in_flight, part_size) {
                in_flight.push((job.path.clone(), job.part_number()));
                if workers_tx.send_async(job).await.is_err() {
                    break 'outer;
                }
            } else {
                held = Some(job);
                break;
            }
        }

        if in_flight.is_empty() {
            if shared.cancel.is_cancelled() {
                break;
            }
            if producer_done && held.is_none() {
                break;
            }
            continue;
        }

        let result = match results_rx.recv_async().await {
            Ok(result) => result,
            Err(_) => break,
        };
        in_flight.retain(|(path, part)| {
            path != &result.job.path || *part != result.job.part_number()
        });

        if shared.is_failed(&result.job.path) {
            continue;
        }
        let path = result.job.path.clone();
        if let Err(err) = sink::handle_result(&shared, object_store.as_ref(), result).await {
            shared.fail_file(&path, err);
        }
    }
    debug!("upload scheduler stopped");
}

/// Admission window check.
///
/// A part may run ahead of the oldest in-flight part of the same file by
/// at most `max(1 GiB, part_size) / part_size` part numbers. Single PUTs
/// and the first part of a file are always admissible.
fn admissible(job: &UploadJob, in_flight: &[(PathBuf, u16)], part_size: u64) -> bool {
    let least = in_flight
        .iter()
        .filter(|(path, _)| path == &job.path)
        .map(|(_, part)| *part)
        .min();
    let Some(least) = least else {
        return true;
    };
    let window_parts = WINDOW_SIZE.max(part_size) / part_size;
    u64::from(job.part_number()) <= u64::from(least) + window_parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::JobKind;
    use skylift_checkpoint::CheckpointStore;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const PART_SIZE: u64 = 128 * 1024 * 1024;

    fn part_job(dir: &TempDir, path: &str, part_number: u16) -> UploadJob {
        let file_path = dir.path().join("scratch.bin");
        std::fs::write(&file_path, b"x").unwrap();
        let store = CheckpointStore::open(
            dir.path(),
            std::path::Path::new(path),
            "scope",
            "sha",
            PART_SIZE,
        )
        .unwrap();
        UploadJob {
            path: PathBuf::from(path),
            bucket: "bkt".into(),
            key: "key".into(),
            tags: BTreeMap::new(),
            file: Arc::new(std::fs::File::open(&file_path).unwrap()),
            size: PART_SIZE,
            kind: JobKind::Part {
                upload_id: "u1".into(),
                part_number,
                total_parts: 32,
                offset: 0,
                store: Arc::new(store),
            },
        }
    }

    fn single_job(dir: &TempDir, path: &str) -> UploadJob {
        let file_path = dir.path().join("scratch.bin");
        std::fs::write(&file_path, b"x").unwrap();
        UploadJob {
            path: PathBuf::from(path),
            bucket: "bkt".into(),
            key: "key".into(),
            tags: BTreeMap::new(),
            file: Arc::new(std::fs::File::open(&file_path).unwrap()),
            size: 1,
            kind: JobKind::Single {
                sha256: "sha".into(),
            },
        }
    }

    #[test]
    fn first_part_of_a_file_is_admissible() {
        let dir = TempDir::new().unwrap();
        let job = part_job(&dir, "/a", 1);
        assert!(admissible(&job, &[], PART_SIZE));
        // Other files in flight do not count against this one.
        let in_flight = vec![(PathBuf::from("/b"), 3u16)];
        assert!(admissible(&job, &in_flight, PART_SIZE));
    }

    #[test]
    fn window_admits_up_to_eight_parts_ahead() {
        // 1 GiB window over 128 MiB parts = 8 part numbers of headroom.
        let dir = TempDir::new().unwrap();
        let in_flight = vec![(PathBuf::from("/a"), 2u16)];
        assert!(admissible(&part_job(&dir, "/a", 10), &in_flight, PART_SIZE));
        assert!(!admissible(&part_job(&dir, "/a", 11), &in_flight, PART_SIZE));
    }

    #[test]
    fn window_tracks_the_least_in_flight_part() {
        let dir = TempDir::new().unwrap();
        let in_flight = vec![
            (PathBuf::from("/a"), 7u16),
            (PathBuf::from("/a"), 3u16),
            (PathBuf::from("/a"), 5u16),
        ];
        assert!(admissible(&part_job(&dir, "/a", 11), &in_flight, PART_SIZE));
        assert!(!admissible(&part_job(&dir, "/a", 12), &in_flight, PART_SIZE));
    }

    #[test]
    fn window_floor_is_the_part_size() {
        // With parts wider than 1 GiB the window is exactly one part.
        let dir = TempDir::new().unwrap();
        let wide = 2 * WINDOW_SIZE;
        let in_flight = vec![(PathBuf::from("/a"), 4u16)];
        assert!(admissible(&part_job(&dir, "/a", 5), &in_flight, wide));
        assert!(!admissible(&part_job(&dir, "/a", 6), &in_flight, wide));
    }

    #[test]
    fn single_put_is_always_admissible() {
        let dir = TempDir::new().unwrap();
        let job = single_job(&dir, "/a");
        let in_flight = vec![(PathBuf::from("/b"), 1u16), (PathBuf::from("/c"), 9u16)];
        assert!(admissible(&job, &in_flight, PART_SIZE));
    }
}
