//! Resumable parallel upload engine.
//!
//! Takes an arbitrary set of local files and streams them to object
//! storage through pre-signed destinations, with a bounded worker pool, a
//! per-file sliding window over multipart part numbers, durable per-part
//! checkpoints for crash recovery, pre-flight deduplication against the
//! control plane, and a live or headless progress monitor.
//!
//! The engine is a staged pipeline: discovery expands the caller's input
//! into file entries; the digester hashes each file and probes the server
//! for an identical copy; the URL batcher fetches pre-signed destinations
//! twenty at a time; the producer plans single-PUT or multipart work and
//! reconciles with the checkpoint store; the scheduler multiplexes
//! descriptors onto workers under the admission window; the result sink
//! persists parts and completes finished uploads.

mod digest;
mod discovery;
mod engine;
mod error;
mod monitor;
mod opts;
mod pipeline;
mod producer;
mod progress;
mod scheduler;
mod sink;
mod state;
mod worker;

pub use engine::{UploadEngine, UploadReport};
pub use error::EngineError;
pub use opts::{SourceOptions, UploadOptions};
pub use state::UploadStatus;

pub use skylift_api::UploadParent;

/// Hard cap on a single object (500 GiB).
pub const MAX_OBJECT_SIZE: u64 = 500 * 1024 * 1024 * 1024;

/// Sliding-window width floor: a multipart part may run ahead of the
/// oldest in-flight part by at most `max(WINDOW_SIZE, part_size)` bytes.
pub const WINDOW_SIZE: u64 = 1024 * 1024 * 1024;

/// Files per `GenerateFileUploadUrls` batch.
pub const URL_BATCH_SIZE: usize = 20;
