use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::{ObjectPart, PutOptions, StorageResult};

/// A boxed stream of body bytes for streaming uploads.
///
/// Readers surface progress as a side effect of being polled; an `Err`
/// item aborts the request in flight.
pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send + Sync + 'static>>;

/// Functional contract of the object store.
///
/// Implemented by [`S3ObjectStore`](crate::S3ObjectStore) in production
/// and by in-memory mocks in tests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads a whole object in one PUT.
    ///
    /// `sha256` is the hex content digest (empty to skip the integrity
    /// header); `size` is the exact body length.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: BodyStream,
        size: u64,
        sha256: &str,
        opts: &PutOptions,
    ) -> StorageResult<()>;

    /// Initiates a multipart upload and returns its upload-id.
    async fn new_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        opts: &PutOptions,
    ) -> StorageResult<String>;

    /// Lists the parts the store has accepted for an in-progress upload.
    ///
    /// An error or an empty list means the upload-id can no longer be
    /// resumed.
    async fn list_object_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StorageResult<Vec<ObjectPart>>;

    /// Uploads one part of a multipart upload.
    async fn put_object_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u16,
        body: BodyStream,
        size: u64,
    ) -> StorageResult<ObjectPart>;

    /// Stitches the uploaded parts into the final object.
    ///
    /// `parts` must be sorted by part number ascending.
    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[ObjectPart],
        opts: &PutOptions,
    ) -> StorageResult<()>;
}
