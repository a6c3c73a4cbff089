//! S3-compatible object store over the AWS SDK.

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_smithy_types::body::SdkBody;
use aws_smithy_types::error::display::DisplayErrorContext;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::StreamExt;
use http_body_util::StreamBody;
use tracing::debug;

use crate::{BodyStream, ObjectPart, ObjectStore, PutOptions, StorageError, StorageResult};

/// Connection parameters for an S3-compatible endpoint, normally filled
/// from a short-lived security token issued by the control plane.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Endpoint host, with or without a scheme (`https` assumed).
    pub endpoint: String,
    pub access_key_id: String,
    pub access_key_secret: String,
    pub session_token: String,
}

/// Production [`ObjectStore`] backed by the AWS SDK.
///
/// Retries are disabled: upload bodies stream straight off disk and are
/// not replayable, and retry policy belongs to the caller.
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(config: &S3Config) -> Self {
        let session_token =
            Some(config.session_token.clone()).filter(|token| !token.is_empty());
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.access_key_secret.clone(),
            session_token,
            None,
            "skylift-security-token",
        );
        let endpoint = if config.endpoint.contains("://") {
            config.endpoint.clone()
        } else {
            format!("https://{}", config.endpoint)
        };
        let conf = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .build();
        Self {
            client: Client::from_conf(conf),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: BodyStream,
        size: u64,
        sha256: &str,
        opts: &PutOptions,
    ) -> StorageResult<()> {
        let mut req = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(into_sdk_stream(body))
            .content_length(size as i64);
        if let Some(tagging) = opts.tag_header() {
            req = req.tagging(tagging);
        }
        if let Some(content_type) = &opts.content_type {
            req = req.content_type(content_type);
        }
        if let Some(checksum) = sha256_base64(sha256) {
            req = req.checksum_sha256(checksum);
        }
        req.send().await.map_err(request_error)?;
        Ok(())
    }

    async fn new_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        opts: &PutOptions,
    ) -> StorageResult<String> {
        let mut req = self.client.create_multipart_upload().bucket(bucket).key(key);
        if let Some(tagging) = opts.tag_header() {
            req = req.tagging(tagging);
        }
        if let Some(content_type) = &opts.content_type {
            req = req.content_type(content_type);
        }
        let resp = req.send().await.map_err(request_error)?;
        resp.upload_id()
            .map(str::to_owned)
            .ok_or_else(|| StorageError::Response("missing upload id".into()))
    }

    async fn list_object_parts(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> StorageResult<Vec<ObjectPart>> {
        let resp = self
            .client
            .list_parts()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .max_parts(2000)
            .send()
            .await
            .map_err(request_error)?;
        Ok(resp
            .parts()
            .iter()
            .map(|part| ObjectPart {
                part_number: part.part_number().unwrap_or_default().clamp(0, u16::MAX as i32)
                    as u16,
                etag: part.e_tag().unwrap_or_default().to_string(),
                checksum_crc32: part.checksum_crc32().map(str::to_owned),
                checksum_crc32c: part.checksum_crc32_c().map(str::to_owned),
                checksum_sha1: part.checksum_sha1().map(str::to_owned),
                checksum_sha256: part.checksum_sha256().map(str::to_owned),
            })
            .collect())
    }

    async fn put_object_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: u16,
        body: BodyStream,
        size: u64,
    ) -> StorageResult<ObjectPart> {
        let resp = self
            .client
            .upload_part()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(i32::from(part_number))
            .body(into_sdk_stream(body))
            .content_length(size as i64)
            .send()
            .await
            .map_err(request_error)?;
        Ok(ObjectPart {
            part_number,
            etag: resp.e_tag().unwrap_or_default().to_string(),
            checksum_crc32: resp.checksum_crc32().map(str::to_owned),
            checksum_crc32c: resp.checksum_crc32_c().map(str::to_owned),
            checksum_sha1: resp.checksum_sha1().map(str::to_owned),
            checksum_sha256: resp.checksum_sha256().map(str::to_owned),
        })
    }

    async fn complete_multipart_upload(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: &[ObjectPart],
        opts: &PutOptions,
    ) -> StorageResult<()> {
        // Tags and content type are bound at initiation on the S3 wire;
        // the completion call only stitches parts.
        debug!(
            bucket,
            key,
            parts = parts.len(),
            content_type = opts.content_type.as_deref().unwrap_or_default(),
            "completing multipart upload"
        );
        let completed = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(i32::from(part.part_number))
                    .e_tag(&part.etag)
                    .set_checksum_crc32(part.checksum_crc32.clone())
                    .set_checksum_crc32_c(part.checksum_crc32c.clone())
                    .set_checksum_sha1(part.checksum_sha1.clone())
                    .set_checksum_sha256(part.checksum_sha256.clone())
                    .build()
            })
            .collect();
        self.client
            .complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(request_error)?;
        Ok(())
    }
}

fn into_sdk_stream(body: BodyStream) -> ByteStream {
    let frames = body.map(|chunk| {
        chunk
            .map(http_body::Frame::data)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    });
    ByteStream::new(SdkBody::from_body_1_x(StreamBody::new(frames)))
}

fn request_error<E>(err: E) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    StorageError::Request(format!("{}", DisplayErrorContext(&err)))
}

/// Converts a hex SHA-256 digest into the base64 form the wire expects.
/// Returns `None` for an empty or non-hex digest.
fn sha256_base64(sha256_hex: &str) -> Option<String> {
    if sha256_hex.is_empty() {
        return None;
    }
    hex::decode(sha256_hex).ok().map(|raw| BASE64.encode(raw))
}
