use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::StorageError;

/// Destination parsed from a pre-signed upload URL.
///
/// The URL path carries `/<bucket>/<key>` and the `X-Amz-Tagging` query
/// parameter a URL-encoded set of user tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignedDestination {
    pub bucket: String,
    pub key: String,
    pub user_tags: BTreeMap<String, String>,
}

/// Parses a pre-signed PUT URL into bucket, object key and user tags.
pub fn parse_presigned_url(raw: &str) -> Result<PresignedDestination, StorageError> {
    let url = Url::parse(raw).map_err(|e| StorageError::InvalidUrl(e.to_string()))?;

    let path = url.path().trim_start_matches('/');
    let (bucket, key) = path
        .split_once('/')
        .ok_or_else(|| StorageError::InvalidUrl(format!("missing object key in path: {path}")))?;
    if bucket.is_empty() || key.is_empty() {
        return Err(StorageError::InvalidUrl(format!(
            "missing bucket or object key in path: {path}"
        )));
    }

    let tagging = url
        .query_pairs()
        .find(|(name, _)| name == "X-Amz-Tagging")
        .map(|(_, value)| value.into_owned());
    let user_tags = match tagging {
        Some(tagging) => url::form_urlencoded::parse(tagging.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect(),
        None => BTreeMap::new(),
    };

    Ok(PresignedDestination {
        bucket: percent_decode_str(bucket).decode_utf8_lossy().into_owned(),
        key: percent_decode_str(key).decode_utf8_lossy().into_owned(),
        user_tags,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_key_and_tags() {
        let dest = parse_presigned_url(
            "https://oss.example.com/my-bucket/records/r1/files/a.bin\
             ?X-Amz-Tagging=X-COS-RECORD-ID%3Dr1%26X-COS-PROJECT-ID%3Dp1&X-Amz-Expires=900",
        )
        .unwrap();
        assert_eq!(dest.bucket, "my-bucket");
        assert_eq!(dest.key, "records/r1/files/a.bin");
        assert_eq!(dest.user_tags.get("X-COS-RECORD-ID").unwrap(), "r1");
        assert_eq!(dest.user_tags.get("X-COS-PROJECT-ID").unwrap(), "p1");
    }

    #[test]
    fn parses_without_tags() {
        let dest = parse_presigned_url("https://oss.example.com/bkt/key.bin").unwrap();
        assert_eq!(dest.bucket, "bkt");
        assert_eq!(dest.key, "key.bin");
        assert!(dest.user_tags.is_empty());
    }

    #[test]
    fn decodes_percent_encoded_key() {
        let dest =
            parse_presigned_url("https://oss.example.com/bkt/dir/file%20name.bin").unwrap();
        assert_eq!(dest.key, "dir/file name.bin");
    }

    #[test]
    fn rejects_missing_key() {
        assert!(parse_presigned_url("https://oss.example.com/only-bucket").is_err());
        assert!(parse_presigned_url("https://oss.example.com/").is_err());
    }

    #[test]
    fn rejects_unparseable_url() {
        assert!(parse_presigned_url("::not a url::").is_err());
    }
}
