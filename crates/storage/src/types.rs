use std::collections::BTreeMap;

/// A part accepted by the object store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPart {
    pub part_number: u16,
    pub etag: String,
    pub checksum_crc32: Option<String>,
    pub checksum_crc32c: Option<String>,
    pub checksum_sha1: Option<String>,
    pub checksum_sha256: Option<String>,
}

/// Options carried by object writes.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// User tags echoed from the pre-signed destination.
    pub user_tags: BTreeMap<String, String>,
    /// Content type of the final object.
    pub content_type: Option<String>,
}

impl PutOptions {
    /// Options carrying only user tags.
    pub fn with_tags(user_tags: BTreeMap<String, String>) -> Self {
        Self {
            user_tags,
            content_type: None,
        }
    }

    /// Encodes the user tags as an `X-Amz-Tagging` header value.
    pub fn tag_header(&self) -> Option<String> {
        if self.user_tags.is_empty() {
            return None;
        }
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &self.user_tags {
            serializer.append_pair(k, v);
        }
        Some(serializer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_header_none_when_empty() {
        assert!(PutOptions::default().tag_header().is_none());
    }

    #[test]
    fn tag_header_url_encodes_pairs() {
        let mut tags = BTreeMap::new();
        tags.insert("X-COS-RECORD-ID".to_string(), "rec 1".to_string());
        tags.insert("a".to_string(), "b".to_string());
        let header = PutOptions::with_tags(tags).tag_header().unwrap();
        assert_eq!(header, "X-COS-RECORD-ID=rec+1&a=b");
    }
}
