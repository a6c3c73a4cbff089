use serde::{Deserialize, Serialize};

/// A part the object store has already accepted, as recorded on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    pub part_number: u16,
    pub etag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_crc32: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_crc32c: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum_sha256: Option<String>,
}

/// Persistent record of an in-progress multipart upload.
///
/// Invariants: `parts` holds each part number at most once, its length
/// never exceeds the upload's total part count, `uploaded_size` equals the
/// sum of the recorded parts' sizes, and `upload_id` is non-empty whenever
/// `parts` is non-empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipartCheckpoint {
    pub upload_id: String,
    pub uploaded_size: u64,
    pub parts: Vec<CompletedPart>,
}

impl MultipartCheckpoint {
    /// Starts a fresh checkpoint for a newly initiated upload.
    pub fn new(upload_id: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            uploaded_size: 0,
            parts: Vec::new(),
        }
    }

    /// Returns `true` if `part_number` has already been persisted.
    pub fn has_part(&self, part_number: u16) -> bool {
        self.parts.iter().any(|p| p.part_number == part_number)
    }

    /// Appends a completed part and grows the uploaded byte count.
    ///
    /// Appending does not keep `parts` ordered; callers sort with
    /// [`sorted_parts`](Self::sorted_parts) before completion.
    pub fn record_part(&mut self, part: CompletedPart, size: u64) {
        self.uploaded_size += size;
        self.parts.push(part);
    }

    /// Returns the parts sorted by part number ascending.
    pub fn sorted_parts(&self) -> Vec<CompletedPart> {
        let mut parts = self.parts.clone();
        parts.sort_by_key(|p| p.part_number);
        parts
    }

    /// Returns `true` if every one of `total_parts` parts has landed.
    pub fn is_complete(&self, total_parts: u16) -> bool {
        self.parts.len() == usize::from(total_parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(n: u16) -> CompletedPart {
        CompletedPart {
            part_number: n,
            etag: format!("etag-{n}"),
            ..Default::default()
        }
    }

    #[test]
    fn record_part_accumulates_size() {
        let mut cp = MultipartCheckpoint::new("u1");
        cp.record_part(part(1), 100);
        cp.record_part(part(3), 50);
        assert_eq!(cp.uploaded_size, 150);
        assert!(cp.has_part(1));
        assert!(cp.has_part(3));
        assert!(!cp.has_part(2));
    }

    #[test]
    fn sorted_parts_orders_by_number() {
        let mut cp = MultipartCheckpoint::new("u1");
        cp.record_part(part(3), 1);
        cp.record_part(part(1), 1);
        cp.record_part(part(2), 1);
        let numbers: Vec<u16> = cp.sorted_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn is_complete_matches_total() {
        let mut cp = MultipartCheckpoint::new("u1");
        cp.record_part(part(1), 1);
        cp.record_part(part(2), 1);
        assert!(!cp.is_complete(3));
        cp.record_part(part(3), 1);
        assert!(cp.is_complete(3));
    }

    #[test]
    fn json_roundtrip_skips_absent_checksums() {
        let mut cp = MultipartCheckpoint::new("u1");
        cp.record_part(part(1), 10);
        let json = serde_json::to_string(&cp).unwrap();
        assert!(!json.contains("checksum_crc32"));
        let parsed: MultipartCheckpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(cp, parsed);
    }
}
