use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

/// Computes the SHA-256 and exact byte count of a file in one streaming
/// pass. Blocking; call from the blocking pool.
pub(crate) fn sha256_and_size(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size: u64 = 0;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}
