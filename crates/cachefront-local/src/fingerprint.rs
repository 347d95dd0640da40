//! Content addressing for raw URLs.

use sha2::{Digest, Sha256};

/// Stable identifier for a raw URL: lowercase hex SHA-256 over its UTF-8
/// bytes. No normalization is applied, so URLs differing only by query,
/// fragment, case, or a trailing slash hash differently.
pub fn fingerprint(raw_url: &str) -> String {
    let mut h = Sha256::new();
    h.update(raw_url.as_bytes());
    hex::encode(h.finalize())
}

/// File-extension hint from the URL's path: the suffix of the final path
/// segment from its last `.` (dot included), or `""` when the segment has
/// no dot or the URL does not parse. Query and fragment never
/// participate. This is only a naming hint; admission is decided by
/// sniffing the downloaded bytes.
pub fn extension(raw_url: &str) -> String {
    let Ok(url) = url::Url::parse(raw_url) else {
        return String::new();
    };
    let segment = url.path().rsplit('/').next().unwrap_or("");
    match segment.rfind('.') {
        Some(i) => segment[i..].to_string(),
        None => String::new(),
    }
}
