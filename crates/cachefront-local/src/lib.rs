//! Local implementations of the cachefront pipeline: fingerprinting,
//! egress validation, content sniffing, downloading, the on-disk object
//! store, the metadata stores, and the orchestrating cache engine.

pub mod engine;
pub mod fetch;
pub mod fingerprint;
pub mod flight;
pub mod meta;
pub mod sniff;
pub mod ssrf;
pub mod store;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as POSIX seconds; expiry timestamps are compared in this
/// unit.
pub fn now_epoch_s() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
