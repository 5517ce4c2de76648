use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod error;

/// Seconds since the Unix epoch.
pub fn timestamp_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs() as i64
}
