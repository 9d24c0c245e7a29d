//! Data models for keepsake.
//!
//! Defines the records both persistence backends exchange: memories
//! (uploaded files plus metadata) and the folders that group them.
//! The crate has no I/O dependencies, so the storage crate, the cloud
//! client and the HTTP layer can all share it.

mod folder;
mod memory;

pub use folder::*;
pub use memory::*;

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};

/// Anything the reconciler can merge: keyed by id, ordered by last
/// modification.
pub trait Record: Clone {
    fn id(&self) -> &str;
    fn updated_at(&self) -> DateTime<Utc>;
}

/// Last time component handed out by [`new_local_id`].
static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

const ID_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// Generate an identifier for a record created by the local backend.
///
/// The prefix is a base-36 millisecond clock that never goes backwards
/// within the process; the suffix is random, so two records created in
/// the same millisecond by different sessions still differ.
pub fn new_local_id() -> String {
    let now_ms = Utc::now().timestamp_millis();
    let millis = LAST_ID_MILLIS
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(if now_ms > last { now_ms } else { last + 1 })
        })
        .map(|last| if now_ms > last { now_ms } else { last + 1 })
        .unwrap_or(now_ms);

    format!("{}{}", to_base36(millis as u64), nanoid::nanoid!(10, &ID_ALPHABET))
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ID_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.iter().rev().collect()
}

/// Render a byte count for humans: `0 Bytes`, `1 KB`, `1.5 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{:.2}", value);
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}
