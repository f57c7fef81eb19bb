/*!
 * Transfer strategy selection and part planning
 */

use serde::Serialize;

use crate::storage::ByteRange;

/// Name of the success marker object
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Most parts one multipart session may hold
pub const MAX_PARTS: u64 = 10_000;

/// How a single object is moved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStrategy {
    /// One full read, one write
    Simple,
    /// A multipart session with concurrently uploaded parts
    Multipart,
}

/// Pick a strategy for an object of `size` bytes
///
/// Objects at or below `threshold` are copied in one request.
pub fn choose_strategy(size: u64, threshold: u64) -> TransferStrategy {
    if size <= threshold {
        TransferStrategy::Simple
    } else {
        TransferStrategy::Multipart
    }
}

/// Whether `key` names a success marker
///
/// Markers are never copied in the main pass; the replicator regenerates them.
pub fn is_success_marker(key: &str) -> bool {
    key.ends_with(SUCCESS_MARKER)
}

/// One part of a multipart copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartTask {
    /// 1-based, contiguous
    pub part_number: i32,
    pub range: ByteRange,
}

impl PartTask {
    /// Bytes covered by this part
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start + 1
    }
}

/// Number of parts needed for `size` bytes; never less than one
pub fn part_count(size: u64, part_size: u64) -> u64 {
    if part_size == 0 {
        return 1;
    }
    size.div_ceil(part_size).max(1)
}

/// Split `size` bytes into contiguous parts of `part_size`
///
/// The last range ends at the final byte of the object.
pub fn plan_parts(size: u64, part_size: u64) -> Vec<PartTask> {
    let part_size = part_size.max(1);
    let last_byte = size.saturating_sub(1);

    (1..=part_count(size, part_size))
        .map(|n| {
            let start = (n - 1) * part_size;
            let end = (start + part_size - 1).min(last_byte);
            PartTask {
                part_number: n as i32,
                range: ByteRange::new(start, end),
            }
        })
        .collect()
}
