//! Validated copy job

use std::time::Duration;

use tokio::sync::Semaphore;

use crate::config::{JobRequest, GCS_PART_SIZE_BYTES};
use crate::error::{CopyError, CopyResult};
use crate::locator::{Locator, Provider};

/// Immutable parameters of one run
///
/// Built once from a [`JobRequest`] and shared read-only by every copy task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyJob {
    pub source: Locator,
    pub destination: Locator,

    /// Objects copied concurrently
    pub max_concurrent: usize,

    /// Attempts per object, first attempt included
    pub max_retry: u32,

    /// Size of every multipart part except the last
    pub part_size_bytes: u64,

    /// Objects larger than this go through a multipart session
    pub threshold_bytes: u64,

    /// Write a destination `_SUCCESS` marker even if the source has none
    pub add_success_file: bool,

    /// Only copy keys named in the Delta Lake symlink manifest
    pub manifest_filter_enabled: bool,

    /// Pause between attempts of one object
    pub retry_delay: Duration,

    /// Cap on concurrent part uploads within one multipart session
    pub max_part_concurrency: usize,

    /// Grow the retry delay exponentially
    pub exponential_backoff: bool,
}

impl CopyJob {
    /// Validate a request and resolve both locators
    ///
    /// A Google Cloud Storage destination forces the part size and threshold
    /// to 10 GiB.
    pub fn from_request(request: &JobRequest) -> CopyResult<Self> {
        if request.source.trim().is_empty() {
            return Err(CopyError::Config("source is mandatory".to_string()));
        }
        if request.target.trim().is_empty() {
            return Err(CopyError::Config("target is mandatory".to_string()));
        }

        let source = Locator::parse(&request.source)?;
        let destination = Locator::parse(&request.target)?;

        // An empty prefix would map every object onto the key ""
        if destination.prefix.is_empty() {
            return Err(CopyError::Config(format!(
                "target {} must name a key or a prefix ending in '/'",
                request.target
            )));
        }

        if request.max_concurrent == 0 {
            return Err(CopyError::Config(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if request.max_concurrent > Semaphore::MAX_PERMITS {
            return Err(CopyError::Config(format!(
                "max_concurrent must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if request.max_retry == 0 {
            return Err(CopyError::Config("max_retry must be at least 1".to_string()));
        }
        if request.part_size_bytes == 0 {
            return Err(CopyError::Config(
                "part_size_bytes must be at least 1".to_string(),
            ));
        }
        if request.max_part_concurrency == 0 {
            return Err(CopyError::Config(
                "max_part_concurrency must be at least 1".to_string(),
            ));
        }
        if request.max_part_concurrency > Semaphore::MAX_PERMITS {
            return Err(CopyError::Config(format!(
                "max_part_concurrency must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }

        let part_size_bytes = if destination.provider == Provider::Gs {
            GCS_PART_SIZE_BYTES
        } else {
            request.part_size_bytes
        };

        Ok(Self {
            source,
            destination,
            max_concurrent: request.max_concurrent,
            max_retry: request.max_retry,
            part_size_bytes,
            threshold_bytes: part_size_bytes,
            add_success_file: request.add_success_file,
            manifest_filter_enabled: request.is_delta_lake,
            retry_delay: Duration::from_secs(request.retry_delay_secs),
            max_part_concurrency: request.max_part_concurrency,
            exponential_backoff: request.exponential_backoff,
        })
    }
}
