/*!
 * Stratus - bulk object copy between S3-compatible buckets
 *
 * Copies every object under a source prefix to a destination prefix on the
 * same or another provider (AWS S3, Alibaba OSS, Google Cloud Storage):
 * - Bounded object-level concurrency with page-by-page listing
 * - Multipart transfers with capped part concurrency and Content-MD5 checks
 * - Whole-object retries with fail-fast cancellation of the run
 * - Optional Delta Lake symlink manifest filtering
 * - `_SUCCESS` marker replication
 *
 * Version: 0.3.0
 */

pub mod config;
pub mod core;
pub mod error;
pub mod locator;
pub mod logging;
pub mod server;
pub mod stats;
pub mod storage;

// Re-export commonly used types
pub use config::{JobRequest, LogLevel, ProviderSettings, StorageSettings};
pub use core::{run_job, CopyJob, CopyOrchestrator};
pub use error::{CopyError, CopyResult};
pub use locator::{destination_key, Locator, Provider};
pub use stats::CopyReport;
pub use storage::{MemoryRegistry, MemoryStore, ObjectStore, S3StoreFactory, StoreFactory};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
