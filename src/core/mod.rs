/*!
 * Copy engine
 *
 * The orchestrator lists the source page by page and fans each accepted
 * object out to a bounded set of workers. Every worker runs one object copy
 * under the retry governor; the strategy selector sends it either through a
 * single get/put or through a multipart session whose parts are themselves
 * uploaded concurrently.
 */

pub mod checksum;
pub mod job;
pub mod manifest;
pub mod marker;
pub mod multipart;
pub mod orchestrator;
pub mod retry;
pub mod simple;
pub mod strategy;
pub mod transfer;

pub use job::CopyJob;
pub use manifest::ManifestIndex;
pub use orchestrator::{run_job, CopyOrchestrator};
pub use retry::{with_retry, BackoffStrategy, RetryPolicy};
pub use strategy::{choose_strategy, is_success_marker, plan_parts, PartTask, TransferStrategy};
pub use transfer::{copy_object, CopyOutcome, TransferContext};
