/*!
 * Per-object copy: strategy dispatch under the retry governor
 */

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::job::CopyJob;
use super::multipart::multipart_copy;
use super::retry::{with_retry, RetryPolicy};
use super::simple::simple_copy;
use super::strategy::{choose_strategy, TransferStrategy};
use crate::error::{CopyError, CopyResult};
use crate::locator::destination_key;
use crate::storage::{ObjectDescriptor, ObjectStore};

/// Everything a copy task needs, cheap to clone into spawned tasks
#[derive(Clone)]
pub struct TransferContext {
    pub source: Arc<dyn ObjectStore>,
    pub destination: Arc<dyn ObjectStore>,
    pub job: Arc<CopyJob>,
    pub cancel: CancellationToken,
}

impl TransferContext {
    pub fn new(
        source: Arc<dyn ObjectStore>,
        destination: Arc<dyn ObjectStore>,
        job: Arc<CopyJob>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            destination,
            job,
            cancel,
        }
    }

    /// Race `operation` against run cancellation
    pub(crate) async fn guard<T, F>(&self, operation: F) -> CopyResult<T>
    where
        F: Future<Output = CopyResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CopyError::Cancelled),
            result = operation => result,
        }
    }
}

/// Result of one successfully copied object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOutcome {
    pub key: String,
    pub dest_key: String,
    pub strategy: TransferStrategy,
    pub bytes: u64,
    /// Parts uploaded; 1 for a simple copy
    pub parts: usize,
    /// Attempts used, first one included
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Copy one object once, without retries
pub async fn copy_object(
    ctx: &TransferContext,
    object: &ObjectDescriptor,
    attempt: u32,
) -> CopyResult<CopyOutcome> {
    let start = Instant::now();
    let dest_key = destination_key(&object.key, &ctx.job.source.prefix, &ctx.job.destination.prefix);
    let strategy = choose_strategy(object.size, ctx.job.threshold_bytes);

    debug!(
        key = %object.key,
        dest_key = %dest_key,
        bytes = object.size,
        attempt,
        ?strategy,
        "copying object"
    );

    let parts = match strategy {
        TransferStrategy::Simple => {
            simple_copy(ctx, object, &dest_key).await?;
            1
        }
        TransferStrategy::Multipart => multipart_copy(ctx, object, &dest_key).await?,
    };

    Ok(CopyOutcome {
        key: object.key.clone(),
        dest_key,
        strategy,
        bytes: object.size,
        parts,
        attempts: attempt,
        elapsed: start.elapsed(),
    })
}

/// Copy one object, restarting it from scratch on retryable failures
///
/// Failures other than cancellation come back as
/// [`CopyError::ObjectCopyFailed`] naming the key.
pub async fn copy_with_retry(
    ctx: &TransferContext,
    policy: &RetryPolicy,
    object: &ObjectDescriptor,
) -> CopyResult<CopyOutcome> {
    let result = with_retry(policy, &ctx.cancel, |attempt| copy_object(ctx, object, attempt)).await;

    match result {
        Ok(outcome) => {
            info!(
                key = %outcome.key,
                dest_key = %outcome.dest_key,
                bytes = outcome.bytes,
                parts = outcome.parts,
                attempt = outcome.attempts,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "copied object"
            );
            Ok(outcome)
        }
        Err(CopyError::Cancelled) => Err(CopyError::Cancelled),
        Err(e) => Err(CopyError::ObjectCopyFailed {
            key: object.key.clone(),
            source: Box::new(e),
        }),
    }
}
