/*!
 * Copy orchestrator
 *
 * Pages through the source listing in continuation-token order. Objects of
 * a page are copied concurrently, at most `max_concurrent` at a time, and the
 * whole page is joined before the next page is requested. The first object
 * that exhausts its retries cancels the run: siblings stop, open multipart
 * sessions are aborted and no success marker is written.
 */

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::job::CopyJob;
use super::manifest::{self, ManifestIndex};
use super::marker;
use super::retry::RetryPolicy;
use super::strategy::is_success_marker;
use super::transfer::{copy_with_retry, CopyOutcome, TransferContext};
use crate::config::JobRequest;
use crate::error::{CopyError, CopyResult};
use crate::stats::CopyReport;
use crate::storage::{ObjectStore, StorageError, StoreFactory};

/// Runs one copy job between two bucket-scoped stores
pub struct CopyOrchestrator {
    job: Arc<CopyJob>,
    source: Arc<dyn ObjectStore>,
    destination: Arc<dyn ObjectStore>,
    cancel: CancellationToken,
}

impl CopyOrchestrator {
    pub fn new(
        job: CopyJob,
        source: Arc<dyn ObjectStore>,
        destination: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            job: Arc::new(job),
            source,
            destination,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token (Ctrl-C, server shutdown)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Copy every accepted object, then replicate the success marker
    pub async fn run(&self) -> CopyResult<CopyReport> {
        let start = Instant::now();
        let job = &self.job;
        let mut report = CopyReport::default();

        info!(
            source = %job.source,
            destination = %job.destination,
            max_concurrent = job.max_concurrent,
            max_retry = job.max_retry,
            part_size = job.part_size_bytes,
            manifest_filter = job.manifest_filter_enabled,
            "starting copy"
        );

        report.source_had_marker = marker::source_has_marker(self.source.as_ref(), &job.source).await;

        let ctx = TransferContext::new(
            Arc::clone(&self.source),
            Arc::clone(&self.destination),
            Arc::clone(&self.job),
            self.cancel.clone(),
        );
        let policy = RetryPolicy::from_job(job);
        let semaphore = Arc::new(Semaphore::new(job.max_concurrent));

        let mut manifest: Option<Arc<ManifestIndex>> = None;
        let mut continuation_token: Option<String> = None;

        loop {
            if self.cancel.is_cancelled() {
                return Err(CopyError::Cancelled);
            }

            let page = self
                .source
                .list(&job.source.prefix, continuation_token.take())
                .await
                .map_err(|source| CopyError::ListingFailure {
                    bucket: job.source.bucket.clone(),
                    prefix: job.source.prefix.clone(),
                    source,
                })?;

            if job.manifest_filter_enabled && manifest.is_none() {
                let index = ManifestIndex::load(self.source.as_ref(), &job.source).await?;
                manifest = Some(Arc::new(index));
            }

            let mut join_set: JoinSet<CopyResult<CopyOutcome>> = JoinSet::new();

            for object in page.objects {
                if is_success_marker(&object.key) {
                    report.skipped_markers += 1;
                    continue;
                }
                if !manifest::accepts(manifest.as_deref(), &object.key) {
                    report.filtered_out += 1;
                    continue;
                }

                let permit = tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    permit = Arc::clone(&semaphore).acquire_owned() => {
                        permit.map_err(|e| CopyError::Task(e.to_string()))?
                    }
                };

                let ctx = ctx.clone();
                join_set.spawn(async move {
                    let _permit = permit;
                    let result = copy_with_retry(&ctx, &policy, &object).await;
                    if matches!(&result, Err(e) if !e.is_cancelled()) {
                        ctx.cancel.cancel();
                    }
                    result
                });
            }

            if let Some(e) = self.join_page(&mut join_set, &mut report).await {
                error!(error = %e, key = ?e.failed_key(), "copy aborted");
                return Err(e);
            }

            if !page.is_truncated {
                break;
            }
            continuation_token = Some(page.next_continuation_token.ok_or_else(|| {
                CopyError::ListingFailure {
                    bucket: job.source.bucket.clone(),
                    prefix: job.source.prefix.clone(),
                    source: StorageError::Protocol(
                        "truncated listing without continuation token".to_string(),
                    ),
                }
            })?);
        }

        if self.cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }

        if marker::should_write_marker(job.add_success_file, report.source_had_marker) {
            match marker::write_marker(self.destination.as_ref(), &job.destination).await {
                Ok(_) => report.marker_written = true,
                Err(e) => warn!(error = %e, "success marker not written"),
            }
        }

        report.elapsed = start.elapsed();
        info!(
            copied = report.copied,
            bytes = report.bytes_copied,
            multipart = report.multipart_objects,
            skipped_markers = report.skipped_markers,
            filtered_out = report.filtered_out,
            marker_written = report.marker_written,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "copy finished"
        );

        Ok(report)
    }

    /// Join every task of a page; returns the error that stopped the run
    ///
    /// A real failure wins over the cancellations it caused.
    async fn join_page(
        &self,
        join_set: &mut JoinSet<CopyResult<CopyOutcome>>,
        report: &mut CopyReport,
    ) -> Option<CopyError> {
        let mut failure: Option<CopyError> = None;

        while let Some(joined) = join_set.join_next().await {
            match joined.map_err(CopyError::from).and_then(|result| result) {
                Ok(outcome) => report.record(&outcome),
                Err(e) => {
                    self.cancel.cancel();
                    let replace = match &failure {
                        None => true,
                        Some(current) => current.is_cancelled() && !e.is_cancelled(),
                    };
                    if replace {
                        failure = Some(e);
                    }
                }
            }
        }

        if failure.is_none() && self.cancel.is_cancelled() {
            failure = Some(CopyError::Cancelled);
        }
        failure
    }
}

/// Validate a request, open both stores and run the copy
pub async fn run_job(
    factory: &dyn StoreFactory,
    request: &JobRequest,
    cancel: CancellationToken,
) -> CopyResult<CopyReport> {
    let job = CopyJob::from_request(request)?;

    let source = factory
        .open(&job.source)
        .await
        .map_err(|e| CopyError::Config(format!("cannot open source {}: {}", job.source, e)))?;
    let destination = factory.open(&job.destination).await.map_err(|e| {
        CopyError::Config(format!("cannot open destination {}: {}", job.destination, e))
    })?;

    CopyOrchestrator::new(job, source, destination)
        .with_cancellation(cancel)
        .run()
        .await
}
