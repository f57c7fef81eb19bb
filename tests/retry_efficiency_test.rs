use bytes::Bytes;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stratus::config::JobRequest;
use stratus::core::retry::{with_retry, RetryPolicy};
use stratus::core::{CopyJob, CopyOrchestrator};
use stratus::error::{CopyError, CopyResult};
use stratus::storage::{MemoryStore, StorageError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn transient() -> CopyError {
    CopyError::PartUploadFailure {
        key: "out/k".to_string(),
        part_number: 1,
        source: StorageError::Timeout("timed out".to_string()),
    }
}

#[tokio::test(start_paused = true)]
async fn test_permanent_error_no_retry() {
    let attempts = AtomicU32::new(0);
    let policy = RetryPolicy::fixed(10, Duration::from_secs(5));

    let result: CopyResult<()> = with_retry(&policy, &CancellationToken::new(), |_| {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(CopyError::Config("bad job".to_string())) }
    })
    .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1, "Permanent error triggered retries!");
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_retries_with_fixed_delay() {
    let attempts = AtomicU32::new(0);
    let policy = RetryPolicy::fixed(3, Duration::from_secs(5));
    let start = Instant::now();

    let result: CopyResult<()> = with_retry(&policy, &CancellationToken::new(), |_| {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err(transient()) }
    })
    .await;

    let err = result.unwrap_err();
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(err.to_string().contains("3 attempts"));
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_exponential_backoff_delays() {
    let policy = RetryPolicy::exponential(4, Duration::from_secs(1));
    let start = Instant::now();

    let result: CopyResult<()> =
        with_retry(&policy, &CancellationToken::new(), |_| async { Err(transient()) }).await;

    assert!(matches!(result, Err(CopyError::RetriesExhausted { attempts: 4, .. })));
    // 1s + 2s + 4s
    assert_eq!(start.elapsed(), Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn test_run_waits_between_object_attempts() {
    let source = Arc::new(MemoryStore::new("src"));
    let destination = Arc::new(MemoryStore::new("dst"));
    source.insert("a/1.txt", Bytes::from_static(b"hello"));
    source.fail_reads("a/1.txt", 2);

    let job = CopyJob::from_request(&JobRequest::new("s3://src/a/", "s3://dst/out/")).unwrap();
    let start = Instant::now();
    let report = CopyOrchestrator::new(job, source, destination.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(report.copied, 1);
    assert!(start.elapsed() >= Duration::from_secs(10));
    assert_eq!(destination.object("out/1.txt"), Some(Bytes::from_static(b"hello")));
}
