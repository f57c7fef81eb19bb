//! End-to-end copy runs against in-memory buckets

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use stratus::config::JobRequest;
use stratus::core::{CopyJob, CopyOrchestrator};
use stratus::error::{CopyError, EXIT_INTEGRITY, EXIT_PARTIAL};
use stratus::storage::MemoryStore;

const MIB: usize = 1024 * 1024;

fn payload(len: usize) -> Bytes {
    Bytes::from((0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>())
}

fn buckets() -> (Arc<MemoryStore>, Arc<MemoryStore>) {
    (Arc::new(MemoryStore::new("src")), Arc::new(MemoryStore::new("dst")))
}

fn request(source: &str, target: &str) -> JobRequest {
    let mut request = JobRequest::new(source, target);
    request.retry_delay_secs = 0;
    request
}

async fn run(
    request: &JobRequest,
    source: &Arc<MemoryStore>,
    destination: &Arc<MemoryStore>,
) -> Result<stratus::CopyReport, CopyError> {
    let job = CopyJob::from_request(request).unwrap();
    CopyOrchestrator::new(job, source.clone(), destination.clone())
        .run()
        .await
}

#[tokio::test]
async fn test_mixed_simple_and_multipart_copy() {
    let (source, destination) = buckets();
    source.insert("a/1.txt", Bytes::from_static(b"hello"));
    source.insert("a/2.bin", payload(50 * MIB));

    let report = run(&request("s3://src/a/", "oss://dst/out/"), &source, &destination)
        .await
        .unwrap();

    assert_eq!(report.copied, 2);
    assert_eq!(report.multipart_objects, 1);
    assert_eq!(report.bytes_copied, 5 + 50 * MIB as u64);

    assert_eq!(destination.object("out/1.txt"), Some(Bytes::from_static(b"hello")));
    assert_eq!(destination.object("out/2.bin"), Some(payload(50 * MIB)));

    let log = destination.multipart_log();
    assert_eq!(log.created, vec!["out/2.bin".to_string()]);
    assert_eq!(
        log.completed,
        vec![("out/2.bin".to_string(), vec![1, 2, 3, 4, 5])]
    );
    assert!(log.aborted.is_empty());
    assert_eq!(destination.puts(), vec!["out/1.txt".to_string()]);
}

#[tokio::test]
async fn test_object_concurrency_bounded_and_pages_joined() {
    let source = Arc::new(MemoryStore::with_page_size("src", 7));
    let destination = Arc::new(MemoryStore::new("dst"));
    for i in 0..20 {
        source.insert(format!("a/{:02}.txt", i), Bytes::from(format!("body {}", i)));
    }
    source.delay_reads(Duration::from_millis(10));

    let mut request = request("s3://src/a/", "s3://dst/out/");
    request.max_concurrent = 3;
    let report = run(&request, &source, &destination).await.unwrap();

    assert_eq!(report.copied, 20);
    assert_eq!(source.list_calls(), 3);
    assert_eq!(source.max_reads_in_flight(), 3);
    assert_eq!(source.lists_during_reads(), 0);
    assert_eq!(destination.keys().len(), 20);
}

#[tokio::test]
async fn test_threshold_boundary_uses_simple_copy() {
    let (source, destination) = buckets();
    source.insert("a/exact", payload(16));
    source.insert("a/over", payload(17));

    let mut request = request("s3://src/a/", "s3://dst/out/");
    request.part_size_bytes = 16;
    let report = run(&request, &source, &destination).await.unwrap();

    assert_eq!(report.copied, 2);
    assert_eq!(report.multipart_objects, 1);
    assert_eq!(destination.puts(), vec!["out/exact".to_string()]);
    assert_eq!(destination.multipart_log().created, vec!["out/over".to_string()]);
}

#[tokio::test]
async fn test_manifest_filter_limits_copy() {
    let (source, destination) = buckets();
    source.insert("a/1.txt", Bytes::from_static(b"hello"));
    source.insert("a/2.bin", payload(64));
    source.insert(
        "a/_symlink_format_manifest/manifest",
        Bytes::from_static(b"s3://src/a/2.bin\n"),
    );

    let mut request = request("s3://src/a/", "oss://dst/out/");
    request.is_delta_lake = true;
    let report = run(&request, &source, &destination).await.unwrap();

    assert_eq!(report.copied, 1);
    assert_eq!(report.filtered_out, 2);
    assert_eq!(destination.keys(), vec!["out/2.bin".to_string()]);
}

#[tokio::test]
async fn test_without_filter_every_object_is_copied() {
    let (source, destination) = buckets();
    source.insert("a/1.txt", Bytes::from_static(b"hello"));
    source.insert("a/2.bin", payload(64));

    let report = run(&request("s3://src/a/", "oss://dst/out/"), &source, &destination)
        .await
        .unwrap();

    assert_eq!(report.copied, 2);
    assert_eq!(report.filtered_out, 0);
}

#[tokio::test]
async fn test_no_marker_without_source_marker_or_flag() {
    let (source, destination) = buckets();
    source.insert("a/1.txt", Bytes::from_static(b"hello"));

    let report = run(&request("s3://src/a/", "oss://dst/out/"), &source, &destination)
        .await
        .unwrap();

    assert!(!report.source_had_marker);
    assert!(!report.marker_written);
    assert!(destination.object("out/_SUCCESS").is_none());
}

#[tokio::test]
async fn test_source_marker_is_replicated_after_copy() {
    let (source, destination) = buckets();
    source.insert("a/1.txt", Bytes::from_static(b"hello"));
    source.insert("a/2.txt", Bytes::from_static(b"world"));
    source.insert("a/_SUCCESS", Bytes::new());

    let report = run(&request("s3://src/a/", "oss://dst/out/"), &source, &destination)
        .await
        .unwrap();

    assert!(report.source_had_marker);
    assert!(report.marker_written);
    assert_eq!(report.skipped_markers, 1);
    assert_eq!(report.copied, 2);
    assert_eq!(destination.object("out/_SUCCESS"), Some(Bytes::new()));

    // Marker lands only once every object is in place
    let puts = destination.puts();
    assert_eq!(puts.len(), 3);
    assert_eq!(puts.last().map(String::as_str), Some("out/_SUCCESS"));
}

#[tokio::test]
async fn test_marker_written_on_request() {
    let (source, destination) = buckets();
    source.insert("a/1.txt", Bytes::from_static(b"hello"));

    let mut request = request("s3://src/a/", "oss://dst/out/");
    request.add_success_file = true;
    let report = run(&request, &source, &destination).await.unwrap();

    assert!(!report.source_had_marker);
    assert!(report.marker_written);
    assert_eq!(destination.object("out/_SUCCESS"), Some(Bytes::new()));
}

#[tokio::test]
async fn test_marker_write_failure_is_not_fatal() {
    let (source, destination) = buckets();
    source.insert("a/1.txt", Bytes::from_static(b"hello"));
    destination.fail_puts("out/_SUCCESS");

    let mut request = request("s3://src/a/", "oss://dst/out/");
    request.add_success_file = true;
    let report = run(&request, &source, &destination).await.unwrap();

    assert_eq!(report.copied, 1);
    assert!(!report.marker_written);
}

#[tokio::test]
async fn test_transient_part_failure_restarts_session() {
    let (source, destination) = buckets();
    source.insert("a/big", payload(40));
    source.fail_reads("a/big", 1);

    let mut request = request("s3://src/a/", "s3://dst/out/");
    request.part_size_bytes = 10;
    let report = run(&request, &source, &destination).await.unwrap();

    assert_eq!(report.copied, 1);
    let log = destination.multipart_log();
    assert_eq!(log.created.len(), 2);
    assert_eq!(log.aborted.len(), 1);
    assert_eq!(log.completed.len(), 1);
    assert_eq!(destination.object("out/big"), Some(payload(40)));
    assert_eq!(destination.open_uploads(), 0);
}

#[tokio::test]
async fn test_persistent_size_mismatch_exhausts_retries() {
    let (source, destination) = buckets();
    source.insert("a/big", payload(40));
    destination.report_size("out/big", 39);

    let mut request = request("s3://src/a/", "s3://dst/out/");
    request.part_size_bytes = 10;
    request.max_retry = 3;
    request.add_success_file = true;
    let err = run(&request, &source, &destination).await.unwrap_err();

    assert_eq!(err.failed_key(), Some("a/big"));
    assert_eq!(err.exit_code(), EXIT_INTEGRITY);
    assert!(err.to_string().contains("after 3 attempts"));
    // Each attempt opens a fresh session
    assert_eq!(destination.multipart_log().created.len(), 3);
    assert!(destination.object("out/_SUCCESS").is_none());
}

#[tokio::test]
async fn test_failed_object_stops_run_and_cancels_siblings() {
    let (source, destination) = buckets();
    source.insert("a/bad", Bytes::from_static(b"unreadable"));
    source.insert("a/big", payload(30));
    source.fail_reads("a/bad", u32::MAX);
    destination.delay_part(1, Duration::from_secs(30));

    let mut request = request("s3://src/a/", "s3://dst/out/");
    request.part_size_bytes = 10;
    request.max_concurrent = 2;
    request.max_retry = 2;
    request.add_success_file = true;

    let err = tokio::time::timeout(Duration::from_secs(10), run(&request, &source, &destination))
        .await
        .expect("run should stop promptly")
        .unwrap_err();

    assert!(matches!(err, CopyError::ObjectCopyFailed { .. }));
    assert_eq!(err.failed_key(), Some("a/bad"));
    assert_eq!(err.exit_code(), EXIT_PARTIAL);

    let log = destination.multipart_log();
    assert!(log.completed.is_empty());
    assert_eq!(log.aborted.len(), log.created.len());
    assert_eq!(destination.open_uploads(), 0);
    assert!(destination.object("out/_SUCCESS").is_none());
}

#[tokio::test]
async fn test_failure_skips_remaining_pages() {
    let source = Arc::new(MemoryStore::with_page_size("src", 1));
    let destination = Arc::new(MemoryStore::new("dst"));
    source.insert("a/1", Bytes::from_static(b"one"));
    source.insert("a/2", Bytes::from_static(b"two"));
    source.fail_reads("a/1", u32::MAX);

    let mut request = request("s3://src/a/", "s3://dst/out/");
    request.max_retry = 1;
    let err = run(&request, &source, &destination).await.unwrap_err();

    assert_eq!(err.failed_key(), Some("a/1"));
    assert_eq!(source.list_calls(), 1);
    assert!(destination.keys().is_empty());
}

#[tokio::test]
async fn test_single_object_rename() {
    let (source, destination) = buckets();
    source.insert("a/1.txt", Bytes::from_static(b"hello"));

    let report = run(
        &request("s3://src/a/1.txt", "s3://dst/archive/renamed.txt"),
        &source,
        &destination,
    )
    .await
    .unwrap();

    assert_eq!(report.copied, 1);
    assert_eq!(destination.keys(), vec!["archive/renamed.txt".to_string()]);
}

#[tokio::test]
async fn test_single_object_into_directory() {
    let (source, destination) = buckets();
    source.insert("a/1.txt", Bytes::from_static(b"hello"));

    run(&request("s3://src/a/1.txt", "s3://dst/out/"), &source, &destination)
        .await
        .unwrap();

    assert_eq!(destination.keys(), vec!["out/1.txt".to_string()]);
}

#[tokio::test]
async fn test_gcs_destination_copies_in_one_request() {
    let (source, destination) = buckets();
    source.insert("a/obj", payload(64));

    let mut request = request("s3://src/a/", "gs://dst/out/");
    request.part_size_bytes = 10;
    let report = run(&request, &source, &destination).await.unwrap();

    assert_eq!(report.multipart_objects, 0);
    assert!(destination.multipart_log().created.is_empty());
    assert_eq!(destination.object("out/obj"), Some(payload(64)));
}

#[tokio::test]
async fn test_nested_keys_keep_relative_path() {
    let (source, destination) = buckets();
    source.insert("data/2024/05/file.csv", Bytes::from_static(b"x"));
    source.insert("data/2024/file.csv", Bytes::from_static(b"y"));

    run(
        &request("s3://src/data/2024/", "oss://dst/archive/out/"),
        &source,
        &destination,
    )
    .await
    .unwrap();

    assert_eq!(
        destination.keys(),
        vec![
            "archive/out/05/file.csv".to_string(),
            "archive/out/file.csv".to_string()
        ]
    );
}
