//! In-process object store
//!
//! `MemoryStore` keeps one bucket in memory and mimics the S3 semantics the
//! copy engine depends on: paginated listing, clamped range reads, Content-MD5
//! verification, and multipart sessions that reject unsorted or unknown parts.
//! Faults can be injected per key or per part number, and every multipart
//! call is recorded so tests can assert on the protocol exchange.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use md5::{Digest, Md5};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::error::{StorageError, StorageResult};
use super::{
    ByteRange, CompletedPart, ListPage, ObjectDescriptor, ObjectHead, ObjectStore, StoreFactory,
};
use crate::core::checksum::content_md5;
use crate::locator::Locator;

/// Default number of keys per listing page
pub const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Default)]
struct Upload {
    key: String,
    parts: BTreeMap<i32, (String, Bytes)>,
}

/// Injected failures and delays
#[derive(Debug, Default)]
struct Faults {
    fail_list: bool,
    fail_parts: HashSet<i32>,
    part_delays: HashMap<i32, Duration>,
    get_failures: HashMap<String, u32>,
    read_delay: Option<Duration>,
    fail_put_keys: HashSet<String>,
    reported_sizes: HashMap<String, u64>,
}

/// Recorded multipart traffic
#[derive(Debug, Clone, Default)]
pub struct MultipartLog {
    /// Keys of every `create_multipart_upload` call
    pub created: Vec<String>,

    /// Part numbers submitted to each `complete_multipart_upload`, in order
    pub completed: Vec<(String, Vec<i32>)>,

    /// `(key, upload_id)` of every abort
    pub aborted: Vec<(String, String)>,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<String, Bytes>,
    uploads: HashMap<String, Upload>,
    next_upload_id: u64,
    faults: Faults,
    multipart: MultipartLog,
    list_calls: usize,
    lists_during_reads: usize,
    puts: Vec<String>,
}

/// A single in-memory bucket
#[derive(Debug)]
pub struct MemoryStore {
    bucket: String,
    page_size: usize,
    state: Mutex<State>,
    parts_in_flight: AtomicUsize,
    max_parts_in_flight: AtomicUsize,
    reads_in_flight: AtomicUsize,
    max_reads_in_flight: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty bucket
    pub fn new(bucket: impl Into<String>) -> Self {
        Self::with_page_size(bucket, DEFAULT_PAGE_SIZE)
    }

    /// Create an empty bucket listing at most `page_size` keys per page
    pub fn with_page_size(bucket: impl Into<String>, page_size: usize) -> Self {
        Self {
            bucket: bucket.into(),
            page_size: page_size.max(1),
            state: Mutex::new(State::default()),
            parts_in_flight: AtomicUsize::new(0),
            max_parts_in_flight: AtomicUsize::new(0),
            reads_in_flight: AtomicUsize::new(0),
            max_reads_in_flight: AtomicUsize::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store an object directly
    pub fn insert(&self, key: impl Into<String>, body: impl Into<Bytes>) {
        self.state().objects.insert(key.into(), body.into());
    }

    /// Current content of an object
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state().objects.get(key).cloned()
    }

    /// All keys in the bucket, sorted
    pub fn keys(&self) -> Vec<String> {
        self.state().objects.keys().cloned().collect()
    }

    /// Make every listing call fail
    pub fn fail_listing(&self) {
        self.state().faults.fail_list = true;
    }

    /// Make every upload of `part_number` fail
    pub fn fail_part(&self, part_number: i32) {
        self.state().faults.fail_parts.insert(part_number);
    }

    /// Delay uploads of `part_number` by `delay`
    pub fn delay_part(&self, part_number: i32, delay: Duration) {
        self.state().faults.part_delays.insert(part_number, delay);
    }

    /// Make the next `times` reads of `key` fail
    pub fn fail_reads(&self, key: impl Into<String>, times: u32) {
        self.state().faults.get_failures.insert(key.into(), times);
    }

    /// Hold every read open for `delay` before answering
    pub fn delay_reads(&self, delay: Duration) {
        self.state().faults.read_delay = Some(delay);
    }

    /// Make every single-shot write of `key` fail
    pub fn fail_puts(&self, key: impl Into<String>) {
        self.state().faults.fail_put_keys.insert(key.into());
    }

    /// Make head requests on `key` report `size` regardless of content
    pub fn report_size(&self, key: impl Into<String>, size: u64) {
        self.state().faults.reported_sizes.insert(key.into(), size);
    }

    /// Snapshot of recorded multipart calls
    pub fn multipart_log(&self) -> MultipartLog {
        self.state().multipart.clone()
    }

    /// Keys written with single-shot puts, in call order
    pub fn puts(&self) -> Vec<String> {
        self.state().puts.clone()
    }

    /// Number of listing calls served
    pub fn list_calls(&self) -> usize {
        self.state().list_calls
    }

    /// Listing calls that arrived while a read was still running
    pub fn lists_during_reads(&self) -> usize {
        self.state().lists_during_reads
    }

    /// Highest number of reads observed running at once
    pub fn max_reads_in_flight(&self) -> usize {
        self.max_reads_in_flight.load(Ordering::SeqCst)
    }

    /// Multipart sessions neither completed nor aborted
    pub fn open_uploads(&self) -> usize {
        self.state().uploads.len()
    }

    /// Highest number of part uploads observed running at once
    pub fn max_parts_in_flight(&self) -> usize {
        self.max_parts_in_flight.load(Ordering::SeqCst)
    }

    fn not_found(&self, key: &str) -> StorageError {
        StorageError::NotFound {
            bucket: self.bucket.clone(),
            key: key.to_string(),
        }
    }
}

fn injected(message: impl Into<String>) -> StorageError {
    StorageError::Service {
        code: "InternalError".to_string(),
        message: message.into(),
    }
}

fn verify_md5(body: &[u8], content_md5_header: Option<&str>) -> StorageResult<()> {
    if let Some(expected) = content_md5_header {
        if content_md5(body) != expected {
            return Err(StorageError::Service {
                code: "BadDigest".to_string(),
                message: "The Content-MD5 you specified did not match what we received"
                    .to_string(),
            });
        }
    }
    Ok(())
}

fn etag(body: &[u8]) -> String {
    format!("\"{:x}\"", Md5::digest(body))
}

/// Decrements an in-flight counter when the call returns
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ListPage> {
        let mut state = self.state();
        state.list_calls += 1;
        if self.reads_in_flight.load(Ordering::SeqCst) > 0 {
            state.lists_during_reads += 1;
        }

        if state.faults.fail_list {
            return Err(injected("listing failure"));
        }

        let offset = match continuation_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| StorageError::InvalidData(format!("bad continuation token {}", token)))?,
            None => 0,
        };

        let matching: Vec<ObjectDescriptor> = state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, body)| ObjectDescriptor::new(key.clone(), body.len() as u64))
            .collect();

        let end = (offset + self.page_size).min(matching.len());
        let objects = matching
            .get(offset..end)
            .map(<[ObjectDescriptor]>::to_vec)
            .unwrap_or_default();
        let is_truncated = end < matching.len();

        Ok(ListPage {
            objects,
            is_truncated,
            next_continuation_token: is_truncated.then(|| end.to_string()),
        })
    }

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectHead>> {
        let state = self.state();
        let Some(body) = state.objects.get(key) else {
            return Ok(None);
        };
        let size = state
            .faults
            .reported_sizes
            .get(key)
            .copied()
            .unwrap_or(body.len() as u64);
        Ok(Some(ObjectHead { size }))
    }

    async fn get(&self, key: &str, range: Option<ByteRange>) -> StorageResult<Bytes> {
        let _in_flight = InFlight::enter(&self.reads_in_flight, &self.max_reads_in_flight);

        let delay = self.state().faults.read_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();

        if let Some(remaining) = state.faults.get_failures.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(injected(format!("read failure on {}", key)));
            }
        }

        let body = state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| self.not_found(key))?;

        let Some(range) = range else {
            return Ok(body);
        };

        let len = body.len() as u64;
        if len == 0 && range.start == 0 {
            return Ok(body);
        }
        if range.start > range.end || range.start >= len {
            return Err(StorageError::InvalidRange(format!(
                "{} not satisfiable for {} bytes",
                range.to_header(),
                len
            )));
        }
        let end = range.end.min(len - 1);
        Ok(body.slice(range.start as usize..=end as usize))
    }

    async fn put(&self, key: &str, body: Bytes, content_md5: Option<String>) -> StorageResult<()> {
        let mut state = self.state();
        if state.faults.fail_put_keys.contains(key) {
            return Err(injected(format!("write failure on {}", key)));
        }
        verify_md5(&body, content_md5.as_deref())?;
        state.puts.push(key.to_string());
        state.objects.insert(key.to_string(), body);
        Ok(())
    }

    async fn create_multipart_upload(&self, key: &str) -> StorageResult<String> {
        let mut state = self.state();
        state.next_upload_id += 1;
        let upload_id = format!("upload-{}", state.next_upload_id);
        state.uploads.insert(
            upload_id.clone(),
            Upload {
                key: key.to_string(),
                parts: BTreeMap::new(),
            },
        );
        state.multipart.created.push(key.to_string());
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        content_md5: Option<String>,
    ) -> StorageResult<String> {
        let _in_flight = InFlight::enter(&self.parts_in_flight, &self.max_parts_in_flight);

        let (delay, fail) = {
            let state = self.state();
            (
                state.faults.part_delays.get(&part_number).copied(),
                state.faults.fail_parts.contains(&part_number),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(injected(format!("upload of part {} failed", part_number)));
        }

        verify_md5(&body, content_md5.as_deref())?;

        let mut state = self.state();
        let upload = state
            .uploads
            .get_mut(upload_id)
            .filter(|upload| upload.key == key)
            .ok_or_else(|| StorageError::Service {
                code: "NoSuchUpload".to_string(),
                message: format!("no upload {} for {}", upload_id, key),
            })?;

        let tag = etag(&body);
        upload.parts.insert(part_number, (tag.clone(), body));
        Ok(tag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()> {
        let mut state = self.state();
        state.multipart.completed.push((
            key.to_string(),
            parts.iter().map(|p| p.part_number).collect(),
        ));

        if parts.is_empty() {
            return Err(StorageError::Service {
                code: "MalformedXML".to_string(),
                message: "no parts specified".to_string(),
            });
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(StorageError::Service {
                code: "InvalidPartOrder".to_string(),
                message: "the list of parts was not in ascending order".to_string(),
            });
        }

        let upload = state
            .uploads
            .get(upload_id)
            .filter(|upload| upload.key == key)
            .ok_or_else(|| StorageError::Service {
                code: "NoSuchUpload".to_string(),
                message: format!("no upload {} for {}", upload_id, key),
            })?;

        let mut assembled = BytesMut::new();
        for part in parts {
            match upload.parts.get(&part.part_number) {
                Some((tag, body)) if *tag == part.etag => assembled.extend_from_slice(body),
                _ => {
                    return Err(StorageError::Service {
                        code: "InvalidPart".to_string(),
                        message: format!("part {} not found", part.part_number),
                    })
                }
            }
        }

        state.uploads.remove(upload_id);
        state.objects.insert(key.to_string(), assembled.freeze());
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()> {
        let mut state = self.state();
        state
            .multipart
            .aborted
            .push((key.to_string(), upload_id.to_string()));
        state.uploads.remove(upload_id);
        Ok(())
    }
}

/// Buckets addressable by name, regardless of provider
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    buckets: Mutex<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a bucket, creating it empty when unknown
    pub fn bucket(&self, name: &str) -> Arc<MemoryStore> {
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::new(name)))
            .clone()
    }
}

#[async_trait]
impl StoreFactory for MemoryRegistry {
    async fn open(&self, locator: &Locator) -> StorageResult<Arc<dyn ObjectStore>> {
        Ok(self.bucket(&locator.bucket))
    }
}
