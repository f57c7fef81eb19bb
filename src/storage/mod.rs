//! Object storage client abstraction
//!
//! The copy engine only ever talks to storage through the [`ObjectStore`]
//! trait. An `ObjectStore` is bound to one bucket on one provider; the
//! [`StoreFactory`] turns a resolved [`Locator`] into such a handle.
//!
//! Two implementations ship with the crate:
//!
//! - [`S3Store`]: backed by `aws-sdk-s3`, used for AWS S3 and for the
//!   S3-compatible endpoints of Alibaba OSS and Google Cloud Storage
//! - [`MemoryStore`]: an in-process bucket with fault injection, used by the
//!   test suite and for dry runs of the engine

pub mod error;
pub mod memory;
mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::locator::Locator;

pub use error::{StorageError, StorageResult};
pub use memory::{MemoryRegistry, MemoryStore};
pub use s3::{S3Store, S3StoreFactory};

/// One entry of a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Full object key
    pub key: String,

    /// Object size in bytes
    pub size: u64,
}

impl ObjectDescriptor {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// One page of a paginated listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects on this page
    pub objects: Vec<ObjectDescriptor>,

    /// Whether more pages follow
    pub is_truncated: bool,

    /// Token to request the next page
    pub next_continuation_token: Option<String>,
}

/// Result of a head request on an existing object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHead {
    /// Reported content length
    pub size: u64,
}

/// Inclusive byte range for ranged reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Value for the HTTP `Range` header
    pub fn to_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.start, self.end)
    }
}

/// A successfully uploaded part of a multipart session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedPart {
    /// Part number (1-indexed)
    pub part_number: i32,

    /// ETag returned by the upload
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: i32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// Bucket-scoped object storage client
///
/// Every call is a suspending remote operation. Implementations must be
/// `Send + Sync`; a single handle is shared by all concurrent copy tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this handle operates on
    fn bucket(&self) -> &str;

    /// List one page of objects under `prefix`
    async fn list(
        &self,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> StorageResult<ListPage>;

    /// Head an object; `Ok(None)` when it does not exist
    async fn head(&self, key: &str) -> StorageResult<Option<ObjectHead>>;

    /// Read an object fully, or only `range` when given
    ///
    /// Range ends past the object size are clamped to the last byte.
    async fn get(&self, key: &str, range: Option<ByteRange>) -> StorageResult<Bytes>;

    /// Write an object in one request
    ///
    /// `content_md5` is the base64 MD5 digest of `body`, verified server side.
    async fn put(&self, key: &str, body: Bytes, content_md5: Option<String>) -> StorageResult<()>;

    /// Open a multipart session and return its upload id
    async fn create_multipart_upload(&self, key: &str) -> StorageResult<String>;

    /// Upload one part and return its ETag
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
        content_md5: Option<String>,
    ) -> StorageResult<String>;

    /// Complete a session; `parts` must be sorted by part number
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> StorageResult<()>;

    /// Abort a session, discarding uploaded parts
    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> StorageResult<()>;
}

/// Builds bucket-scoped stores for resolved locators
#[async_trait]
pub trait StoreFactory: Send + Sync {
    async fn open(&self, locator: &Locator) -> StorageResult<Arc<dyn ObjectStore>>;
}
