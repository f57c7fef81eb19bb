/*!
 * Error types for stratus
 */

use thiserror::Error;

use crate::storage::StorageError;

pub type CopyResult<T> = std::result::Result<T, CopyError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_INTEGRITY: i32 = 3;

/// Errors raised by the copy engine
#[derive(Error, Debug)]
pub enum CopyError {
    /// Malformed `scheme://bucket/prefix` locator
    #[error("invalid locator: {0}")]
    InvalidLocator(String),

    /// Invalid job parameters or client settings
    #[error("configuration error: {0}")]
    Config(String),

    /// Listing the source failed
    #[error("unable to list items in bucket {bucket:?} under {prefix:?}: {source}")]
    ListingFailure {
        bucket: String,
        prefix: String,
        #[source]
        source: StorageError,
    },

    /// Manifest requested but not readable
    #[error("manifest {key:?} unavailable: {source}")]
    ManifestUnavailable {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Reading (part of) a source object failed
    #[error("failed to read source object {key:?}: {source}")]
    ObjectReadFailure {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Single-shot write to the destination failed
    #[error("failed to write {key:?}: {source}")]
    ObjectWriteFailure {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Opening a multipart session failed
    #[error("unable to create multipart upload for {key:?}: {source}")]
    CreateMultipartFailure {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Object needs more parts than a multipart session accepts
    #[error("{key:?} needs {parts} parts of {part_size} bytes, more than the {limit} allowed")]
    TooManyParts {
        key: String,
        parts: u64,
        part_size: u64,
        limit: u64,
    },

    /// Uploading one part failed
    #[error("failed to upload part {part_number} of {key:?}: {source}")]
    PartUploadFailure {
        key: String,
        part_number: i32,
        #[source]
        source: StorageError,
    },

    /// Completing a multipart session failed
    #[error("failed to complete multipart upload for {key:?}: {source}")]
    CompleteMultipartFailure {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Post-copy head on the destination failed
    #[error("failed to verify {key:?}: {source}")]
    VerificationFailure {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Destination size differs from the source size
    #[error("size mismatch for {key:?}: source has {expected} bytes, destination has {actual}")]
    SizeMismatch {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// Writing the success marker failed
    #[error("failed to write success marker {key:?}: {source}")]
    MarkerWriteFailure {
        key: String,
        #[source]
        source: StorageError,
    },

    /// Every attempt of a retried operation failed
    #[error("after {attempts} attempts, last error: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<CopyError>,
    },

    /// An object could not be copied; aborts the run
    #[error("error happened after max retry for {key:?}: {source}")]
    ObjectCopyFailed {
        key: String,
        #[source]
        source: Box<CopyError>,
    },

    /// The run was cancelled before this operation finished
    #[error("operation cancelled")]
    Cancelled,

    /// A worker task panicked or was aborted
    #[error("worker task failed: {0}")]
    Task(String),
}

impl CopyError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CopyError::InvalidLocator(_) | CopyError::Config(_) => EXIT_FATAL,
            _ if self.is_integrity_failure() => EXIT_INTEGRITY,
            _ => EXIT_PARTIAL,
        }
    }

    /// Check if a whole-object retry may fix this error
    pub fn is_retryable(&self) -> bool {
        match self {
            CopyError::ObjectReadFailure { .. }
            | CopyError::ObjectWriteFailure { .. }
            | CopyError::CreateMultipartFailure { .. }
            | CopyError::PartUploadFailure { .. }
            | CopyError::CompleteMultipartFailure { .. }
            | CopyError::VerificationFailure { .. }
            | CopyError::SizeMismatch { .. }
            | CopyError::Task(_) => true,

            // Input, listing and manifest errors are fatal; marker failures are
            // never surfaced from a per-object copy
            CopyError::InvalidLocator(_)
            | CopyError::Config(_)
            | CopyError::ListingFailure { .. }
            | CopyError::ManifestUnavailable { .. }
            | CopyError::TooManyParts { .. }
            | CopyError::MarkerWriteFailure { .. }
            | CopyError::RetriesExhausted { .. }
            | CopyError::ObjectCopyFailed { .. }
            | CopyError::Cancelled => false,
        }
    }

    /// Check if this error, or any error it wraps, is a failed integrity check
    pub fn is_integrity_failure(&self) -> bool {
        match self {
            CopyError::SizeMismatch { .. } => true,
            CopyError::RetriesExhausted { last, .. } => last.is_integrity_failure(),
            CopyError::ObjectCopyFailed { source, .. } => source.is_integrity_failure(),
            _ => false,
        }
    }

    /// Check if this error is a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CopyError::Cancelled)
    }

    /// Key of the object that failed the run, if any
    pub fn failed_key(&self) -> Option<&str> {
        match self {
            CopyError::ObjectCopyFailed { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for CopyError {
    fn from(err: tokio::task::JoinError) -> Self {
        CopyError::Task(err.to_string())
    }
}
