//! Error types for object storage client operations

use thiserror::Error;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors reported by an [`ObjectStore`](super::ObjectStore) implementation
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    /// AWS SDK error that could not be classified further
    #[error("SDK error: {0}")]
    Sdk(String),

    /// Service error with specific error code
    #[error("service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Object not found in bucket
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Access denied error
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Invalid client configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid range request
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Payload could not be interpreted
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),

    /// Timeout error
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The service answered with something the protocol does not allow
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Convert AWS SDK errors to StorageError
impl<E> From<aws_sdk_s3::error::SdkError<E>> for StorageError
where
    E: std::error::Error + aws_sdk_s3::error::ProvideErrorMetadata + 'static,
{
    fn from(error: aws_sdk_s3::error::SdkError<E>) -> Self {
        use aws_sdk_s3::error::SdkError;

        match error {
            SdkError::DispatchFailure(e) => {
                if e.is_timeout() {
                    StorageError::Timeout(format!("{:?}", e))
                } else {
                    StorageError::Network(format!("dispatch failure: {:?}", e))
                }
            }
            SdkError::TimeoutError(e) => StorageError::Timeout(format!("{:?}", e)),
            SdkError::ResponseError(e) => StorageError::Network(format!("response error: {:?}", e)),
            SdkError::ServiceError(e) => {
                let err = e.err();
                let code = err.code().unwrap_or("Unknown").to_string();
                let message = err
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());

                match code.as_str() {
                    "AccessDenied" => StorageError::AccessDenied(message),
                    _ => StorageError::Service { code, message },
                }
            }
            other => StorageError::Sdk(format!("{:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formats() {
        let err = StorageError::NotFound {
            bucket: "my-bucket".to_string(),
            key: "my-key".to_string(),
        };
        assert_eq!(format!("{}", err), "object not found: my-bucket/my-key");

        let err = StorageError::Service {
            code: "SlowDown".to_string(),
            message: "rate limited".to_string(),
        };
        assert_eq!(format!("{}", err), "service error (SlowDown): rate limited");
    }
}
