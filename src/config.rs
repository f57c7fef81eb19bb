/*!
 * Configuration types for stratus
 *
 * Two kinds of configuration reach the engine:
 *
 * - [`JobRequest`]: what to copy, as supplied by the command line, a JSON job
 *   file or the HTTP intake
 * - [`StorageSettings`]: how to reach each provider (region, endpoint,
 *   credentials), built once per run from the environment or a TOML file and
 *   never mutated afterwards
 */

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::error::{CopyError, CopyResult};
use crate::locator::Provider;

/// Default number of objects copied concurrently
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default number of attempts per object
pub const DEFAULT_MAX_RETRY: u32 = 5;

/// Default fixed delay between attempts
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Default multipart part size and threshold (10 MiB)
pub const DEFAULT_PART_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Part size and threshold forced for Google Cloud Storage destinations (10 GiB)
pub const GCS_PART_SIZE_BYTES: u64 = 10240 * 1024 * 1024;

/// Default cap on concurrent part uploads within one multipart session
pub const DEFAULT_MAX_PART_CONCURRENCY: usize = 20;

/// A copy job as submitted by a request intake
///
/// JSON documents may use the snake_case field names, the camelCase names
/// (`maxConcurrent`, `isDeltaLake`, ...) or the PascalCase names of the
/// legacy `/invoke` payload (`Source`, `MaxRetry`, `IsAddSuccessFile`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Source locator, `scheme://bucket/prefix`
    #[serde(alias = "Source")]
    pub source: String,

    /// Destination locator, `scheme://bucket/prefix`
    #[serde(alias = "Target")]
    pub target: String,

    /// Maximum number of objects copied concurrently
    #[serde(
        default = "default_max_concurrent",
        alias = "MaxConcurrent",
        alias = "maxConcurrent"
    )]
    pub max_concurrent: usize,

    /// Maximum attempts per object
    #[serde(default = "default_max_retry", alias = "MaxRetry", alias = "maxRetry")]
    pub max_retry: u32,

    /// Always write a `_SUCCESS` marker at the destination
    #[serde(
        default,
        alias = "IsAddSuccessFile",
        alias = "addSuccessFile",
        alias = "isAddSuccessFile"
    )]
    pub add_success_file: bool,

    /// Restrict the copy to keys listed in the Delta Lake symlink manifest
    #[serde(default, alias = "IsDeltaLake", alias = "isDeltaLake")]
    pub is_delta_lake: bool,

    /// Multipart part size and threshold in bytes
    #[serde(
        default = "default_part_size",
        alias = "DefaultPartSizeByte",
        alias = "partSizeBytes"
    )]
    pub part_size_bytes: u64,

    /// Fixed delay between attempts, in seconds
    #[serde(default = "default_retry_delay", alias = "retryDelaySecs")]
    pub retry_delay_secs: u64,

    /// Cap on concurrent part uploads per multipart session
    #[serde(
        default = "default_max_part_concurrency",
        alias = "maxPartConcurrency"
    )]
    pub max_part_concurrency: usize,

    /// Double the delay after every failed attempt instead of keeping it fixed
    #[serde(default, alias = "exponentialBackoff")]
    pub exponential_backoff: bool,
}

impl JobRequest {
    /// Create a request with default options
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_retry: DEFAULT_MAX_RETRY,
            add_success_file: false,
            is_delta_lake: false,
            part_size_bytes: DEFAULT_PART_SIZE_BYTES,
            retry_delay_secs: DEFAULT_RETRY_DELAY_SECS,
            max_part_concurrency: DEFAULT_MAX_PART_CONCURRENCY,
            exponential_backoff: false,
        }
    }

    /// Parse a JSON job document
    pub fn from_json(json: &str) -> CopyResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CopyError::Config(format!("invalid job document: {}", e)))
    }

    /// Load a JSON job document from disk
    pub fn from_file(path: &Path) -> CopyResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CopyError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&contents)
    }
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

fn default_max_retry() -> u32 {
    DEFAULT_MAX_RETRY
}

fn default_part_size() -> u64 {
    DEFAULT_PART_SIZE_BYTES
}

fn default_retry_delay() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

fn default_max_part_concurrency() -> usize {
    DEFAULT_MAX_PART_CONCURRENCY
}

/// Connection settings for one provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Signing region
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint host or URL
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Named profile from the shared credentials file
    #[serde(default)]
    pub profile: Option<String>,

    /// Static access key (used when no profile is set)
    #[serde(default)]
    pub access_key: Option<String>,

    /// Static secret key (used when no profile is set)
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Path-style addressing
    #[serde(default)]
    pub force_path_style: bool,
}

impl ProviderSettings {
    /// Check credential consistency
    pub fn validate(&self) -> CopyResult<()> {
        if self.access_key.is_some() != self.secret_key.is_some() {
            return Err(CopyError::Config(
                "both access_key and secret_key must be provided together".to_string(),
            ));
        }
        Ok(())
    }

    /// Endpoint as a URL, defaulting to https
    pub fn endpoint_url(&self) -> Option<String> {
        self.endpoint.as_ref().map(|endpoint| {
            if endpoint.contains("://") {
                endpoint.clone()
            } else {
                format!("https://{}", endpoint)
            }
        })
    }
}

/// Per-provider connection settings for a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub s3: ProviderSettings,

    #[serde(default)]
    pub oss: ProviderSettings,

    #[serde(default)]
    pub gs: ProviderSettings,
}

impl StorageSettings {
    /// Read provider settings from the process environment
    ///
    /// | provider | region | endpoint | profile | static keys |
    /// |----------|--------|----------|---------|-------------|
    /// | s3  | `AWS_REGION` (eu-west-1) | - | `AWS_PROFILE` | `AWS_ACCESS_KEY`, `AWS_ACCESS_SECRET` |
    /// | oss | `oss` | `ALI_OSS_END_POINT` (oss-accelerate.aliyuncs.com) | `ALI_PROFILE` | `ALI_ACCESS_KEY`, `ALI_ACCESS_SECRET` |
    /// | gs  | `gs` | `GCP_OSS_END_POINT` (storage.googleapis.com) | `GCP_PROFILE` | `GCP_ACCESS_KEY`, `GCP_ACCESS_SECRET` |
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = |region: Option<String>, endpoint: Option<String>, prefix: &str| {
            let profile = lookup(&format!("{}_PROFILE", prefix));
            let (access_key, secret_key) = if profile.is_some() {
                (None, None)
            } else {
                (
                    lookup(&format!("{}_ACCESS_KEY", prefix)),
                    lookup(&format!("{}_ACCESS_SECRET", prefix)),
                )
            };
            ProviderSettings {
                region,
                endpoint,
                profile,
                access_key,
                secret_key,
                force_path_style: false,
            }
        };

        Self {
            s3: provider(
                Some(lookup("AWS_REGION").unwrap_or_else(|| "eu-west-1".to_string())),
                None,
                "AWS",
            ),
            oss: provider(
                Some("oss".to_string()),
                Some(
                    lookup("ALI_OSS_END_POINT")
                        .unwrap_or_else(|| "oss-accelerate.aliyuncs.com".to_string()),
                ),
                "ALI",
            ),
            gs: provider(
                Some("gs".to_string()),
                Some(
                    lookup("GCP_OSS_END_POINT")
                        .unwrap_or_else(|| "storage.googleapis.com".to_string()),
                ),
                "GCP",
            ),
        }
    }

    /// Load settings from a TOML file
    pub fn from_file(path: &Path) -> CopyResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CopyError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let settings: StorageSettings = toml::from_str(&contents).map_err(|e| {
            CopyError::Config(format!("invalid settings file {}: {}", path.display(), e))
        })?;
        Ok(settings)
    }

    /// Settings for one provider
    pub fn provider(&self, provider: Provider) -> &ProviderSettings {
        match provider {
            Provider::S3 => &self.s3,
            Provider::Oss => &self.oss,
            Provider::Gs => &self.gs,
        }
    }
}

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// Everything
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_job_request_defaults() {
        let req = JobRequest::from_json(r#"{"source":"s3://a/x/","target":"oss://b/y/"}"#)
            .unwrap();
        assert_eq!(req.max_concurrent, 5);
        assert_eq!(req.max_retry, 5);
        assert!(!req.add_success_file);
        assert!(!req.is_delta_lake);
        assert_eq!(req.part_size_bytes, 10 * 1024 * 1024);
        assert_eq!(req.retry_delay_secs, 5);
        assert_eq!(req.max_part_concurrency, 20);
        assert!(!req.exponential_backoff);
    }

    #[test]
    fn test_job_request_legacy_field_names() {
        let json = r#"{
            "Source": "s3://a/x/",
            "Target": "gs://b/y/",
            "MaxConcurrent": 8,
            "MaxRetry": 2,
            "IsAddSuccessFile": true,
            "IsDeltaLake": true,
            "DefaultPartSizeByte": 5242880
        }"#;
        let req = JobRequest::from_json(json).unwrap();
        assert_eq!(req.source, "s3://a/x/");
        assert_eq!(req.target, "gs://b/y/");
        assert_eq!(req.max_concurrent, 8);
        assert_eq!(req.max_retry, 2);
        assert!(req.add_success_file);
        assert!(req.is_delta_lake);
        assert_eq!(req.part_size_bytes, 5_242_880);
    }

    #[test]
    fn test_job_request_camel_case_names() {
        let json = r#"{"source":"s3://a/","target":"s3://b/","maxConcurrent":3,"isDeltaLake":true}"#;
        let req = JobRequest::from_json(json).unwrap();
        assert_eq!(req.max_concurrent, 3);
        assert!(req.is_delta_lake);
    }

    #[test]
    fn test_job_request_invalid_json() {
        assert!(matches!(
            JobRequest::from_json("{not json"),
            Err(CopyError::Config(_))
        ));
    }

    #[test]
    fn test_settings_from_lookup_defaults() {
        let settings = StorageSettings::from_lookup(|_| None);
        assert_eq!(settings.s3.region.as_deref(), Some("eu-west-1"));
        assert_eq!(settings.s3.endpoint, None);
        assert_eq!(
            settings.oss.endpoint.as_deref(),
            Some("oss-accelerate.aliyuncs.com")
        );
        assert_eq!(settings.gs.endpoint.as_deref(), Some("storage.googleapis.com"));
        assert_eq!(settings.gs.region.as_deref(), Some("gs"));
    }

    #[test]
    fn test_settings_profile_takes_precedence() {
        let vars: HashMap<&str, &str> = [
            ("ALI_PROFILE", "ali"),
            ("ALI_ACCESS_KEY", "ak"),
            ("ALI_ACCESS_SECRET", "sk"),
            ("AWS_ACCESS_KEY", "aws-ak"),
            ("AWS_ACCESS_SECRET", "aws-sk"),
            ("AWS_REGION", "us-east-1"),
        ]
        .into_iter()
        .collect();
        let settings = StorageSettings::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(settings.oss.profile.as_deref(), Some("ali"));
        assert_eq!(settings.oss.access_key, None);
        assert_eq!(settings.s3.access_key.as_deref(), Some("aws-ak"));
        assert_eq!(settings.s3.secret_key.as_deref(), Some("aws-sk"));
        assert_eq!(settings.s3.region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_settings_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[s3]
region = "us-west-2"

[oss]
endpoint = "oss-cn-hangzhou.aliyuncs.com"
access_key = "ak"
secret_key = "sk"
force_path_style = true
"#
        )
        .unwrap();

        let settings = StorageSettings::from_file(file.path()).unwrap();
        assert_eq!(settings.s3.region.as_deref(), Some("us-west-2"));
        assert!(settings.oss.force_path_style);
        assert_eq!(
            settings.provider(Provider::Oss).endpoint_url().as_deref(),
            Some("https://oss-cn-hangzhou.aliyuncs.com")
        );
        assert_eq!(settings.gs, ProviderSettings::default());
    }

    #[test]
    fn test_provider_settings_validate() {
        let settings = ProviderSettings {
            access_key: Some("ak".to_string()),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
        assert!(ProviderSettings::default().validate().is_ok());
    }

    #[test]
    fn test_endpoint_url_keeps_scheme() {
        let settings = ProviderSettings {
            endpoint: Some("http://localhost:9000".to_string()),
            ..Default::default()
        };
        assert_eq!(
            settings.endpoint_url().as_deref(),
            Some("http://localhost:9000")
        );
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(LogLevel::Error.to_tracing_level(), tracing::Level::ERROR);
        assert_eq!(LogLevel::Info.to_tracing_level(), tracing::Level::INFO);
        assert_eq!(LogLevel::Trace.to_tracing_level(), tracing::Level::TRACE);
    }
}
