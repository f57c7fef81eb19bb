/*!
 * Locator parsing and destination key mapping
 *
 * A locator is a `scheme://bucket/prefix` string. The scheme selects the
 * storage provider (case-insensitive), the first segment after it names the
 * bucket and everything else is the key prefix.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CopyError, CopyResult};

/// Storage providers reachable through an S3-compatible API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// AWS S3
    S3,
    /// Alibaba Cloud OSS
    Oss,
    /// Google Cloud Storage (XML/S3 interoperability endpoint)
    Gs,
}

impl Provider {
    pub fn scheme(&self) -> &'static str {
        match self {
            Provider::S3 => "s3",
            Provider::Oss => "oss",
            Provider::Gs => "gs",
        }
    }
}

impl FromStr for Provider {
    type Err = CopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(Provider::S3),
            "oss" => Ok(Provider::Oss),
            "gs" => Ok(Provider::Gs),
            other => Err(CopyError::InvalidLocator(format!(
                "unsupported provider scheme '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Resolved storage location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub provider: Provider,
    pub bucket: String,
    pub prefix: String,
}

impl Locator {
    /// Parse a `scheme://bucket/prefix` string
    pub fn parse(locator: &str) -> CopyResult<Self> {
        let (provider, bucket, prefix) = resolve(locator)?;
        Ok(Self {
            provider,
            bucket,
            prefix,
        })
    }

    /// Key of a sibling object directly under this prefix
    ///
    /// Plain concatenation: `data/` + `_SUCCESS` is `data/_SUCCESS`.
    pub fn child_key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }
}

impl FromStr for Locator {
    type Err = CopyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locator::parse(s)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}/{}", self.provider, self.bucket, self.prefix)
    }
}

/// Split a locator string into `(provider, bucket, prefix)`
pub fn resolve(locator: &str) -> CopyResult<(Provider, String, String)> {
    let segments: Vec<&str> = locator.split('/').collect();
    if segments.len() < 3 {
        return Err(CopyError::InvalidLocator(format!(
            "'{}' is not of the form scheme://bucket/prefix",
            locator
        )));
    }

    let scheme = segments[0].strip_suffix(':').ok_or_else(|| {
        CopyError::InvalidLocator(format!("'{}' is missing the '://' separator", locator))
    })?;
    if !segments[1].is_empty() {
        return Err(CopyError::InvalidLocator(format!(
            "'{}' is missing the '://' separator",
            locator
        )));
    }

    let provider: Provider = scheme.parse()?;

    let bucket = segments[2];
    if bucket.is_empty() {
        return Err(CopyError::InvalidLocator(format!(
            "'{}' does not name a bucket",
            locator
        )));
    }

    let prefix = segments[3..].join("/");

    Ok((provider, bucket.to_string(), prefix))
}

/// Map a source key to its destination key
///
/// With a destination prefix ending in `/`, the source key's suffix after
/// `source_prefix` is appended to it; when the key equals the source prefix
/// (single-object copy) only its final segment is kept. A destination prefix
/// without a trailing `/` is a fixed target name and is returned verbatim.
pub fn destination_key(source_key: &str, source_prefix: &str, dest_prefix: &str) -> String {
    if !dest_prefix.ends_with('/') {
        return dest_prefix.to_string();
    }

    let suffix = if source_key == source_prefix {
        last_segment(source_key)
    } else if let Some(rest) = source_key.strip_prefix(source_prefix) {
        rest.trim_start_matches('/')
    } else {
        last_segment(source_key)
    };

    format!("{}{}", dest_prefix, suffix)
}

/// Final non-empty `/`-delimited segment
fn last_segment(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
