//! Delta Lake symlink manifest filter
//!
//! A table written with symlink manifests lists its live data files in
//! `<prefix>/_symlink_format_manifest/manifest`. When filtering is on, only
//! keys mentioned in that document are copied.

use tracing::{debug, info};

use crate::error::{CopyError, CopyResult};
use crate::locator::Locator;
use crate::storage::{ObjectStore, StorageError};

/// Manifest location relative to the table prefix
pub const MANIFEST_RELATIVE_PATH: &str = "_symlink_format_manifest/manifest";

/// Manifest content held in memory for the duration of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestIndex {
    content: String,
}

impl ManifestIndex {
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Key of the manifest for a table rooted at `prefix`
    pub fn manifest_key(prefix: &str) -> String {
        let root = prefix.trim_end_matches('/');
        if root.is_empty() {
            MANIFEST_RELATIVE_PATH.to_string()
        } else {
            format!("{}/{}", root, MANIFEST_RELATIVE_PATH)
        }
    }

    /// Fetch and read the manifest under the source prefix
    pub async fn load(store: &dyn ObjectStore, source: &Locator) -> CopyResult<Self> {
        let key = Self::manifest_key(&source.prefix);

        let body = store
            .get(&key, None)
            .await
            .map_err(|source| CopyError::ManifestUnavailable {
                key: key.clone(),
                source,
            })?;

        let content = String::from_utf8(body.to_vec()).map_err(|e| {
            CopyError::ManifestUnavailable {
                key: key.clone(),
                source: StorageError::InvalidData(e.to_string()),
            }
        })?;

        info!(key = %key, bytes = content.len(), "loaded manifest");
        Ok(Self::from_text(content))
    }

    /// Whether the manifest mentions `key`
    ///
    /// Plain substring containment: the manifest holds full object URIs, so a
    /// bare key matches the line that ends with it.
    pub fn accepts(&self, key: &str) -> bool {
        let accepted = self.content.contains(key);
        if !accepted {
            debug!(key = %key, "not in manifest, skipping");
        }
        accepted
    }
}

/// Filter decision with filtering optionally disabled
pub fn accepts(index: Option<&ManifestIndex>, key: &str) -> bool {
    index.map_or(true, |index| index.accepts(key))
}
