//! Success marker replication
//!
//! Big-data writers drop an empty `_SUCCESS` object once a directory is
//! complete. Markers are skipped during the bulk copy and written to the
//! destination only after every object has landed.

use bytes::Bytes;
use tracing::{debug, info, warn};

use super::checksum::content_md5;
use super::strategy::SUCCESS_MARKER;
use crate::error::{CopyError, CopyResult};
use crate::locator::Locator;
use crate::storage::ObjectStore;

/// Whether the source prefix carries a success marker
///
/// Absence is a signal, not an error; a failed head request counts as absent.
pub async fn source_has_marker(store: &dyn ObjectStore, source: &Locator) -> bool {
    let key = source.child_key(SUCCESS_MARKER);
    match store.head(&key).await {
        Ok(Some(_)) => {
            debug!(key = %key, "source success marker present");
            true
        }
        Ok(None) => false,
        Err(e) => {
            warn!(key = %key, error = %e, "could not check source success marker");
            false
        }
    }
}

/// Whether a marker should be written at the destination
pub fn should_write_marker(add_success_file: bool, source_had_marker: bool) -> bool {
    add_success_file || source_had_marker
}

/// Write an empty marker object under the destination prefix
pub async fn write_marker(store: &dyn ObjectStore, destination: &Locator) -> CopyResult<String> {
    let key = destination.child_key(SUCCESS_MARKER);
    store
        .put(&key, Bytes::new(), Some(content_md5(&[])))
        .await
        .map_err(|source| CopyError::MarkerWriteFailure {
            key: key.clone(),
            source,
        })?;

    info!(key = %key, "wrote success marker");
    Ok(key)
}
