//! Single-request copy for objects at or below the multipart threshold

use tracing::debug;

use super::checksum::content_md5;
use super::transfer::TransferContext;
use crate::error::{CopyError, CopyResult};
use crate::storage::ObjectDescriptor;

/// Read the whole object and write it with its Content-MD5 attached
pub async fn simple_copy(
    ctx: &TransferContext,
    object: &ObjectDescriptor,
    dest_key: &str,
) -> CopyResult<u64> {
    let body = ctx
        .guard(async {
            ctx.source
                .get(&object.key, None)
                .await
                .map_err(|source| CopyError::ObjectReadFailure {
                    key: object.key.clone(),
                    source,
                })
        })
        .await?;

    let checksum = content_md5(&body);
    let bytes = body.len() as u64;

    ctx.guard(async {
        ctx.destination
            .put(dest_key, body, Some(checksum))
            .await
            .map_err(|source| CopyError::ObjectWriteFailure {
                key: dest_key.to_string(),
                source,
            })
    })
    .await?;

    debug!(key = %object.key, dest_key = %dest_key, bytes, "simple copy done");
    Ok(bytes)
}
