/*!
 * Multipart transfer engine
 *
 * One session per object attempt: create, upload every part concurrently
 * behind a per-session semaphore, then complete with the parts sorted by
 * number and check the destination size. Any part failure aborts the session
 * exactly once; the retry governor restarts the object from a fresh session.
 */

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::checksum::content_md5;
use super::strategy::{part_count, plan_parts, PartTask, MAX_PARTS};
use super::transfer::TransferContext;
use crate::error::{CopyError, CopyResult};
use crate::storage::{CompletedPart, ObjectDescriptor, ObjectStore, StorageError};

/// Copy `object` to `dest_key` through a multipart session
///
/// Returns the number of parts uploaded.
pub async fn multipart_copy(
    ctx: &TransferContext,
    object: &ObjectDescriptor,
    dest_key: &str,
) -> CopyResult<usize> {
    let needed = part_count(object.size, ctx.job.part_size_bytes);
    if needed > MAX_PARTS {
        return Err(CopyError::TooManyParts {
            key: object.key.clone(),
            parts: needed,
            part_size: ctx.job.part_size_bytes,
            limit: MAX_PARTS,
        });
    }

    let parts = plan_parts(object.size, ctx.job.part_size_bytes);
    let part_count = parts.len();

    let upload_id = ctx
        .guard(async {
            ctx.destination
                .create_multipart_upload(dest_key)
                .await
                .map_err(|source| CopyError::CreateMultipartFailure {
                    key: dest_key.to_string(),
                    source,
                })
        })
        .await?;

    debug!(
        key = %object.key,
        dest_key = %dest_key,
        upload_id = %upload_id,
        parts = part_count,
        "created multipart upload"
    );

    let session = ctx.cancel.child_token();
    let permits = part_count.min(ctx.job.max_part_concurrency).max(1);
    let semaphore = Arc::new(Semaphore::new(permits));
    let mut join_set = JoinSet::new();

    for part in parts {
        let source = Arc::clone(&ctx.source);
        let destination = Arc::clone(&ctx.destination);
        let session = session.clone();
        let semaphore = Arc::clone(&semaphore);
        let source_key = object.key.clone();
        let dest_key = dest_key.to_string();
        let upload_id = upload_id.clone();

        join_set.spawn(async move {
            let _permit = tokio::select! {
                _ = session.cancelled() => return Err(CopyError::Cancelled),
                permit = semaphore.acquire_owned() => {
                    permit.map_err(|_| CopyError::Cancelled)?
                }
            };

            tokio::select! {
                biased;
                _ = session.cancelled() => Err(CopyError::Cancelled),
                result = upload_part(
                    source.as_ref(),
                    destination.as_ref(),
                    &source_key,
                    &dest_key,
                    &upload_id,
                    part,
                ) => result,
            }
        });
    }

    let completed = match join_parts(&mut join_set, &session, part_count).await {
        Ok(completed) => completed,
        Err(e) => {
            abort(ctx.destination.as_ref(), dest_key, &upload_id, &e).await;
            return Err(e);
        }
    };

    if ctx.cancel.is_cancelled() {
        abort(ctx.destination.as_ref(), dest_key, &upload_id, &CopyError::Cancelled).await;
        return Err(CopyError::Cancelled);
    }

    if let Err(source) = ctx
        .destination
        .complete_multipart_upload(dest_key, &upload_id, &completed)
        .await
    {
        let e = CopyError::CompleteMultipartFailure {
            key: dest_key.to_string(),
            source,
        };
        abort(ctx.destination.as_ref(), dest_key, &upload_id, &e).await;
        return Err(e);
    }

    verify_size(ctx.destination.as_ref(), dest_key, object.size).await?;

    info!(
        key = %object.key,
        dest_key = %dest_key,
        upload_id = %upload_id,
        parts = part_count,
        bytes = object.size,
        "completed multipart upload"
    );

    Ok(part_count)
}

/// Read one byte range from the source and upload it as a part
async fn upload_part(
    source: &dyn ObjectStore,
    destination: &dyn ObjectStore,
    source_key: &str,
    dest_key: &str,
    upload_id: &str,
    part: PartTask,
) -> CopyResult<CompletedPart> {
    let body = source
        .get(source_key, Some(part.range))
        .await
        .map_err(|source| CopyError::ObjectReadFailure {
            key: source_key.to_string(),
            source,
        })?;

    let checksum = content_md5(&body);
    let bytes = body.len();

    let etag = destination
        .upload_part(dest_key, upload_id, part.part_number, body, Some(checksum))
        .await
        .map_err(|source| CopyError::PartUploadFailure {
            key: dest_key.to_string(),
            part_number: part.part_number,
            source,
        })?;

    debug!(
        dest_key = %dest_key,
        part_number = part.part_number,
        range = %part.range,
        bytes,
        "uploaded part"
    );

    Ok(CompletedPart::new(part.part_number, etag))
}

/// Wait for every part task; completed parts come back sorted by number
///
/// The first failure cancels the remaining parts of the session. Cancellation
/// errors never mask the failure that caused them.
async fn join_parts(
    join_set: &mut JoinSet<CopyResult<CompletedPart>>,
    session: &CancellationToken,
    part_count: usize,
) -> CopyResult<Vec<CompletedPart>> {
    let mut completed = Vec::with_capacity(part_count);
    let mut failure: Option<CopyError> = None;

    while let Some(joined) = join_set.join_next().await {
        match joined.map_err(CopyError::from).and_then(|result| result) {
            Ok(part) => completed.push(part),
            Err(e) => {
                session.cancel();
                let replace = match &failure {
                    None => true,
                    Some(current) => current.is_cancelled() && !e.is_cancelled(),
                };
                if replace {
                    failure = Some(e);
                }
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }

    completed.sort_by_key(|part| part.part_number);
    Ok(completed)
}

/// Best-effort abort; failures are logged only
async fn abort(destination: &dyn ObjectStore, dest_key: &str, upload_id: &str, cause: &CopyError) {
    warn!(
        dest_key = %dest_key,
        upload_id = %upload_id,
        error = %cause,
        "aborting multipart upload"
    );

    if let Err(e) = destination.abort_multipart_upload(dest_key, upload_id).await {
        warn!(
            dest_key = %dest_key,
            upload_id = %upload_id,
            error = %e,
            "failed to abort multipart upload"
        );
    }
}

/// Check the completed object against the source size
async fn verify_size(destination: &dyn ObjectStore, dest_key: &str, expected: u64) -> CopyResult<()> {
    let head = destination
        .head(dest_key)
        .await
        .map_err(|source| CopyError::VerificationFailure {
            key: dest_key.to_string(),
            source,
        })?;

    match head {
        Some(head) if head.size == expected => Ok(()),
        Some(head) => Err(CopyError::SizeMismatch {
            key: dest_key.to_string(),
            expected,
            actual: head.size,
        }),
        None => Err(CopyError::VerificationFailure {
            key: dest_key.to_string(),
            source: StorageError::NotFound {
                bucket: destination.bucket().to_string(),
                key: dest_key.to_string(),
            },
        }),
    }
}
