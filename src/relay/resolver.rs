//! Re-resolution of attachment URLs at delivery time.

use tracing::debug;

use crate::feed::SourceFeed;
use crate::models::item::{AttachmentRef, InventoryItem};
use crate::{AppError, Result};

/// Fetch the origin record again and return its current allow-listed
/// attachments.
///
/// Attachment URLs on the platform expire, so the snapshot stored on the
/// item is not used for downloads.
///
/// # Errors
///
/// Returns `AppError::OriginGone` if the origin record cannot be fetched.
pub async fn resolve(source: &dyn SourceFeed, item: &InventoryItem) -> Result<Vec<AttachmentRef>> {
    let record = source
        .fetch_record(item.source_message_id)
        .await
        .map_err(|err| match err {
            AppError::OriginGone(_) => err,
            other => AppError::OriginGone(other.to_string()),
        })?;

    let fresh = record.allowed_attachments();
    debug!(
        source_message_id = item.source_message_id,
        cached = item.attachment_refs.len(),
        fresh = fresh.len(),
        "attachments resolved"
    );
    Ok(fresh)
}
