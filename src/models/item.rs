//! Source records and the inventory items derived from them.

use super::media::is_allowed_media;

/// Attachment reference as reported by the source feed.
///
/// The URL is short-lived on the platform side: a snapshot taken at load
/// time is only trusted as a fallback link, never for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Download URL.
    pub url: String,
    /// Declared size in bytes.
    pub size_bytes: u64,
    /// Original file name.
    pub filename: String,
}

impl AttachmentRef {
    /// Construct a reference.
    #[must_use]
    pub fn new(url: impl Into<String>, size_bytes: u64, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            size_bytes,
            filename: filename.into(),
        }
    }
}

/// One message from the source feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Platform message identifier.
    pub id: u64,
    /// Raw text body.
    pub text: String,
    /// All attachments, unfiltered.
    pub attachments: Vec<AttachmentRef>,
    /// Permalink to the message.
    pub permalink: String,
}

impl Record {
    /// Attachments whose file names are on the media allow-list, in order.
    #[must_use]
    pub fn allowed_attachments(&self) -> Vec<AttachmentRef> {
        filter_allowed(&self.attachments)
    }
}

/// Keep only allow-listed attachments, preserving order.
#[must_use]
pub fn filter_allowed(attachments: &[AttachmentRef]) -> Vec<AttachmentRef> {
    attachments
        .iter()
        .filter(|attachment| is_allowed_media(&attachment.filename))
        .cloned()
        .collect()
}

/// A cached, deliverable unit derived from one source record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    /// Identifier of the origin record, used to re-resolve attachments.
    pub source_message_id: u64,
    /// Trimmed text body; may be empty.
    pub text_content: String,
    /// Allow-listed attachments as seen at load time.
    pub attachment_refs: Vec<AttachmentRef>,
    /// Permalink to the origin record.
    pub origin_link: String,
}

impl InventoryItem {
    /// Derive an item from a record.
    ///
    /// Returns `None` when the record has neither non-blank text nor an
    /// allow-listed attachment.
    #[must_use]
    pub fn from_record(record: &Record) -> Option<Self> {
        let text_content = record.text.trim().to_owned();
        let attachment_refs = record.allowed_attachments();

        if text_content.is_empty() && attachment_refs.is_empty() {
            return None;
        }

        Some(Self {
            source_message_id: record.id,
            text_content,
            attachment_refs,
            origin_link: record.permalink.clone(),
        })
    }

    /// Whether the item carries attachment snapshots worth re-resolving.
    #[must_use]
    pub fn has_attachments(&self) -> bool {
        !self.attachment_refs.is_empty()
    }
}
