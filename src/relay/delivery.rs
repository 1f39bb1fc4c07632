//! Size-gated attachment download and message composition.
//!
//! Attachments are independent units of failure: one failed download turns
//! that attachment into a fallback link and the rest of the post proceeds.

use bytes::{Bytes, BytesMut};
use futures_util::future::join_all;
use tracing::{info, warn};

use crate::config::DeliveryConfig;
use crate::feed::TargetFeed;
use crate::models::item::{AttachmentRef, InventoryItem};
use crate::models::payload::{AttachmentOutcome, OutboundFile, Payload};
use crate::{AppError, Result};

/// Where the attachment list for a delivery came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentSource {
    /// Freshly resolved from the origin record; may be downloaded.
    Fresh(Vec<AttachmentRef>),
    /// Load-time snapshot of a vanished origin; rendered as links only.
    Stale(Vec<AttachmentRef>),
}

impl AttachmentSource {
    /// No attachments at all.
    #[must_use]
    pub fn none() -> Self {
        Self::Fresh(Vec::new())
    }
}

/// Whether every attachment made it inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// All attachments uploaded inline (or there were none).
    Delivered,
    /// At least one attachment was replaced by a link.
    PartialDelivered,
}

/// What a successful send contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Overall status.
    pub status: DeliveryStatus,
    /// Files uploaded inline.
    pub inline_files: usize,
    /// Attachments listed as links.
    pub fallback_links: usize,
}

/// Downloads attachments within a byte budget and sends the composed post.
pub struct DeliveryPipeline {
    http: reqwest::Client,
    max_upload_bytes: u64,
    mention_role: u64,
    footer_label: Option<String>,
}

impl DeliveryPipeline {
    /// Build a pipeline whose HTTP client enforces the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the HTTP client cannot be built.
    pub fn new(config: &DeliveryConfig, mention_role: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| AppError::Config(format!("failed to build http client: {err}")))?;
        Ok(Self {
            http,
            max_upload_bytes: config.max_upload_bytes,
            mention_role,
            footer_label: config.footer_label.clone(),
        })
    }

    /// Decide per attachment whether it goes inline or as a link.
    ///
    /// Nothing is downloaded when the declared total exceeds the budget or
    /// when the list is a stale snapshot. Downloads run concurrently and all
    /// of them finish before this returns. Output order matches input order.
    pub async fn collect_outcomes(&self, attachments: &AttachmentSource) -> Vec<AttachmentOutcome> {
        let refs = match attachments {
            AttachmentSource::Stale(refs) => return links_for(refs),
            AttachmentSource::Fresh(refs) => refs,
        };
        if refs.is_empty() {
            return Vec::new();
        }

        let total: u64 = refs.iter().map(|a| a.size_bytes).sum();
        if total > self.max_upload_bytes {
            info!(
                total_bytes = total,
                budget = self.max_upload_bytes,
                count = refs.len(),
                "attachments over budget; sending links"
            );
            return links_for(refs);
        }

        join_all(refs.iter().map(|attachment| self.download_or_link(attachment))).await
    }

    async fn download_or_link(&self, attachment: &AttachmentRef) -> AttachmentOutcome {
        match self.download(attachment).await {
            Ok(bytes) => AttachmentOutcome::Downloaded(OutboundFile {
                filename: attachment.filename.clone(),
                bytes,
            }),
            Err(err) => {
                warn!(
                    filename = %attachment.filename,
                    %err,
                    "attachment demoted to link"
                );
                AttachmentOutcome::FallbackLink {
                    url: attachment.url.clone(),
                }
            }
        }
    }

    async fn download(&self, attachment: &AttachmentRef) -> Result<Bytes> {
        let mut response = self.http.get(&attachment.url).send().await.map_err(|err| {
            if err.is_timeout() {
                AppError::AttachmentFetch(format!("timed out fetching {}", attachment.filename))
            } else {
                AppError::AttachmentFetch(format!("failed to fetch {}: {err}", attachment.filename))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::AttachmentFetch(format!(
                "http {status} fetching {}",
                attachment.filename
            )));
        }

        let over_budget = |size: u64| {
            AppError::AttachmentFetch(format!(
                "{} is at least {size} bytes, over the upload budget",
                attachment.filename
            ))
        };
        if let Some(length) = response.content_length() {
            if length > self.max_upload_bytes {
                return Err(over_budget(length));
            }
        }

        // Content-Length may be absent or wrong; stop reading once over budget.
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await.map_err(|err| {
            AppError::AttachmentFetch(format!("failed to read {}: {err}", attachment.filename))
        })? {
            let size = u64::try_from(body.len() + chunk.len()).unwrap_or(u64::MAX);
            if size > self.max_upload_bytes {
                return Err(over_budget(size));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }

    /// Build the payload for `item` from attachment outcomes.
    #[must_use]
    pub fn compose(&self, item: &InventoryItem, outcomes: Vec<AttachmentOutcome>) -> Payload {
        let mut payload = Payload::new(
            self.mention_role,
            item.text_content.clone(),
            item.origin_link.clone(),
        )
        .with_footer_label(self.footer_label.clone());
        payload.add_outcomes(outcomes);
        payload
    }

    /// Resolve attachments, compose, and send one post.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the send fails; attachment problems
    /// never surface as errors.
    pub async fn deliver(
        &self,
        item: &InventoryItem,
        attachments: AttachmentSource,
        target: &dyn TargetFeed,
    ) -> Result<DeliveryReport> {
        let outcomes = self.collect_outcomes(&attachments).await;
        let payload = self.compose(item, outcomes);

        let report = DeliveryReport {
            status: if payload.fallback_links.is_empty() {
                DeliveryStatus::Delivered
            } else {
                DeliveryStatus::PartialDelivered
            },
            inline_files: payload.inline_files.len(),
            fallback_links: payload.fallback_links.len(),
        };

        target.send(payload.into_message()).await?;
        Ok(report)
    }
}

fn links_for(refs: &[AttachmentRef]) -> Vec<AttachmentOutcome> {
    refs.iter()
        .map(|attachment| AttachmentOutcome::FallbackLink {
            url: attachment.url.clone(),
        })
        .collect()
}
