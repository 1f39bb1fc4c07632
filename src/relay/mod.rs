//! The daily selection-and-delivery cycle.
//!
//! Each cycle draws one item from the inventory, re-resolves its
//! attachments when it has any, and hands it to the delivery pipeline. The
//! item is consumed at draw time: no failure later in the cycle puts it back.

pub mod delivery;
pub mod resolver;

use std::sync::Arc;

use tracing::{error, info, info_span, warn, Instrument};

use crate::config::OriginGonePolicy;
use crate::feed::{SourceFeed, TargetFeed};
use crate::inventory::SharedInventory;
use crate::models::item::InventoryItem;

use self::delivery::{AttachmentSource, DeliveryPipeline, DeliveryReport};

/// How one cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The inventory had nothing left; nothing was sent.
    Empty,
    /// A post was sent.
    Delivered {
        /// Origin record of the posted item.
        source_message_id: u64,
        /// What the post contained.
        report: DeliveryReport,
    },
    /// The item was consumed but deliberately not posted.
    Skipped {
        /// Origin record of the consumed item.
        source_message_id: u64,
        /// Why nothing was sent.
        reason: String,
    },
    /// The item was consumed and the send failed.
    Failed {
        /// Origin record of the consumed item.
        source_message_id: u64,
        /// Send error text.
        error: String,
    },
}

/// Owns everything a cycle touches.
pub struct Relay {
    inventory: SharedInventory,
    source: Arc<dyn SourceFeed>,
    target: Arc<dyn TargetFeed>,
    pipeline: DeliveryPipeline,
    origin_gone_policy: OriginGonePolicy,
}

impl Relay {
    /// Assemble a relay from its collaborators.
    #[must_use]
    pub fn new(
        inventory: SharedInventory,
        source: Arc<dyn SourceFeed>,
        target: Arc<dyn TargetFeed>,
        pipeline: DeliveryPipeline,
        origin_gone_policy: OriginGonePolicy,
    ) -> Self {
        Self {
            inventory,
            source,
            target,
            pipeline,
            origin_gone_policy,
        }
    }

    /// Run one draw → resolve → deliver cycle.
    ///
    /// Never fails: every error is logged and reported through the
    /// returned [`CycleOutcome`].
    pub async fn run_cycle(&self) -> CycleOutcome {
        let (drawn, remaining) = {
            let mut inventory = self.inventory.lock().await;
            let drawn = inventory.draw_one();
            (drawn, inventory.len())
        };

        let Some(item) = drawn else {
            info!("inventory empty; nothing to post");
            return CycleOutcome::Empty;
        };

        let id = item.source_message_id;
        self.deliver_item(item, remaining)
            .instrument(info_span!("relay_cycle", source_message_id = id))
            .await
    }

    async fn deliver_item(&self, item: InventoryItem, remaining: usize) -> CycleOutcome {
        let source_message_id = item.source_message_id;
        info!(
            remaining,
            attachments = item.attachment_refs.len(),
            "item drawn"
        );

        let attachments = match self.attachments_for(&item).await {
            Ok(attachments) => attachments,
            Err(reason) => {
                warn!(%reason, "item consumed without posting");
                return CycleOutcome::Skipped {
                    source_message_id,
                    reason,
                };
            }
        };

        match self
            .pipeline
            .deliver(&item, attachments, self.target.as_ref())
            .await
        {
            Ok(report) => {
                info!(
                    status = ?report.status,
                    inline_files = report.inline_files,
                    fallback_links = report.fallback_links,
                    "daily post delivered"
                );
                CycleOutcome::Delivered {
                    source_message_id,
                    report,
                }
            }
            Err(err) => {
                error!(%err, "daily post failed; item stays consumed");
                CycleOutcome::Failed {
                    source_message_id,
                    error: err.to_string(),
                }
            }
        }
    }

    /// Pick the attachment list for `item`, applying the origin-gone policy.
    ///
    /// `Err` carries the reason when the policy says not to post at all.
    async fn attachments_for(
        &self,
        item: &InventoryItem,
    ) -> std::result::Result<AttachmentSource, String> {
        // Text-only items have nothing to refresh.
        if !item.has_attachments() {
            return Ok(AttachmentSource::none());
        }

        let err = match resolver::resolve(self.source.as_ref(), item).await {
            Ok(fresh) => return Ok(AttachmentSource::Fresh(fresh)),
            Err(err) => err,
        };
        warn!(%err, policy = ?self.origin_gone_policy, "origin record unavailable");

        match self.origin_gone_policy {
            OriginGonePolicy::StaleLinks => {
                Ok(AttachmentSource::Stale(item.attachment_refs.clone()))
            }
            OriginGonePolicy::DropAttachments if !item.text_content.is_empty() => {
                Ok(AttachmentSource::none())
            }
            OriginGonePolicy::DropAttachments => {
                Err(format!("{err}; no text to send without attachments"))
            }
            OriginGonePolicy::Skip => Err(err.to_string()),
        }
    }
}
