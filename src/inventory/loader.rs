//! One-time history scan that fills the inventory.

use futures_util::StreamExt;
use tracing::{info, info_span, Instrument};

use super::SharedInventory;
use crate::config::LoaderConfig;
use crate::feed::SourceFeed;
use crate::models::item::InventoryItem;
use crate::Result;

/// Counters reported after a completed scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Records read from the source history.
    pub records_scanned: u64,
    /// Records that produced an inventory item.
    pub items_cached: usize,
}

/// Scan the full source history and return the eligible items.
///
/// Opens the source first. Every `progress_interval` records a progress
/// event is logged and the task sleeps for `pace` so the scan does not
/// monopolize the runtime.
///
/// # Errors
///
/// Returns `AppError::SourceUnavailable` if the source cannot be opened,
/// or the first error raised while reading history.
pub async fn scan_history(
    source: &dyn SourceFeed,
    settings: &LoaderConfig,
) -> Result<(Vec<InventoryItem>, LoadSummary)> {
    source.open().await?;
    info!("history scan started");

    let mut history = source.history();
    let mut items = Vec::new();
    let mut records_scanned: u64 = 0;

    while let Some(record) = history.next().await {
        let record = record?;
        records_scanned += 1;

        if let Some(item) = InventoryItem::from_record(&record) {
            items.push(item);
        }

        if records_scanned % settings.progress_interval == 0 {
            info!(
                records_scanned,
                items_cached = items.len(),
                "history scan progress"
            );
            tokio::time::sleep(settings.pace()).await;
        }
    }

    let summary = LoadSummary {
        records_scanned,
        items_cached: items.len(),
    };
    info!(
        records_scanned,
        items_cached = summary.items_cached,
        "history scan completed"
    );
    Ok((items, summary))
}

/// Scan the source and publish the result into `inventory` atomically.
///
/// Nothing is published when the scan fails; readers never observe a
/// partially built inventory.
///
/// # Errors
///
/// Propagates any error from [`scan_history`].
pub async fn load_inventory(
    source: &dyn SourceFeed,
    inventory: &SharedInventory,
    settings: &LoaderConfig,
) -> Result<LoadSummary> {
    let (items, summary) = scan_history(source, settings)
        .instrument(info_span!("inventory_load"))
        .await?;
    inventory.lock().await.replace_all(items);
    Ok(summary)
}
