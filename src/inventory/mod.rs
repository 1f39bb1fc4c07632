//! In-memory inventory of items that have not been posted yet.
//!
//! The inventory lives only for the process lifetime. It is filled once by
//! the [`loader`] and drained one item per day by the relay cycle; an item
//! leaves the inventory when it is drawn, before any delivery attempt.

pub mod loader;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;

use crate::models::item::InventoryItem;

/// Inventory handle shared between the loader and the scheduler.
pub type SharedInventory = Arc<Mutex<Inventory>>;

/// Unordered set of undelivered items with draw-without-replacement.
pub struct Inventory {
    items: Vec<InventoryItem>,
    rng: StdRng,
}

impl Default for Inventory {
    fn default() -> Self {
        Self::new()
    }
}

impl Inventory {
    /// Empty inventory seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Empty inventory using the given RNG (fixed seeds in tests).
    #[must_use]
    pub fn with_rng(rng: StdRng) -> Self {
        Self {
            items: Vec::new(),
            rng,
        }
    }

    /// Wrap into a [`SharedInventory`].
    #[must_use]
    pub fn shared(self) -> SharedInventory {
        Arc::new(Mutex::new(self))
    }

    /// Replace the whole contents in one step.
    pub fn replace_all(&mut self, items: Vec<InventoryItem>) {
        self.items = items;
    }

    /// Remove and return one item chosen uniformly at random.
    ///
    /// Returns `None` when empty; the inventory is left unchanged.
    pub fn draw_one(&mut self) -> Option<InventoryItem> {
        if self.items.is_empty() {
            return None;
        }
        let index = self.rng.gen_range(0..self.items.len());
        Some(self.items.swap_remove(index))
    }

    /// Number of items left.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is left to deliver.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether an item for `source_message_id` is still present.
    #[must_use]
    pub fn contains(&self, source_message_id: u64) -> bool {
        self.items
            .iter()
            .any(|item| item.source_message_id == source_message_id)
    }
}
