//! Feed capabilities consumed by the relay core.
//!
//! [`SourceFeed`] is the read side (channel history and single-record
//! lookups), [`TargetFeed`] the write side. The Discord implementations live
//! in [`crate::discord`]; tests substitute in-memory fakes.

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::BoxStream;

use crate::models::item::Record;
use crate::models::payload::OutboundMessage;
use crate::Result;

/// Boxed future returned by feed trait methods.
pub type FeedFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Read-only access to the channel whose history feeds the inventory.
pub trait SourceFeed: Send + Sync {
    /// Verify the channel exists and is a plain text channel.
    ///
    /// Must be called once before [`history`](Self::history) or
    /// [`fetch_record`](Self::fetch_record).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::SourceUnavailable`](crate::AppError::SourceUnavailable)
    /// if the channel is missing, inaccessible, or of the wrong type.
    fn open(&self) -> FeedFuture<'_, ()>;

    /// Lazily stream the full channel history, oldest record first.
    ///
    /// The stream is finite and not restartable mid-iteration.
    fn history(&self) -> BoxStream<'_, Result<Record>>;

    /// Fetch the current authoritative version of one record.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::OriginGone`](crate::AppError::OriginGone) if the
    /// record no longer exists or cannot be read.
    fn fetch_record(&self, record_id: u64) -> FeedFuture<'_, Record>;
}

/// Write access to the channel receiving posts.
pub trait TargetFeed: Send + Sync {
    /// Send one message.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`](crate::AppError::Transport) if the
    /// send fails or times out.
    fn send(&self, message: OutboundMessage) -> FeedFuture<'_, ()>;
}
