//! Source channel reader backed by the Discord REST API.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serenity::all::{Channel, ChannelId, ChannelType, GetMessages, Message, MessageId};
use serenity::http::Http;
use tracing::{debug, info};

use crate::feed::{FeedFuture, SourceFeed};
use crate::models::item::{AttachmentRef, Record};
use crate::{AppError, Result};

/// Maximum messages Discord returns per history page.
const PAGE_SIZE: u8 = 100;

/// Reads history and individual messages from one text channel.
pub struct DiscordSource {
    http: Arc<Http>,
    channel_id: ChannelId,
    request_timeout: Duration,
    guild_id: OnceLock<u64>,
}

impl DiscordSource {
    /// Construct a reader for `channel_id`. Call [`SourceFeed::open`] before use.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `channel_id` is zero.
    pub fn new(http: Arc<Http>, channel_id: u64, request_timeout: Duration) -> Result<Self> {
        if channel_id == 0 {
            return Err(AppError::Config("source channel id must be non-zero".into()));
        }
        Ok(Self {
            http,
            channel_id: ChannelId::new(channel_id),
            request_timeout,
            guild_id: OnceLock::new(),
        })
    }

    fn to_record(&self, message: &Message) -> Record {
        Record {
            id: message.id.get(),
            text: message.content.clone(),
            attachments: message
                .attachments
                .iter()
                .map(|a| AttachmentRef::new(a.url.clone(), u64::from(a.size), a.filename.clone()))
                .collect(),
            permalink: super::permalink(
                self.guild_id.get().copied(),
                self.channel_id.get(),
                message.id.get(),
            ),
        }
    }

    async fn fetch_page(&self, after: MessageId) -> Result<Vec<Message>> {
        let request = self
            .channel_id
            .messages(self.http.as_ref(), GetMessages::new().after(after).limit(PAGE_SIZE));
        let mut page = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| AppError::SourceUnavailable("history page request timed out".into()))?
            .map_err(|err| AppError::SourceUnavailable(format!("failed to read history: {err}")))?;
        // Discord returns newest first even when paging forward.
        page.sort_by_key(|message| message.id);
        Ok(page)
    }

    /// One step of the forward history walk: the records after `cursor`
    /// and the cursor for the following page (`None` once exhausted).
    async fn next_page(
        &self,
        cursor: Option<MessageId>,
    ) -> Result<Option<(Vec<Record>, Option<MessageId>)>> {
        let Some(after) = cursor else {
            return Ok(None);
        };
        let page = self.fetch_page(after).await?;
        if page.is_empty() {
            return Ok(None);
        }
        debug!(count = page.len(), after = after.get(), "history page fetched");

        let next = if page.len() < usize::from(PAGE_SIZE) {
            None
        } else {
            page.last().map(|message| message.id)
        };
        let records = page.iter().map(|m| self.to_record(m)).collect();
        Ok(Some((records, next)))
    }
}

impl SourceFeed for DiscordSource {
    fn open(&self) -> FeedFuture<'_, ()> {
        Box::pin(async move {
            let channel = tokio::time::timeout(
                self.request_timeout,
                self.channel_id.to_channel(self.http.as_ref()),
            )
            .await
            .map_err(|_| AppError::SourceUnavailable("channel lookup timed out".into()))?
            .map_err(|err| {
                AppError::SourceUnavailable(format!("channel {} not found: {err}", self.channel_id))
            })?;

            let Channel::Guild(guild_channel) = channel else {
                return Err(AppError::SourceUnavailable(format!(
                    "channel {} is not a guild text channel",
                    self.channel_id
                )));
            };

            if guild_channel.kind != ChannelType::Text {
                return Err(AppError::SourceUnavailable(format!(
                    "channel {} has type {:?}, expected text",
                    self.channel_id, guild_channel.kind
                )));
            }

            let _ = self.guild_id.set(guild_channel.guild_id.get());
            info!(
                channel_id = self.channel_id.get(),
                name = %guild_channel.name,
                "source channel opened"
            );
            Ok(())
        })
    }

    fn history(&self) -> BoxStream<'_, Result<Record>> {
        // Message ids are snowflakes; anything is "after" 1.
        stream::try_unfold(Some(MessageId::new(1)), move |cursor| self.next_page(cursor))
            .map_ok(|records| stream::iter(records.into_iter().map(Ok::<Record, AppError>)))
            .try_flatten()
            .boxed()
    }

    fn fetch_record(&self, record_id: u64) -> FeedFuture<'_, Record> {
        Box::pin(async move {
            if record_id == 0 {
                return Err(AppError::OriginGone("record id 0 is invalid".into()));
            }
            let request = self
                .channel_id
                .message(self.http.as_ref(), MessageId::new(record_id));
            let message = tokio::time::timeout(self.request_timeout, request)
                .await
                .map_err(|_| AppError::OriginGone(format!("fetch of {record_id} timed out")))?
                .map_err(|err| AppError::OriginGone(format!("message {record_id}: {err}")))?;
            Ok(self.to_record(&message))
        })
    }
}
