//! Target channel writer backed by the Discord REST API.

use std::sync::Arc;
use std::time::Duration;

use serenity::all::{ChannelId, CreateAllowedMentions, CreateAttachment, CreateMessage, RoleId};
use serenity::http::Http;
use tracing::info;

use crate::feed::{FeedFuture, TargetFeed};
use crate::models::payload::OutboundMessage;
use crate::{AppError, Result};

/// Posts messages, with optional file uploads, to one channel.
pub struct DiscordTarget {
    http: Arc<Http>,
    channel_id: ChannelId,
    send_timeout: Duration,
}

impl DiscordTarget {
    /// Construct a writer for `channel_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `channel_id` is zero.
    pub fn new(http: Arc<Http>, channel_id: u64, send_timeout: Duration) -> Result<Self> {
        if channel_id == 0 {
            return Err(AppError::Config("target channel id must be non-zero".into()));
        }
        Ok(Self {
            http,
            channel_id: ChannelId::new(channel_id),
            send_timeout,
        })
    }
}

fn build_request(message: OutboundMessage) -> CreateMessage {
    // Only the configured role may be pinged; users and @everyone never are.
    let mentions = CreateAllowedMentions::new().roles(
        message
            .mention_role
            .filter(|id| *id != 0)
            .map(RoleId::new),
    );

    let mut request = CreateMessage::new().allowed_mentions(mentions);
    if !message.content.is_empty() {
        request = request.content(message.content);
    }
    if !message.files.is_empty() {
        request = request.add_files(
            message
                .files
                .into_iter()
                .map(|file| CreateAttachment::bytes(file.bytes.to_vec(), file.filename)),
        );
    }
    request
}

impl TargetFeed for DiscordTarget {
    fn send(&self, message: OutboundMessage) -> FeedFuture<'_, ()> {
        Box::pin(async move {
            let file_count = message.files.len();
            let request = build_request(message);
            let sent = tokio::time::timeout(
                self.send_timeout,
                self.channel_id.send_message(self.http.as_ref(), request),
            )
            .await
            .map_err(|_| AppError::Transport("send timed out".into()))?
            .map_err(|err| AppError::Transport(format!("failed to send message: {err}")))?;

            info!(
                channel_id = self.channel_id.get(),
                message_id = sent.id.get(),
                files = file_count,
                "message sent"
            );
            Ok(())
        })
    }
}
