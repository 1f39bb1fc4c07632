//! Discord REST implementations of the feed capabilities.

pub mod source;
pub mod target;

use std::sync::Arc;

use serenity::http::Http;

pub use source::DiscordSource;
pub use target::DiscordTarget;

/// Build a shared REST client for the bot token.
#[must_use]
pub fn http_client(token: &str) -> Arc<Http> {
    Arc::new(Http::new(token))
}

/// Permalink for a message in a guild channel.
///
/// Uses `@me` when the guild is unknown, matching Discord's DM link form.
#[must_use]
pub fn permalink(guild_id: Option<u64>, channel_id: u64, message_id: u64) -> String {
    match guild_id {
        Some(guild) => format!("https://discord.com/channels/{guild}/{channel_id}/{message_id}"),
        None => format!("https://discord.com/channels/@me/{channel_id}/{message_id}"),
    }
}
