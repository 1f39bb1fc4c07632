#![forbid(unsafe_code)]

//! `daily-relay-upload`: one-off bulk uploader.
//!
//! Sends every matching file in a local directory to a channel, one file
//! per message, with a fixed pause between files. Typically used to seed
//! the source channel the relay later draws from.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use daily_relay::config::GlobalConfig;
use daily_relay::discord::{self, DiscordTarget};
use daily_relay::models::media::DEFAULT_UPLOAD_EXTENSIONS;
use daily_relay::uploader::{self, UploadSettings};
use daily_relay::{AppError, Result};

#[derive(Debug, Parser)]
#[command(
    name = "daily-relay-upload",
    about = "Upload a directory of media files to a Discord channel",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Directory holding the files to upload.
    #[arg(long, default_value = "multimedia")]
    dir: PathBuf,

    /// Destination channel; defaults to the configured source channel.
    #[arg(long)]
    channel: Option<u64>,

    /// Comma-separated extensions to include.
    #[arg(long, value_delimiter = ',')]
    extensions: Vec<String>,

    /// Seconds to wait after each file.
    #[arg(long, default_value_t = 1.0)]
    delay_seconds: f64,

    /// Skip files larger than this; defaults to `delivery.max_upload_bytes`.
    #[arg(long)]
    max_upload_bytes: Option<u64>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;

    let delay = Duration::try_from_secs_f64(args.delay_seconds)
        .map_err(|err| AppError::Config(format!("invalid --delay-seconds: {err}")))?;
    let extensions = if args.extensions.is_empty() {
        DEFAULT_UPLOAD_EXTENSIONS
            .iter()
            .map(|ext| (*ext).to_owned())
            .collect()
    } else {
        args.extensions
    };
    let channel = args.channel.unwrap_or(config.discord.source_channel_id);

    let settings = UploadSettings {
        dir: args.dir,
        extensions,
        max_upload_bytes: args
            .max_upload_bytes
            .unwrap_or(config.delivery.max_upload_bytes),
        delay,
    };

    let http = discord::http_client(&config.discord.token);
    let target = DiscordTarget::new(http, channel, config.delivery.send_timeout())?;

    info!(channel, dir = %settings.dir.display(), "uploading");
    let summary = uploader::upload_directory(&target, &settings).await?;
    println!(
        "sent {}, skipped {}, failed {}",
        summary.sent, summary.skipped, summary.failed
    );
    Ok(())
}
