//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or credential failure.
    Config(String),
    /// Source channel missing, inaccessible, or not a text channel.
    SourceUnavailable(String),
    /// Origin record vanished between load and delivery.
    OriginGone(String),
    /// A single attachment could not be downloaded.
    AttachmentFetch(String),
    /// Outbound send to the target channel failed or timed out.
    Transport(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::SourceUnavailable(msg) => write!(f, "source unavailable: {msg}"),
            Self::OriginGone(msg) => write!(f, "origin gone: {msg}"),
            Self::AttachmentFetch(msg) => write!(f, "attachment fetch: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
