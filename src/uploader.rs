//! Bulk upload of a local directory into a channel, one file per message.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytes::Bytes;
use tracing::{error, info, warn};

use crate::feed::TargetFeed;
use crate::models::media::has_extension;
use crate::models::payload::{OutboundFile, OutboundMessage};
use crate::{AppError, Result};

/// Settings for one upload run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSettings {
    /// Directory to read (not recursive).
    pub dir: PathBuf,
    /// Extensions to include, without the leading dot.
    pub extensions: Vec<String>,
    /// Files larger than this are skipped.
    pub max_upload_bytes: u64,
    /// Pause after each attempted file.
    pub delay: Duration,
}

/// Counters reported after an upload run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Files sent successfully.
    pub sent: usize,
    /// Files skipped for size.
    pub skipped: usize,
    /// Files whose read or send failed.
    pub failed: usize,
}

/// Regular files in `dir` with a matching extension, sorted by file name.
///
/// # Errors
///
/// Returns `AppError::Io` if `dir` is not a readable directory.
pub fn matching_files(dir: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(AppError::Io(format!("directory not found: {}", dir.display())));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| has_extension(name, extensions))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Send every matching file in `settings.dir` as its own message.
///
/// Oversize files are skipped and individual failures are logged; the run
/// continues with the next file either way.
///
/// # Errors
///
/// Returns `AppError::Io` only if the directory cannot be listed.
pub async fn upload_directory(
    target: &dyn TargetFeed,
    settings: &UploadSettings,
) -> Result<UploadSummary> {
    let files = matching_files(&settings.dir, &settings.extensions)?;
    if files.is_empty() {
        warn!(dir = %settings.dir.display(), "no matching files to upload");
        return Ok(UploadSummary::default());
    }
    info!(count = files.len(), dir = %settings.dir.display(), "upload started");

    let mut summary = UploadSummary::default();
    for path in files {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_owned();

        match upload_one(target, &path, &filename, settings.max_upload_bytes).await {
            Ok(true) => {
                info!(%filename, "uploaded");
                summary.sent += 1;
            }
            Ok(false) => summary.skipped += 1,
            Err(err) => {
                error!(%filename, %err, "upload failed");
                summary.failed += 1;
            }
        }

        tokio::time::sleep(settings.delay).await;
    }

    info!(
        sent = summary.sent,
        skipped = summary.skipped,
        failed = summary.failed,
        "upload finished"
    );
    Ok(summary)
}

/// Returns `Ok(false)` when the file was skipped for size.
async fn upload_one(
    target: &dyn TargetFeed,
    path: &Path,
    filename: &str,
    max_upload_bytes: u64,
) -> Result<bool> {
    let size = tokio::fs::metadata(path).await?.len();
    if size > max_upload_bytes {
        warn!(filename, size, budget = max_upload_bytes, "skipping oversize file");
        return Ok(false);
    }

    let bytes = Bytes::from(tokio::fs::read(path).await?);
    target
        .send(OutboundMessage::file_only(OutboundFile {
            filename: filename.to_owned(),
            bytes,
        }))
        .await?;
    Ok(true)
}
