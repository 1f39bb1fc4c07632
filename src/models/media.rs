//! Media extension allow-list shared by the loader, resolver, and uploader.

/// File extensions eligible for relay, compared case-insensitively.
pub const ALLOWED_MEDIA_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "mp3", "wav", "mp4", "mov", "m4a",
];

/// Extensions the bulk uploader sends by default.
pub const DEFAULT_UPLOAD_EXTENSIONS: &[&str] = &["mp3", "wav"];

/// Whether `filename` ends in `.ext` for one of `extensions`
/// (case-insensitive). A bare dot-file such as `.mp3` matches.
#[must_use]
pub fn has_extension<S: AsRef<str>>(filename: &str, extensions: &[S]) -> bool {
    let name = filename.to_ascii_lowercase();
    extensions.iter().any(|allowed| {
        let ext = allowed.as_ref().trim_start_matches('.');
        !ext.is_empty() && name.ends_with(&format!(".{}", ext.to_ascii_lowercase()))
    })
}

/// Whether `filename` is on the relay media allow-list.
#[must_use]
pub fn is_allowed_media(filename: &str) -> bool {
    has_extension(filename, ALLOWED_MEDIA_EXTENSIONS)
}
