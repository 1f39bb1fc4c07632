//! Outbound payload assembly.
//!
//! A [`Payload`] is built once per delivery from the drawn item and the
//! per-attachment outcomes, then rendered into a single [`OutboundMessage`].

use bytes::Bytes;

/// Maximum characters Discord accepts in a message body.
pub const MAX_CONTENT_CHARS: usize = 2000;

const TRUNCATION_MARK: char = '…';

/// A file to be uploaded with an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFile {
    /// File name shown to recipients.
    pub filename: String,
    /// File contents.
    pub bytes: Bytes,
}

/// Result of handling one attachment during delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentOutcome {
    /// Bytes fetched and ready to upload inline.
    Downloaded(OutboundFile),
    /// Not uploaded; the URL is listed in the message text instead.
    FallbackLink {
        /// URL to list.
        url: String,
    },
}

/// Message handed to a [`TargetFeed`](crate::feed::TargetFeed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Rendered text body.
    pub content: String,
    /// Files to upload inline.
    pub files: Vec<OutboundFile>,
    /// The only role allowed to be pinged; `None` suppresses all mentions.
    pub mention_role: Option<u64>,
}

impl OutboundMessage {
    /// A single-file message with no text and no mentions.
    #[must_use]
    pub fn file_only(file: OutboundFile) -> Self {
        Self {
            content: String::new(),
            files: vec![file],
            mention_role: None,
        }
    }
}

/// Structured contents of one daily post before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Role pinged at the top of the post.
    pub mention_role: u64,
    /// Item text; omitted when empty.
    pub text_body: String,
    /// Files uploaded inline.
    pub inline_files: Vec<OutboundFile>,
    /// URLs listed in place of attachments that were not uploaded.
    pub fallback_links: Vec<String>,
    /// Optional label line above the origin link.
    pub footer_label: Option<String>,
    /// Permalink back to the origin record.
    pub origin_link: String,
}

impl Payload {
    /// Start a payload with no attachments.
    #[must_use]
    pub fn new(mention_role: u64, text_body: impl Into<String>, origin_link: impl Into<String>) -> Self {
        Self {
            mention_role,
            text_body: text_body.into(),
            inline_files: Vec::new(),
            fallback_links: Vec::new(),
            footer_label: None,
            origin_link: origin_link.into(),
        }
    }

    /// Attach a footer label.
    #[must_use]
    pub fn with_footer_label(mut self, label: Option<String>) -> Self {
        self.footer_label = label.filter(|l| !l.trim().is_empty());
        self
    }

    /// Sort attachment outcomes into inline files and fallback links.
    pub fn add_outcomes(&mut self, outcomes: impl IntoIterator<Item = AttachmentOutcome>) {
        for outcome in outcomes {
            match outcome {
                AttachmentOutcome::Downloaded(file) => self.inline_files.push(file),
                AttachmentOutcome::FallbackLink { url } => self.fallback_links.push(url),
            }
        }
    }

    /// Role mention marker.
    #[must_use]
    pub fn mention_prefix(&self) -> String {
        format!("<@&{}>", self.mention_role)
    }

    fn footer(&self) -> String {
        match &self.footer_label {
            Some(label) => format!("\n\n{label}\n{}", self.origin_link),
            None => format!("\n\n{}", self.origin_link),
        }
    }

    /// Render the message text.
    ///
    /// Layout: mention, text (if any), one line per fallback link, a blank
    /// line, then the footer. The result never exceeds [`MAX_CONTENT_CHARS`]:
    /// the item text is shortened first, and when the links alone do not fit
    /// the text is dropped and the trailing links collapse into a
    /// `(+N more)` line. Mention and footer are always kept whole.
    #[must_use]
    pub fn render_content(&self) -> String {
        let head = self.mention_prefix();
        let footer = self.footer();
        let available =
            MAX_CONTENT_CHARS.saturating_sub(head.chars().count() + footer.chars().count());

        let links = fit_links(&self.fallback_links, available);
        let room = available.saturating_sub(links.chars().count());

        // The text needs its separating newline plus at least one char.
        let text = if self.text_body.is_empty() || room < 2 {
            String::new()
        } else {
            format!("\n{}", truncate_chars(&self.text_body, room - 1))
        };

        format!("{head}{text}{links}{footer}")
    }

    /// Render into a sendable message, consuming the payload.
    #[must_use]
    pub fn into_message(self) -> OutboundMessage {
        let content = self.render_content();
        OutboundMessage {
            content,
            files: self.inline_files,
            mention_role: Some(self.mention_role),
        }
    }
}

fn omitted_line(count: usize) -> String {
    format!("\n(+{count} more)")
}

/// Link lines fitting in `available` chars, with an omission marker when
/// some had to be left out.
fn fit_links(urls: &[String], available: usize) -> String {
    let lines: Vec<String> = urls.iter().map(|url| format!("\n{url}")).collect();
    let total: usize = lines.iter().map(|line| line.chars().count()).sum();
    if total <= available {
        return lines.concat();
    }

    // Reserve room for the widest possible marker.
    let budget = available.saturating_sub(omitted_line(urls.len()).chars().count());
    let mut out = String::new();
    let mut used = 0;
    let mut shown = 0;
    for line in &lines {
        let len = line.chars().count();
        if used + len > budget {
            break;
        }
        out.push_str(line);
        used += len;
        shown += 1;
    }
    out.push_str(&omitted_line(urls.len() - shown));
    out
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    if max == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max - 1).collect();
    out.push(TRUNCATION_MARK);
    out
}
