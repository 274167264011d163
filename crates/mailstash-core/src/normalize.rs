//! Raw message normalization.
//!
//! Turns raw RFC 822 blobs into the storage models, at one of three
//! depths matching how much of the message was fetched.

use chrono::{DateTime, Utc};
use mailstash_mime::{Message, Part};

use crate::adapter::Depth;
use crate::error::Result;
use crate::store::{AttachmentInfo, MessageContent, MessageId, MessageMetadata};

/// A normalized message ready for storage.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    /// Header metadata, always produced.
    pub meta: MessageMetadata,
    /// Full content, produced at [`Depth::Full`] only.
    pub content: Option<MessageContent>,
    /// Short display preview, produced when any body text was fetched.
    pub preview: Option<String>,
}

/// Converts raw message blobs into storage models.
#[derive(Debug, Clone)]
pub struct Normalizer {
    preview_len: usize,
}

impl Normalizer {
    /// Creates a normalizer with the given preview length in characters.
    #[must_use]
    pub fn new(preview_len: usize) -> Self {
        Self { preview_len }
    }

    /// Normalizes a raw blob fetched at the given depth.
    ///
    /// Header decoding is lenient and never fails; the only error source is
    /// a blob with no parseable header section at all.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob cannot be parsed as a message.
    pub fn normalize(
        &self,
        raw: &[u8],
        folder: &str,
        id: MessageId,
        depth: Depth,
    ) -> Result<NormalizedMessage> {
        let message = Message::parse(raw)?;

        let date = message.date();
        let timestamp = DateTime::parse_from_rfc2822(&date)
            .map_or_else(|_| Utc::now().timestamp(), |d| d.timestamp());

        let has_attachments = match depth {
            // Header fetches carry no part structure to inspect
            Depth::Headers => false,
            Depth::Light | Depth::Full => message.attachment_parts().next().is_some(),
        };

        let meta = MessageMetadata {
            id: id.clone(),
            folder: folder.to_string(),
            subject: message.subject(),
            from: message.from(),
            to: message.to(),
            cc: message.cc(),
            bcc: message.bcc(),
            date,
            timestamp,
            message_id: message.message_id(),
            account: None,
            has_attachments,
            cached_at: Utc::now(),
        };

        let body_text = || {
            message.text_part().map(Part::text).map_or_else(
                || {
                    message
                        .html_part()
                        .map(|p| strip_html(&p.text()))
                        .unwrap_or_default()
                },
                |text| text,
            )
        };

        let (content, preview) = match depth {
            Depth::Headers => (None, None),
            Depth::Light => (None, Some(preview_text(&body_text(), self.preview_len))),
            Depth::Full => {
                let body = message.text_part().map(Part::text).unwrap_or_default();
                let html_body = message.html_part().map(Part::text);
                let attachments = message
                    .attachment_parts()
                    .map(|part| AttachmentInfo {
                        filename: part.filename().unwrap_or_default(),
                        content_type: part.content_type().to_string(),
                        size: part.decode_body().len() as u64,
                    })
                    .collect();

                let preview_source = if body.is_empty() {
                    html_body.as_deref().map(strip_html).unwrap_or_default()
                } else {
                    body.clone()
                };

                (
                    Some(MessageContent {
                        id,
                        folder: folder.to_string(),
                        body,
                        html_body,
                        attachments,
                        cached_at: Utc::now(),
                    }),
                    Some(preview_text(&preview_source, self.preview_len)),
                )
            }
        };

        Ok(NormalizedMessage {
            meta,
            content,
            preview,
        })
    }
}

/// Builds a display preview: control characters removed, whitespace
/// collapsed, capped at `max_chars` characters.
#[must_use]
pub fn preview_text(text: &str, max_chars: usize) -> String {
    let cleaned = text
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect::<String>();

    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(max_chars)
        .collect()
}

/// Strips HTML tags and decodes the handful of entities common in mail
/// bodies, leaving plain text.
#[must_use]
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                if in_tag {
                    in_tag = false;
                    text.push(' ');
                } else {
                    text.push(c);
                }
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    text.replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
}
