//! Raw MIME message parsing.

use crate::content_type::ContentType;
use crate::encoding::{decode_base64, decode_charset, decode_encoded_words, decode_quoted_printable};
use crate::error::Result;
use crate::header::Headers;
use std::fmt;

/// Maximum multipart nesting depth accepted by the parser.
const MAX_NESTING: usize = 8;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    SevenBit,
    /// 8-bit binary.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit, // Default (includes "7bit")
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SevenBit => write!(f, "7bit"),
            Self::EightBit => write!(f, "8bit"),
            Self::Base64 => write!(f, "base64"),
            Self::QuotedPrintable => write!(f, "quoted-printable"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

/// A leaf MIME part (no nested multiparts; the parser flattens those).
#[derive(Debug, Clone)]
pub struct Part {
    /// Part headers.
    pub headers: Headers,
    /// Part body (raw, still transfer-encoded).
    pub body: Vec<u8>,
}

impl Part {
    /// Creates a new part.
    #[must_use]
    pub const fn new(headers: Headers, body: Vec<u8>) -> Self {
        Self { headers, body }
    }

    /// Gets the content type, defaulting to text/plain.
    #[must_use]
    pub fn content_type(&self) -> ContentType {
        self.headers
            .get("content-type")
            .and_then(|value| ContentType::parse(value).ok())
            .unwrap_or_else(ContentType::text_plain)
    }

    /// Gets the transfer encoding.
    #[must_use]
    pub fn transfer_encoding(&self) -> TransferEncoding {
        self.headers
            .get("content-transfer-encoding")
            .map_or(TransferEncoding::SevenBit, TransferEncoding::parse)
    }

    /// Decodes the body according to the transfer encoding.
    ///
    /// Lenient: undecodable payloads fall back to the raw bytes.
    #[must_use]
    pub fn decode_body(&self) -> Vec<u8> {
        match self.transfer_encoding() {
            TransferEncoding::Base64 => {
                let body_str = String::from_utf8_lossy(&self.body);
                let cleaned: String = body_str.chars().filter(|c| !c.is_whitespace()).collect();
                decode_base64(&cleaned).unwrap_or_else(|_| self.body.clone())
            }
            TransferEncoding::QuotedPrintable => {
                let body_str = String::from_utf8_lossy(&self.body);
                decode_quoted_printable(&body_str).unwrap_or_else(|_| self.body.clone())
            }
            _ => self.body.clone(),
        }
    }

    /// Gets the decoded body as text, using the part's charset parameter
    /// with fallback.
    #[must_use]
    pub fn text(&self) -> String {
        let bytes = self.decode_body();
        decode_charset(&bytes, self.content_type().charset())
    }

    /// Whether this part is an attachment: it either carries a filename or
    /// an attachment disposition.
    #[must_use]
    pub fn is_attachment(&self) -> bool {
        if self.filename().is_some() {
            return true;
        }
        self.headers
            .get("content-disposition")
            .is_some_and(|d| d.to_lowercase().contains("attachment"))
    }

    /// Extracts the filename from Content-Disposition or Content-Type,
    /// decoding encoded words.
    #[must_use]
    pub fn filename(&self) -> Option<String> {
        let from_disposition = self
            .headers
            .get("content-disposition")
            .and_then(|d| extract_parameter(d, "filename"));
        let from_type = self
            .headers
            .get("content-type")
            .and_then(|d| extract_parameter(d, "name"));

        from_disposition
            .or(from_type)
            .map(|name| decode_encoded_words(&name))
    }
}

/// A parsed MIME message: top-level headers plus flattened leaf parts.
///
/// Single-part messages yield exactly one part carrying the message's own
/// Content-Type and Content-Transfer-Encoding.
#[derive(Debug, Clone)]
pub struct Message {
    /// Message headers.
    pub headers: Headers,
    /// Flattened leaf parts in document order.
    pub parts: Vec<Part>,
}

impl Message {
    /// Parses a raw message blob.
    ///
    /// Nested multiparts are flattened depth-first into `parts`. Headers
    /// and multipart structure are found at the byte level, so part bodies
    /// keep their original bytes until [`Part::text`] decodes them with the
    /// part's own charset.
    ///
    /// # Errors
    ///
    /// Returns an error only when the header block is unparseable; body
    /// decoding problems degrade to best-effort text instead of failing.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let (header_bytes, body) = split_headers_body(raw);
        let headers = Headers::parse(&String::from_utf8_lossy(header_bytes))?;

        let mut parts = Vec::new();
        collect_parts(&headers, body, 0, &mut parts);

        Ok(Self { headers, parts })
    }

    /// Decoded Subject header.
    #[must_use]
    pub fn subject(&self) -> String {
        self.headers.get_decoded("subject")
    }

    /// Decoded From header.
    #[must_use]
    pub fn from(&self) -> String {
        self.headers.get_decoded("from")
    }

    /// Decoded To header.
    #[must_use]
    pub fn to(&self) -> String {
        self.headers.get_decoded("to")
    }

    /// Decoded Cc header.
    #[must_use]
    pub fn cc(&self) -> String {
        self.headers.get_decoded("cc")
    }

    /// Decoded Bcc header.
    #[must_use]
    pub fn bcc(&self) -> String {
        self.headers.get_decoded("bcc")
    }

    /// Raw Date header.
    #[must_use]
    pub fn date(&self) -> String {
        self.headers.get("date").unwrap_or_default().to_string()
    }

    /// Raw Message-ID header.
    #[must_use]
    pub fn message_id(&self) -> String {
        self.headers
            .get("message-id")
            .unwrap_or_default()
            .to_string()
    }

    /// First text/plain part that is not an attachment.
    #[must_use]
    pub fn text_part(&self) -> Option<&Part> {
        self.parts
            .iter()
            .find(|p| p.content_type().is("text", "plain") && !p.is_attachment())
    }

    /// First text/html part that is not an attachment.
    #[must_use]
    pub fn html_part(&self) -> Option<&Part> {
        self.parts
            .iter()
            .find(|p| p.content_type().is("text", "html") && !p.is_attachment())
    }

    /// All attachment parts.
    pub fn attachment_parts(&self) -> impl Iterator<Item = &Part> {
        self.parts.iter().filter(|p| p.is_attachment())
    }
}

/// Recursively collects leaf parts, flattening nested multiparts.
fn collect_parts(headers: &Headers, body: &[u8], depth: usize, out: &mut Vec<Part>) {
    let content_type = headers
        .get("content-type")
        .and_then(|value| ContentType::parse(value).ok())
        .unwrap_or_else(ContentType::text_plain);

    if depth < MAX_NESTING
        && content_type.is_multipart()
        && let Some(boundary) = content_type.boundary()
    {
        for section in split_multipart(body, boundary) {
            let (section_headers, section_body) = split_headers_body(section);
            if let Ok(part_headers) = Headers::parse(&String::from_utf8_lossy(section_headers)) {
                collect_parts(&part_headers, section_body, depth + 1, out);
            }
        }
    } else {
        out.push(Part::new(headers.clone(), body.to_vec()));
    }
}

/// Splits a message into headers and body at the first blank line.
fn split_headers_body(message: &[u8]) -> (&[u8], &[u8]) {
    if let Some(idx) = find_bytes(message, b"\r\n\r\n") {
        (&message[..idx], &message[idx + 4..])
    } else if let Some(idx) = find_bytes(message, b"\n\n") {
        (&message[..idx], &message[idx + 2..])
    } else {
        (message, &[])
    }
}

/// Splits a multipart body into sections using the boundary delimiter.
fn split_multipart<'a>(body: &'a [u8], boundary: &str) -> Vec<&'a [u8]> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut sections = Vec::new();

    // Skip the preamble before the first delimiter
    let Some(start) = find_bytes(body, &delimiter) else {
        return sections;
    };
    let mut rest = &body[start + delimiter.len()..];

    loop {
        // "--" right after the delimiter closes the multipart
        if rest.starts_with(b"--") {
            break;
        }
        rest = rest
            .strip_prefix(b"\r\n")
            .or_else(|| rest.strip_prefix(b"\n"))
            .unwrap_or(rest);

        match find_bytes(rest, &delimiter) {
            Some(end) => {
                sections.push(trim_newlines_end(&rest[..end]));
                rest = &rest[end + delimiter.len()..];
            }
            None => {
                // Unterminated multipart: keep the trailing section
                if !rest.iter().all(u8::is_ascii_whitespace) {
                    sections.push(trim_newlines_end(rest));
                }
                break;
            }
        }
    }

    sections
}

/// Finds the first occurrence of `needle` in `haystack`.
fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn trim_newlines_end(mut bytes: &[u8]) -> &[u8] {
    while let Some((&last, head)) = bytes.split_last() {
        if last == b'\r' || last == b'\n' {
            bytes = head;
        } else {
            break;
        }
    }
    bytes
}

/// Extracts a `key=value` or `key="value"` parameter from a header value.
fn extract_parameter(value: &str, key: &str) -> Option<String> {
    let lower = value.to_lowercase();
    let needle = format!("{key}=");
    let idx = lower.find(&needle)?;
    let rest = &value[idx + needle.len()..];

    if let Some(stripped) = rest.strip_prefix('"') {
        let end = stripped.find('"')?;
        Some(stripped[..end].to_string())
    } else {
        let end = rest
            .find(|c: char| c.is_whitespace() || c == ';')
            .unwrap_or(rest.len());
        Some(rest[..end].to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const MULTIPART: &str = concat!(
        "From: Ana <ana@example.com>\r\n",
        "To: tomas@example.com\r\n",
        "Subject: =?utf-8?Q?Renovaci=C3=B3n?=\r\n",
        "Date: Fri, 24 Jan 2025 10:00:00 +0000\r\n",
        "Content-Type: multipart/mixed; boundary=outer\r\n",
        "\r\n",
        "--outer\r\n",
        "Content-Type: multipart/alternative; boundary=inner\r\n",
        "\r\n",
        "--inner\r\n",
        "Content-Type: text/plain; charset=utf-8\r\n",
        "\r\n",
        "plain body\r\n",
        "--inner\r\n",
        "Content-Type: text/html; charset=utf-8\r\n",
        "\r\n",
        "<p>html body</p>\r\n",
        "--inner--\r\n",
        "--outer\r\n",
        "Content-Type: application/pdf; name=\"invoice.pdf\"\r\n",
        "Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n",
        "Content-Transfer-Encoding: base64\r\n",
        "\r\n",
        "JVBERi0xLjQ=\r\n",
        "--outer--\r\n",
    );

    #[test]
    fn test_parse_single_part() {
        let raw = concat!(
            "From: sender@example.com\r\n",
            "Subject: Test\r\n",
            "Content-Type: text/plain; charset=utf-8\r\n",
            "\r\n",
            "Hello, World!"
        );

        let msg = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(msg.subject(), "Test");
        assert_eq!(msg.parts.len(), 1);
        assert_eq!(msg.text_part().unwrap().text(), "Hello, World!");
        assert!(msg.html_part().is_none());
    }

    #[test]
    fn test_parse_nested_multipart_flattens() {
        let msg = Message::parse(MULTIPART.as_bytes()).unwrap();
        assert_eq!(msg.subject(), "Renovación");
        assert_eq!(msg.parts.len(), 3);
        assert_eq!(msg.text_part().unwrap().text(), "plain body");
        assert_eq!(msg.html_part().unwrap().text(), "<p>html body</p>");
    }

    #[test]
    fn test_attachment_detection() {
        let msg = Message::parse(MULTIPART.as_bytes()).unwrap();
        let attachments: Vec<_> = msg.attachment_parts().collect();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].filename().unwrap(), "invoice.pdf");
        assert_eq!(attachments[0].decode_body(), b"%PDF-1.4");
    }

    #[test]
    fn test_latin1_body_fallback() {
        let mut raw = concat!(
            "Subject: hi\r\n",
            "Content-Type: text/plain; charset=iso-8859-1\r\n",
            "\r\n",
        )
        .as_bytes()
        .to_vec();
        raw.extend_from_slice(&[0x63, 0x61, 0x66, 0xE9]); // "café" in latin-1

        let msg = Message::parse(&raw).unwrap();
        assert_eq!(msg.text_part().unwrap().text(), "café");
    }

    #[test]
    fn test_latin1_multipart_section_survives() {
        let mut raw = concat!(
            "Subject: hi\r\n",
            "Content-Type: multipart/alternative; boundary=b1\r\n",
            "\r\n",
            "--b1\r\n",
            "Content-Type: text/plain; charset=iso-8859-1\r\n",
            "\r\n",
        )
        .as_bytes()
        .to_vec();
        raw.extend_from_slice(&[0x63, 0x61, 0x66, 0xE9]); // "café" in latin-1
        raw.extend_from_slice(b"\r\n--b1--\r\n");

        let msg = Message::parse(&raw).unwrap();
        assert_eq!(msg.text_part().unwrap().text(), "café");
    }

    #[test]
    fn test_quoted_printable_body() {
        let raw = concat!(
            "Content-Type: text/plain; charset=utf-8\r\n",
            "Content-Transfer-Encoding: quoted-printable\r\n",
            "\r\n",
            "H=C3=A9llo"
        );

        let msg = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(msg.text_part().unwrap().text(), "Héllo");
    }

    #[test]
    fn test_headers_only_blob() {
        let raw = "Subject: just headers\r\nFrom: a@b.c\r\n";
        let msg = Message::parse(raw.as_bytes()).unwrap();
        assert_eq!(msg.subject(), "just headers");
        assert_eq!(msg.text_part().unwrap().text(), "");
    }
}
