//! MIME decoding utilities.
//!
//! Supports Base64, Quoted-Printable, charset decoding with fallback, and
//! RFC 2047 encoded-word headers.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use encoding_rs::{Encoding, WINDOWS_1252};

/// Decodes Base64 data.
///
/// # Errors
///
/// Returns an error if the input is not valid Base64.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    STANDARD.decode(data).map_err(Into::into)
}

/// Decodes Quoted-Printable text (RFC 2045) into raw bytes.
///
/// The output is bytes rather than a string because the byte stream may be
/// in any charset; pair with [`decode_charset`].
///
/// # Errors
///
/// Returns an error if the input contains invalid escape sequences.
pub fn decode_quoted_printable(text: &str) -> Result<Vec<u8>> {
    let mut result = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '=' {
            // Soft line break
            if chars.peek() == Some(&'\r') {
                chars.next();
                if chars.peek() == Some(&'\n') {
                    chars.next();
                    continue;
                }
            } else if chars.peek() == Some(&'\n') {
                chars.next();
                continue;
            }

            // Hex encoded byte
            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                let byte = u8::from_str_radix(&hex, 16)
                    .map_err(|e| Error::InvalidEncoding(format!("Invalid hex: {e}")))?;
                result.push(byte);
            } else {
                return Err(Error::InvalidEncoding(
                    "Incomplete escape sequence".to_string(),
                ));
            }
        } else {
            let mut buf = [0u8; 4];
            result.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        }
    }

    Ok(result)
}

/// Decodes raw bytes into text, falling through an ordered list of charsets.
///
/// Tries the preferred charset label first (when given and recognized), then
/// strict UTF-8, then Windows-1252 with replacement characters. This never
/// fails; the worst case is best-effort text with substitutions.
#[must_use]
pub fn decode_charset(bytes: &[u8], preferred: Option<&str>) -> String {
    if let Some(label) = preferred
        && let Some(encoding) = Encoding::for_label(label.trim().as_bytes())
    {
        let (text, _, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return text.into_owned();
        }
    }

    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => {
            // Single-byte permissive fallback, cannot fail
            let (text, _, _) = WINDOWS_1252.decode(bytes);
            text.into_owned()
        }
    }
}

/// Decodes a header value containing RFC 2047 encoded words.
///
/// Format per word: `=?charset?encoding?encoded-text?=`. Plain text between
/// words is kept as-is; whitespace separating two adjacent encoded words is
/// dropped per RFC 2047. Undecodable words are kept verbatim, so this never
/// fails.
#[must_use]
pub fn decode_encoded_words(value: &str) -> String {
    let mut result = String::new();
    let mut rest = value;
    let mut prev_was_encoded = false;

    while let Some(start) = rest.find("=?") {
        let (plain, candidate) = rest.split_at(start);

        match parse_encoded_word(&candidate[2..]) {
            Some((decoded, consumed)) => {
                // Whitespace between adjacent encoded words is not significant
                if !(prev_was_encoded && plain.chars().all(char::is_whitespace)) {
                    result.push_str(plain);
                }
                result.push_str(&decoded);
                prev_was_encoded = true;
                rest = &candidate[2 + consumed..];
            }
            None => {
                result.push_str(plain);
                result.push_str("=?");
                prev_was_encoded = false;
                rest = &candidate[2..];
            }
        }
    }

    result.push_str(rest);
    result.trim().to_string()
}

/// Parses one encoded word starting just after `=?`.
///
/// Returns the decoded text and the number of bytes consumed (up to and
/// including the closing `?=`), or `None` if the word is malformed.
fn parse_encoded_word(inner: &str) -> Option<(String, usize)> {
    let end = inner.find("?=")?;
    let word = &inner[..end];

    let mut pieces = word.splitn(3, '?');
    let charset = pieces.next()?;
    let encoding = pieces.next()?;
    let encoded_text = pieces.next()?;

    let bytes = match encoding {
        "B" | "b" => decode_base64(encoded_text).ok()?,
        "Q" | "q" => {
            let with_spaces = encoded_text.replace('_', " ");
            decode_quoted_printable(&with_spaces).ok()?
        }
        _ => return None,
    };

    Some((decode_charset(&bytes, Some(charset)), end + 2))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_base64_decode() {
        let decoded = decode_base64("SGVsbG8sIFdvcmxkIQ==").unwrap();
        assert_eq!(decoded, b"Hello, World!");
    }

    #[test]
    fn test_quoted_printable_decode() {
        let decoded = decode_quoted_printable("Hello, World!").unwrap();
        assert_eq!(decoded, b"Hello, World!");

        let decoded = decode_quoted_printable("H=C3=A9llo").unwrap();
        assert_eq!(String::from_utf8(decoded).unwrap(), "Héllo");
    }

    #[test]
    fn test_quoted_printable_soft_line_break() {
        let decoded = decode_quoted_printable("Hello=\r\nWorld").unwrap();
        assert_eq!(decoded, b"HelloWorld");
    }

    #[test]
    fn test_charset_preferred() {
        // "café" in ISO-8859-1
        let bytes = [0x63, 0x61, 0x66, 0xE9];
        assert_eq!(decode_charset(&bytes, Some("iso-8859-1")), "café");
    }

    #[test]
    fn test_charset_utf8_fallback() {
        assert_eq!(decode_charset("café".as_bytes(), None), "café");
        assert_eq!(decode_charset("café".as_bytes(), Some("bogus-charset")), "café");
    }

    #[test]
    fn test_charset_permissive_fallback() {
        // Invalid UTF-8, no charset tag: Windows-1252 still yields text
        let bytes = [0x63, 0x61, 0x66, 0xE9];
        assert_eq!(decode_charset(&bytes, None), "café");
    }

    #[test]
    fn test_encoded_word_base64() {
        assert_eq!(decode_encoded_words("=?utf-8?B?SMOpbGxv?="), "Héllo");
    }

    #[test]
    fn test_encoded_word_quoted_printable() {
        assert_eq!(decode_encoded_words("=?utf-8?Q?H=C3=A9llo?="), "Héllo");
        assert_eq!(
            decode_encoded_words("=?iso-8859-1?Q?Renovaci=F3n_de_marca?="),
            "Renovación de marca"
        );
    }

    #[test]
    fn test_encoded_word_mixed_with_plain() {
        assert_eq!(
            decode_encoded_words("Re: =?utf-8?B?SMOpbGxv?= world"),
            "Re: Héllo world"
        );
    }

    #[test]
    fn test_adjacent_encoded_words_drop_whitespace() {
        assert_eq!(
            decode_encoded_words("=?utf-8?Q?Hello?= =?utf-8?Q?_World?="),
            "Hello World"
        );
    }

    #[test]
    fn test_malformed_encoded_word_kept_verbatim() {
        assert_eq!(decode_encoded_words("=?broken"), "=?broken");
        assert_eq!(decode_encoded_words("plain text"), "plain text");
    }

    proptest::proptest! {
        #[test]
        fn prop_decode_encoded_words_never_panics(input in ".*") {
            let _ = decode_encoded_words(&input);
        }

        #[test]
        fn prop_decode_charset_always_yields_text(
            bytes in proptest::collection::vec(proptest::num::u8::ANY, 0..256),
            label in proptest::option::of("[a-z0-9-]{1,16}"),
        ) {
            // Lenient by contract: any byte soup decodes to some string
            let _ = decode_charset(&bytes, label.as_deref());
        }
    }
}
