//! MIME header handling.

use crate::encoding::decode_encoded_words;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// Collection of email headers.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: HashMap<String, Vec<String>>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into().to_lowercase();
        self.headers.entry(name).or_default().push(value.into());
    }

    /// Gets the first raw value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_lowercase())
            .and_then(|v| v.first().map(String::as_str))
    }

    /// Gets all raw values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .get(&name.to_lowercase())
            .map(|v| v.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Gets the first value with RFC 2047 encoded words decoded.
    ///
    /// Returns an empty string for missing headers so callers always get a
    /// usable value.
    #[must_use]
    pub fn get_decoded(&self, name: &str) -> String {
        self.get(name).map(decode_encoded_words).unwrap_or_default()
    }

    /// Parses headers from raw text.
    ///
    /// Headers are in the format:
    /// ```text
    /// Header-Name: value
    ///  continuation line
    /// ```
    ///
    /// # Errors
    ///
    /// Returns an error if the text is non-blank but contains no parseable
    /// header line, which means the input is not a header block at all.
    pub fn parse(text: &str) -> Result<Self> {
        let mut headers = Self::new();
        let mut current_name: Option<String> = None;
        let mut current_value = String::new();

        for line in text.lines() {
            if line.is_empty() {
                // Empty line signals end of headers, but save current header first
                if let Some(name) = current_name.take() {
                    headers.add(name, current_value.trim().to_string());
                }
                break;
            }

            // Continuation line (starts with space or tab)
            if line.starts_with(' ') || line.starts_with('\t') {
                if current_name.is_some() {
                    current_value.push(' ');
                    current_value.push_str(line.trim());
                }
            } else {
                if let Some(name) = current_name.take() {
                    headers.add(name, current_value.trim().to_string());
                    current_value.clear();
                }

                if let Some((name, value)) = line.split_once(':') {
                    current_name = Some(name.trim().to_string());
                    current_value = value.trim().to_string();
                }
            }
        }

        // Save last header if we didn't hit an empty line
        if let Some(name) = current_name {
            headers.add(name, current_value.trim().to_string());
        }

        if headers.headers.is_empty() && !text.trim().is_empty() {
            return Err(Error::InvalidHeader(
                "no header lines found".to_string(),
            ));
        }

        Ok(headers)
    }
}
