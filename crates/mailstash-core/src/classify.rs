//! Ownership classification.
//!
//! A deployment receives mail for several addresses in one physical
//! mailbox. Classification attributes each message to the first owned
//! address found among its recipients, so configuration order doubles as
//! priority when a message is addressed to more than one owned address.

use crate::store::MessageMetadata;

/// Classifies messages by recipient against a fixed set of owned addresses.
#[derive(Debug, Clone)]
pub struct OwnershipClassifier {
    owned: Vec<String>,
}

impl OwnershipClassifier {
    /// Creates a classifier from owned addresses in priority order.
    #[must_use]
    pub fn new(owned_addresses: Vec<String>) -> Self {
        Self {
            owned: owned_addresses
                .into_iter()
                .map(|a| a.to_lowercase())
                .collect(),
        }
    }

    /// Attributes a message to an owned address, if any.
    ///
    /// The first owned address appearing in To, Cc, or Bcc wins. An owned
    /// address also present in From is skipped: a message sent from an
    /// owned address does not belong to it merely for being self-addressed.
    #[must_use]
    pub fn classify(&self, from: &str, to: &str, cc: &str, bcc: &str) -> Option<&str> {
        let from = from.to_lowercase();
        let recipients = format!("{to} {cc} {bcc}").to_lowercase();

        self.owned
            .iter()
            .find(|addr| recipients.contains(addr.as_str()) && !from.contains(addr.as_str()))
            .map(String::as_str)
    }

    /// Classifies from stored metadata fields.
    #[must_use]
    pub fn classify_meta(&self, meta: &MessageMetadata) -> Option<&str> {
        self.classify(&meta.from, &meta.to, &meta.cc, &meta.bcc)
    }
}
