//! Shared test doubles.
#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::adapter::{AdapterError, AdapterResult, Depth, MailboxAdapter, RemoteQuery};

/// In-memory mailbox adapter for tests.
///
/// Folders hold `(identifier, raw blob)` pairs in insertion order, which
/// stands in for oldest-first remote ordering. Flipping the failure toggle
/// makes every call return a connection error.
#[derive(Default)]
pub struct MockAdapter {
    folders: Mutex<HashMap<String, Vec<(String, Vec<u8>)>>>,
    failing: AtomicBool,
    fetch_count: AtomicUsize,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message to a folder.
    pub fn add_message(&self, folder: &str, id: &str, raw: Vec<u8>) {
        self.folders
            .lock()
            .unwrap()
            .entry(folder.to_string())
            .or_default()
            .push((id.to_string(), raw));
    }

    /// Makes every subsequent call fail with a connection error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `fetch` calls made so far.
    pub fn fetches(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> AdapterResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AdapterError::Connection("mock offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MailboxAdapter for MockAdapter {
    async fn list_identifiers(
        &self,
        folder: &str,
        _query: &RemoteQuery,
    ) -> AdapterResult<Vec<String>> {
        self.check_failing()?;
        let folders = self.folders.lock().unwrap();
        Ok(folders
            .get(folder)
            .map(|messages| messages.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default())
    }

    async fn fetch(&self, folder: &str, id: &str, _depth: Depth) -> AdapterResult<Vec<u8>> {
        self.check_failing()?;
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        let folders = self.folders.lock().unwrap();
        folders
            .get(folder)
            .and_then(|messages| messages.iter().find(|(mid, _)| mid == id))
            .map(|(_, raw)| raw.clone())
            .ok_or_else(|| AdapterError::Operation(format!("no such message: {folder}/{id}")))
    }
}

/// Builds a minimal raw message for ingestion tests.
pub fn raw_message(from: &str, to: &str, subject: &str, body: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\n\
         To: {to}\r\n\
         Subject: {subject}\r\n\
         Date: Mon, 24 Aug 2026 10:00:00 +0000\r\n\
         Message-ID: <{subject}@test>\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         \r\n\
         {body}\r\n"
    )
    .into_bytes()
}
