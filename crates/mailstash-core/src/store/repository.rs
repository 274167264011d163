//! Persistent message store backed by `SQLite`.
//!
//! Two data tiers plus a full-text index live in one database: header
//! metadata for every known message, full content for messages fetched at
//! depth, and an FTS5 table kept in lockstep with both. All writes that
//! touch a message go through [`MessageStore::upsert`] or
//! [`MessageStore::upsert_content`], each of which updates the index inside
//! the same transaction. There are no triggers; the store owns the index.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use super::model::{
    AttachmentInfo, CachedMessage, MessageContent, MessageId, MessageMetadata, SearchHit,
    StoreStats,
};
use crate::classify::OwnershipClassifier;
use crate::error::Result;

/// Repository for cached messages and their search index.
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Create a new store with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        // Metadata tier (always present once a message is known)
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_metadata (
                email_id TEXT PRIMARY KEY,
                folder TEXT NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                from_addr TEXT NOT NULL DEFAULT '',
                to_addr TEXT NOT NULL DEFAULT '',
                cc_addr TEXT NOT NULL DEFAULT '',
                bcc_addr TEXT NOT NULL DEFAULT '',
                date_str TEXT NOT NULL DEFAULT '',
                timestamp INTEGER NOT NULL DEFAULT 0,
                message_id TEXT NOT NULL DEFAULT '',
                account TEXT,
                has_attachments INTEGER NOT NULL DEFAULT 0,
                cached_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Content tier (present only after a full fetch)
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS email_content (
                email_id TEXT PRIMARY KEY,
                folder TEXT NOT NULL,
                body TEXT,
                html_body TEXT,
                attachments_json TEXT,
                cached_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Full-text index over searchable fields
        sqlx::query(
            r"
            CREATE VIRTUAL TABLE IF NOT EXISTS email_search_fts USING fts5(
                email_id UNINDEXED,
                subject,
                from_addr,
                to_addr,
                body
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(r"CREATE INDEX IF NOT EXISTS idx_metadata_folder ON email_metadata(folder)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_metadata_folder_time
            ON email_metadata(folder, timestamp)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(r"CREATE INDEX IF NOT EXISTS idx_metadata_account ON email_metadata(account)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Write a message atomically: metadata, optional content, and the
    /// search index row, all in one transaction.
    ///
    /// When `content` is `None` and a content row already exists, the index
    /// keeps the existing body.
    ///
    /// # Errors
    ///
    /// Returns an error if the database transaction fails.
    pub async fn upsert(
        &self,
        meta: &MessageMetadata,
        content: Option<&MessageContent>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            INSERT INTO email_metadata
                (email_id, folder, subject, from_addr, to_addr, cc_addr, bcc_addr,
                 date_str, timestamp, message_id, account, has_attachments, cached_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(email_id) DO UPDATE SET
                folder = excluded.folder,
                subject = excluded.subject,
                from_addr = excluded.from_addr,
                to_addr = excluded.to_addr,
                cc_addr = excluded.cc_addr,
                bcc_addr = excluded.bcc_addr,
                date_str = excluded.date_str,
                timestamp = excluded.timestamp,
                message_id = excluded.message_id,
                account = excluded.account,
                has_attachments = excluded.has_attachments,
                cached_at = excluded.cached_at
            ",
        )
        .bind(meta.id.as_str())
        .bind(&meta.folder)
        .bind(&meta.subject)
        .bind(&meta.from)
        .bind(&meta.to)
        .bind(&meta.cc)
        .bind(&meta.bcc)
        .bind(&meta.date)
        .bind(meta.timestamp)
        .bind(&meta.message_id)
        .bind(meta.account.as_deref())
        .bind(meta.has_attachments)
        .bind(meta.cached_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        if let Some(content) = content {
            let attachments_json = if content.attachments.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&content.attachments)?)
            };

            sqlx::query(
                r"
                INSERT INTO email_content
                    (email_id, folder, body, html_body, attachments_json, cached_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(email_id) DO UPDATE SET
                    folder = excluded.folder,
                    body = excluded.body,
                    html_body = excluded.html_body,
                    attachments_json = excluded.attachments_json,
                    cached_at = excluded.cached_at
                ",
            )
            .bind(meta.id.as_str())
            .bind(&content.folder)
            .bind(&content.body)
            .bind(content.html_body.as_deref())
            .bind(attachments_json.as_deref())
            .bind(content.cached_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }

        let indexed_body = if let Some(content) = content {
            content.body.clone()
        } else {
            sqlx::query(r"SELECT body FROM email_content WHERE email_id = ?")
                .bind(meta.id.as_str())
                .fetch_optional(&mut *tx)
                .await?
                .and_then(|row| row.get::<Option<String>, _>("body"))
                .unwrap_or_default()
        };

        sqlx::query(r"DELETE FROM email_search_fts WHERE email_id = ?")
            .bind(meta.id.as_str())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            INSERT INTO email_search_fts (email_id, subject, from_addr, to_addr, body)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(meta.id.as_str())
        .bind(&meta.subject)
        .bind(&meta.from)
        .bind(&meta.to)
        .bind(&indexed_body)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Write the content tier for an already-known message and refresh the
    /// indexed body in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database transaction fails.
    pub async fn upsert_content(&self, content: &MessageContent) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let attachments_json = if content.attachments.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&content.attachments)?)
        };

        sqlx::query(
            r"
            INSERT INTO email_content
                (email_id, folder, body, html_body, attachments_json, cached_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(email_id) DO UPDATE SET
                folder = excluded.folder,
                body = excluded.body,
                html_body = excluded.html_body,
                attachments_json = excluded.attachments_json,
                cached_at = excluded.cached_at
            ",
        )
        .bind(content.id.as_str())
        .bind(&content.folder)
        .bind(&content.body)
        .bind(content.html_body.as_deref())
        .bind(attachments_json.as_deref())
        .bind(content.cached_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(r"UPDATE email_search_fts SET body = ? WHERE email_id = ?")
            .bind(&content.body)
            .bind(content.id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Get metadata for a single message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_metadata(&self, id: &MessageId) -> Result<Option<MessageMetadata>> {
        let row = sqlx::query(
            r"
            SELECT email_id, folder, subject, from_addr, to_addr, cc_addr, bcc_addr,
                   date_str, timestamp, message_id, account, has_attachments, cached_at
            FROM email_metadata
            WHERE email_id = ?
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_metadata))
    }

    /// Get cached content for a single message.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_content(&self, id: &MessageId) -> Result<Option<MessageContent>> {
        let row = sqlx::query(
            r"
            SELECT email_id, folder, body, html_body, attachments_json, cached_at
            FROM email_content
            WHERE email_id = ?
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let attachments = match row.get::<Option<String>, _>("attachments_json") {
            Some(json) => serde_json::from_str::<Vec<AttachmentInfo>>(&json)?,
            None => Vec::new(),
        };

        Ok(Some(MessageContent {
            id: MessageId::from(row.get::<String, _>("email_id")),
            folder: row.get("folder"),
            body: row.get::<Option<String>, _>("body").unwrap_or_default(),
            html_body: row.get("html_body"),
            attachments,
            cached_at: parse_cached_at(&row.get::<String, _>("cached_at")),
        }))
    }

    /// List cached messages in a folder, newest first.
    ///
    /// Messages without a content row come back with an empty body and
    /// `is_headers_only` set.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn list(
        &self,
        folder: &str,
        limit: usize,
        offset: usize,
        owner: Option<&str>,
    ) -> Result<Vec<CachedMessage>> {
        let sql = if owner.is_some() {
            r"
            SELECT m.email_id, m.folder, m.subject, m.from_addr, m.to_addr, m.cc_addr,
                   m.bcc_addr, m.date_str, m.timestamp, m.message_id, m.account,
                   m.has_attachments, m.cached_at,
                   c.body, c.html_body,
                   c.email_id IS NOT NULL AS has_content
            FROM email_metadata m
            LEFT JOIN email_content c ON c.email_id = m.email_id
            WHERE m.folder = ? AND m.account = ?
            ORDER BY m.timestamp DESC, m.email_id DESC
            LIMIT ? OFFSET ?
            "
        } else {
            r"
            SELECT m.email_id, m.folder, m.subject, m.from_addr, m.to_addr, m.cc_addr,
                   m.bcc_addr, m.date_str, m.timestamp, m.message_id, m.account,
                   m.has_attachments, m.cached_at,
                   c.body, c.html_body,
                   c.email_id IS NOT NULL AS has_content
            FROM email_metadata m
            LEFT JOIN email_content c ON c.email_id = m.email_id
            WHERE m.folder = ?
            ORDER BY m.timestamp DESC, m.email_id DESC
            LIMIT ? OFFSET ?
            "
        };

        let mut query = sqlx::query(sql).bind(folder);
        if let Some(owner) = owner {
            query = query.bind(owner);
        }
        let rows = query
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .bind(i64::try_from(offset).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let messages = rows
            .iter()
            .map(|row| {
                let has_content: bool = row.get("has_content");
                CachedMessage {
                    meta: row_to_metadata(row),
                    body: row.get::<Option<String>, _>("body").unwrap_or_default(),
                    html_body: row.get("html_body"),
                    is_headers_only: !has_content,
                }
            })
            .collect();

        Ok(messages)
    }

    /// Count cached messages in a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self, folder: &str, owner: Option<&str>) -> Result<u64> {
        let row = if let Some(owner) = owner {
            sqlx::query(
                r"SELECT COUNT(*) AS count FROM email_metadata WHERE folder = ? AND account = ?",
            )
            .bind(folder)
            .bind(owner)
            .fetch_one(&self.pool)
            .await?
        } else {
            sqlx::query(r"SELECT COUNT(*) AS count FROM email_metadata WHERE folder = ?")
                .bind(folder)
                .fetch_one(&self.pool)
                .await?
        };

        let count: i64 = row.get("count");
        Ok(count.unsigned_abs())
    }

    /// All cache identifiers known for a folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn ids_in_folder(&self, folder: &str) -> Result<HashSet<String>> {
        let rows = sqlx::query(r"SELECT email_id FROM email_metadata WHERE folder = ?")
            .bind(folder)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|row| row.get("email_id")).collect())
    }

    /// Identifiers whose content tier is missing or empty, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn ids_missing_content(&self, limit: usize) -> Result<Vec<MessageId>> {
        let rows = sqlx::query(
            r"
            SELECT m.email_id
            FROM email_metadata m
            LEFT JOIN email_content c ON c.email_id = m.email_id
            WHERE c.email_id IS NULL OR c.body IS NULL OR c.body = ''
            ORDER BY m.timestamp DESC
            LIMIT ?
            ",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| MessageId::from(row.get::<String, _>("email_id")))
            .collect())
    }

    /// Remove a message from every tier, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database transaction fails.
    pub async fn remove(&self, id: &MessageId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(r"DELETE FROM email_metadata WHERE email_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query(r"DELETE FROM email_content WHERE email_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query(r"DELETE FROM email_search_fts WHERE email_id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Re-run ownership classification over stored metadata.
    ///
    /// Returns the number of rows whose account changed. Pass a folder to
    /// restrict the pass.
    ///
    /// # Errors
    ///
    /// Returns an error if a database query fails.
    pub async fn reclassify(
        &self,
        classifier: &OwnershipClassifier,
        folder: Option<&str>,
    ) -> Result<u64> {
        let rows = if let Some(folder) = folder {
            sqlx::query(
                r"
                SELECT email_id, from_addr, to_addr, cc_addr, bcc_addr, account
                FROM email_metadata
                WHERE folder = ?
                ",
            )
            .bind(folder)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                r"SELECT email_id, from_addr, to_addr, cc_addr, bcc_addr, account
                  FROM email_metadata",
            )
            .fetch_all(&self.pool)
            .await?
        };

        let mut changed = 0u64;
        for row in &rows {
            let current: Option<String> = row.get("account");
            let next = classifier.classify(
                row.get::<String, _>("from_addr").as_str(),
                row.get::<String, _>("to_addr").as_str(),
                row.get::<String, _>("cc_addr").as_str(),
                row.get::<String, _>("bcc_addr").as_str(),
            );

            if current.as_deref() != next {
                sqlx::query(r"UPDATE email_metadata SET account = ? WHERE email_id = ?")
                    .bind(next)
                    .bind(row.get::<String, _>("email_id"))
                    .execute(&self.pool)
                    .await?;
                changed += 1;
            }
        }

        Ok(changed)
    }

    /// Rebuild the full-text index from the two storage tiers.
    ///
    /// Runs in a single transaction, so concurrent readers see either the
    /// old index or the new one, never a half-built state. Returns the
    /// number of indexed rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database transaction fails.
    pub async fn rebuild_search_index(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(r"DELETE FROM email_search_fts")
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r"
            INSERT INTO email_search_fts (email_id, subject, from_addr, to_addr, body)
            SELECT m.email_id, m.subject, m.from_addr, m.to_addr, COALESCE(c.body, '')
            FROM email_metadata m
            LEFT JOIN email_content c ON c.email_id = m.email_id
            ",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Search via the full-text index with prefix matching.
    ///
    /// Each whitespace-separated token becomes a quoted prefix term, so the
    /// query text is always literal and never FTS syntax.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn search_index(
        &self,
        query: &str,
        owner: Option<&str>,
        limit: usize,
    ) -> Result<(Vec<SearchHit>, u64)> {
        let fts_query = prepare_fts_query(query);
        if fts_query.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let sql = if owner.is_some() {
            r"
            SELECT m.email_id, m.folder, m.subject, m.from_addr, m.to_addr,
                   m.timestamp, m.account,
                   snippet(email_search_fts, -1, '<mark>', '</mark>', '…', 32) AS excerpt
            FROM email_search_fts f
            JOIN email_metadata m ON m.email_id = f.email_id
            WHERE email_search_fts MATCH ? AND m.account = ?
            ORDER BY m.timestamp DESC, m.email_id DESC
            LIMIT ?
            "
        } else {
            r"
            SELECT m.email_id, m.folder, m.subject, m.from_addr, m.to_addr,
                   m.timestamp, m.account,
                   snippet(email_search_fts, -1, '<mark>', '</mark>', '…', 32) AS excerpt
            FROM email_search_fts f
            JOIN email_metadata m ON m.email_id = f.email_id
            WHERE email_search_fts MATCH ?
            ORDER BY m.timestamp DESC, m.email_id DESC
            LIMIT ?
            "
        };

        let mut rows_query = sqlx::query(sql).bind(&fts_query);
        if let Some(owner) = owner {
            rows_query = rows_query.bind(owner);
        }
        let rows = rows_query
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let count_sql = if owner.is_some() {
            r"
            SELECT COUNT(*) AS count
            FROM email_search_fts f
            JOIN email_metadata m ON m.email_id = f.email_id
            WHERE email_search_fts MATCH ? AND m.account = ?
            "
        } else {
            r"
            SELECT COUNT(*) AS count
            FROM email_search_fts f
            WHERE email_search_fts MATCH ?
            "
        };

        let mut count_query = sqlx::query(count_sql).bind(&fts_query);
        if let Some(owner) = owner {
            count_query = count_query.bind(owner);
        }
        let count: i64 = count_query.fetch_one(&self.pool).await?.get("count");

        let hits = rows
            .iter()
            .map(|row| SearchHit {
                id: MessageId::from(row.get::<String, _>("email_id")),
                folder: row.get("folder"),
                subject: row.get("subject"),
                from: row.get("from_addr"),
                to: row.get("to_addr"),
                timestamp: row.get("timestamp"),
                account: row.get("account"),
                excerpt: row.get("excerpt"),
            })
            .collect();

        Ok((hits, count.unsigned_abs()))
    }

    /// Search by scanning the most recent messages with a substring match.
    ///
    /// Fallback path for queries the index cannot serve. The scan is
    /// bounded to `window` messages ordered newest first; matching is
    /// case-insensitive over subject, sender, recipients, and the body when
    /// `include_bodies` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn scan_recent(
        &self,
        query: &str,
        owner: Option<&str>,
        window: usize,
        limit: usize,
        include_bodies: bool,
    ) -> Result<(Vec<SearchHit>, u64)> {
        let sql = if owner.is_some() {
            r"
            SELECT m.email_id, m.folder, m.subject, m.from_addr, m.to_addr,
                   m.timestamp, m.account, c.body
            FROM email_metadata m
            LEFT JOIN email_content c ON c.email_id = m.email_id
            WHERE m.account = ?
            ORDER BY m.timestamp DESC, m.email_id DESC
            LIMIT ?
            "
        } else {
            r"
            SELECT m.email_id, m.folder, m.subject, m.from_addr, m.to_addr,
                   m.timestamp, m.account, c.body
            FROM email_metadata m
            LEFT JOIN email_content c ON c.email_id = m.email_id
            ORDER BY m.timestamp DESC, m.email_id DESC
            LIMIT ?
            "
        };

        let mut rows_query = sqlx::query(sql);
        if let Some(owner) = owner {
            rows_query = rows_query.bind(owner);
        }
        let rows = rows_query
            .bind(i64::try_from(window).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        let needle = query.to_lowercase();
        let mut hits = Vec::new();
        let mut total = 0u64;

        for row in &rows {
            let subject: String = row.get("subject");
            let from: String = row.get("from_addr");
            let to: String = row.get("to_addr");
            let body: Option<String> = row.get("body");

            let excerpt = excerpt_for(&subject, &needle)
                .or_else(|| excerpt_for(&from, &needle))
                .or_else(|| excerpt_for(&to, &needle))
                .or_else(|| {
                    if include_bodies {
                        body.as_deref().and_then(|b| excerpt_for(b, &needle))
                    } else {
                        None
                    }
                });

            if let Some(excerpt) = excerpt {
                total += 1;
                if hits.len() < limit {
                    hits.push(SearchHit {
                        id: MessageId::from(row.get::<String, _>("email_id")),
                        folder: row.get("folder"),
                        subject,
                        from,
                        to,
                        timestamp: row.get("timestamp"),
                        account: row.get("account"),
                        excerpt,
                    });
                }
            }
        }

        Ok((hits, total))
    }

    /// Aggregate row counts across all tiers.
    ///
    /// # Errors
    ///
    /// Returns an error if a database query fails.
    pub async fn stats(&self) -> Result<StoreStats> {
        let metadata: i64 = sqlx::query(r"SELECT COUNT(*) AS count FROM email_metadata")
            .fetch_one(&self.pool)
            .await?
            .get("count");
        let content: i64 = sqlx::query(r"SELECT COUNT(*) AS count FROM email_content")
            .fetch_one(&self.pool)
            .await?
            .get("count");
        let indexed: i64 = sqlx::query(r"SELECT COUNT(*) AS count FROM email_search_fts")
            .fetch_one(&self.pool)
            .await?
            .get("count");

        Ok(StoreStats {
            metadata_count: metadata.unsigned_abs(),
            content_count: content.unsigned_abs(),
            indexed_count: indexed.unsigned_abs(),
        })
    }
}

fn row_to_metadata(row: &SqliteRow) -> MessageMetadata {
    MessageMetadata {
        id: MessageId::from(row.get::<String, _>("email_id")),
        folder: row.get("folder"),
        subject: row.get("subject"),
        from: row.get("from_addr"),
        to: row.get("to_addr"),
        cc: row.get("cc_addr"),
        bcc: row.get("bcc_addr"),
        date: row.get("date_str"),
        timestamp: row.get("timestamp"),
        message_id: row.get("message_id"),
        account: row.get("account"),
        has_attachments: row.get("has_attachments"),
        cached_at: parse_cached_at(&row.get::<String, _>("cached_at")),
    }
}

fn parse_cached_at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Turns free text into an FTS5 query of quoted prefix terms.
///
/// `invoice mar` becomes `"invoice"* "mar"*`; double quotes inside tokens
/// are doubled so user text can never inject FTS syntax.
fn prepare_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"*", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds a highlighted excerpt if `needle_lower` occurs in `text`.
///
/// The match is wrapped in `<mark>` tags with roughly 40 characters of
/// context either side, mirroring the index path's snippet output.
fn excerpt_for(text: &str, needle_lower: &str) -> Option<String> {
    const CONTEXT: usize = 40;

    let (begin, end) = find_case_insensitive(text, needle_lower)?;

    let mut start = begin;
    let mut taken = 0;
    for (idx, _) in text[..begin].char_indices().rev() {
        if taken == CONTEXT {
            break;
        }
        start = idx;
        taken += 1;
    }

    let mut stop = end;
    for (offset, c) in text[end..].char_indices() {
        if offset >= CONTEXT {
            break;
        }
        stop = end + offset + c.len_utf8();
    }

    let mut excerpt = String::new();
    if start > 0 {
        excerpt.push('…');
    }
    excerpt.push_str(&text[start..begin]);
    excerpt.push_str("<mark>");
    excerpt.push_str(&text[begin..end]);
    excerpt.push_str("</mark>");
    excerpt.push_str(&text[end..stop]);
    if stop < text.len() {
        excerpt.push('…');
    }
    Some(excerpt)
}

/// Finds the first case-insensitive occurrence of `needle_lower` and
/// returns its byte range in the original text.
fn find_case_insensitive(text: &str, needle_lower: &str) -> Option<(usize, usize)> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let needle: Vec<char> = needle_lower.chars().collect();
    if needle.is_empty() || chars.len() < needle.len() {
        return None;
    }

    for start in 0..=chars.len() - needle.len() {
        let matched = (0..needle.len()).all(|i| {
            let mut lowered = chars[start + i].1.to_lowercase();
            lowered.next() == Some(needle[i]) && lowered.next().is_none()
        });
        if matched {
            let begin = chars[start].0;
            let end = chars
                .get(start + needle.len())
                .map_or(text.len(), |&(b, _)| b);
            return Some((begin, end));
        }
    }
    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn meta(id: &str, folder: &str, timestamp: i64) -> MessageMetadata {
        MessageMetadata {
            id: MessageId::new(id),
            folder: folder.to_string(),
            subject: format!("Subject {id}"),
            from: "sender@example.com".to_string(),
            to: "alice@example.com".to_string(),
            cc: String::new(),
            bcc: String::new(),
            date: "Mon, 24 Aug 2026 10:00:00 +0000".to_string(),
            timestamp,
            message_id: format!("<{id}@example.com>"),
            account: Some("alice@example.com".to_string()),
            has_attachments: false,
            cached_at: Utc::now(),
        }
    }

    fn content(id: &str, folder: &str, body: &str) -> MessageContent {
        MessageContent {
            id: MessageId::new(id),
            folder: folder.to_string(),
            body: body.to_string(),
            html_body: None,
            attachments: Vec::new(),
            cached_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_metadata() {
        let store = MessageStore::in_memory().await.unwrap();
        store.upsert(&meta("1", "INBOX", 100), None).await.unwrap();

        let got = store.get_metadata(&MessageId::new("1")).await.unwrap();
        let got = got.unwrap();
        assert_eq!(got.subject, "Subject 1");
        assert_eq!(got.account.as_deref(), Some("alice@example.com"));
        assert_eq!(got.timestamp, 100);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = MessageStore::in_memory().await.unwrap();
        let m = meta("1", "INBOX", 100);
        store.upsert(&m, None).await.unwrap();
        store.upsert(&m, None).await.unwrap();

        assert_eq!(store.count("INBOX", None).await.unwrap(), 1);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.metadata_count, 1);
        assert_eq!(stats.indexed_count, 1);
    }

    #[tokio::test]
    async fn test_metadata_only_row_reads_headers_only() {
        let store = MessageStore::in_memory().await.unwrap();
        store.upsert(&meta("1", "INBOX", 100), None).await.unwrap();

        let listed = store.list("INBOX", 10, 0, None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_headers_only);
        assert_eq!(listed[0].body, "");
    }

    #[tokio::test]
    async fn test_metadata_refresh_keeps_indexed_body() {
        let store = MessageStore::in_memory().await.unwrap();
        let m = meta("1", "INBOX", 100);
        store
            .upsert(&m, Some(&content("1", "INBOX", "quarterly invoice attached")))
            .await
            .unwrap();

        // Header-only refresh must not wipe the indexed body
        store.upsert(&m, None).await.unwrap();

        let (hits, total) = store.search_index("invoice", None, 10).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(hits[0].id.as_str(), "1");
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_with_id_tiebreak() {
        let store = MessageStore::in_memory().await.unwrap();
        store.upsert(&meta("a", "INBOX", 100), None).await.unwrap();
        store.upsert(&meta("c", "INBOX", 200), None).await.unwrap();
        store.upsert(&meta("b", "INBOX", 200), None).await.unwrap();

        let listed = store.list("INBOX", 10, 0, None).await.unwrap();
        let ids: Vec<&str> = listed.iter().map(|m| m.meta.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_list_pagination_covers_each_row_once() {
        let store = MessageStore::in_memory().await.unwrap();
        for i in 0..5 {
            store
                .upsert(&meta(&format!("m{i}"), "INBOX", i), None)
                .await
                .unwrap();
        }

        let mut seen = HashSet::new();
        for page in 0..3 {
            for msg in store.list("INBOX", 2, page * 2, None).await.unwrap() {
                assert!(seen.insert(msg.meta.id.as_str().to_string()));
            }
        }
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn test_count_with_owner_filter() {
        let store = MessageStore::in_memory().await.unwrap();
        let mut other = meta("1", "INBOX", 100);
        other.account = Some("bob@example.com".to_string());
        store.upsert(&other, None).await.unwrap();
        store.upsert(&meta("2", "INBOX", 200), None).await.unwrap();

        assert_eq!(store.count("INBOX", None).await.unwrap(), 2);
        assert_eq!(
            store.count("INBOX", Some("alice@example.com")).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_search_index_prefix_match() {
        let store = MessageStore::in_memory().await.unwrap();
        let mut m = meta("1", "INBOX", 100);
        m.subject = "Invoice for August".to_string();
        store.upsert(&m, None).await.unwrap();

        let (hits, total) = store.search_index("inv", None, 10).await.unwrap();
        assert_eq!(total, 1);
        assert!(hits[0].excerpt.contains("<mark>"));

        let (hits, _) = store.search_index("voice", None, 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_index_quotes_are_literal() {
        let store = MessageStore::in_memory().await.unwrap();
        store.upsert(&meta("1", "INBOX", 100), None).await.unwrap();

        // Quote characters must not produce an FTS syntax error
        let result = store.search_index("\"subject", None, 10).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_search_index_owner_filter() {
        let store = MessageStore::in_memory().await.unwrap();
        let mut a = meta("1", "INBOX", 100);
        a.subject = "shared topic".to_string();
        store.upsert(&a, None).await.unwrap();
        let mut b = meta("2", "INBOX", 200);
        b.subject = "shared topic".to_string();
        b.account = Some("bob@example.com".to_string());
        store.upsert(&b, None).await.unwrap();

        let (hits, total) = store
            .search_index("shared", Some("bob@example.com"), 10)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(hits[0].id.as_str(), "2");
    }

    #[tokio::test]
    async fn test_scan_recent_matches_body_case_insensitively() {
        let store = MessageStore::in_memory().await.unwrap();
        store
            .upsert(
                &meta("1", "INBOX", 100),
                Some(&content("1", "INBOX", "Renovación de marca pendiente")),
            )
            .await
            .unwrap();

        let (hits, total) = store
            .scan_recent("renovación", None, 400, 10, true)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert!(hits[0].excerpt.contains("<mark>Renovación</mark>"));

        // Bodies excluded, no match remains
        let (hits, _) = store
            .scan_recent("renovación", None, 400, 10, false)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_scan_recent_window_bound() {
        let store = MessageStore::in_memory().await.unwrap();
        for i in 0..4 {
            let mut m = meta(&format!("m{i}"), "INBOX", i);
            m.subject = "needle".to_string();
            store.upsert(&m, None).await.unwrap();
        }

        // Window of 2 only sees the newest two rows
        let (_, total) = store.scan_recent("needle", None, 2, 10, false).await.unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_rebuild_search_index() {
        let store = MessageStore::in_memory().await.unwrap();
        store
            .upsert(
                &meta("1", "INBOX", 100),
                Some(&content("1", "INBOX", "hello body")),
            )
            .await
            .unwrap();
        store.upsert(&meta("2", "INBOX", 200), None).await.unwrap();

        let rebuilt = store.rebuild_search_index().await.unwrap();
        assert_eq!(rebuilt, 2);

        let (hits, _) = store.search_index("hello", None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id.as_str(), "1");
    }

    #[tokio::test]
    async fn test_rebuild_on_empty_store() {
        let store = MessageStore::in_memory().await.unwrap();
        assert_eq!(store.rebuild_search_index().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_content_refreshes_index() {
        let store = MessageStore::in_memory().await.unwrap();
        store.upsert(&meta("1", "INBOX", 100), None).await.unwrap();

        store
            .upsert_content(&content("1", "INBOX", "backfilled payload"))
            .await
            .unwrap();

        let (hits, _) = store.search_index("backfilled", None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);

        let stored = store.get_content(&MessageId::new("1")).await.unwrap();
        assert_eq!(stored.unwrap().body, "backfilled payload");
    }

    #[tokio::test]
    async fn test_ids_missing_content() {
        let store = MessageStore::in_memory().await.unwrap();
        store.upsert(&meta("1", "INBOX", 100), None).await.unwrap();
        store
            .upsert(
                &meta("2", "INBOX", 200),
                Some(&content("2", "INBOX", "body")),
            )
            .await
            .unwrap();
        store
            .upsert(&meta("3", "INBOX", 300), Some(&content("3", "INBOX", "")))
            .await
            .unwrap();

        let missing = store.ids_missing_content(10).await.unwrap();
        let ids: Vec<&str> = missing.iter().map(MessageId::as_str).collect();
        assert_eq!(ids, vec!["3", "1"]);
    }

    #[tokio::test]
    async fn test_remove_clears_all_tiers() {
        let store = MessageStore::in_memory().await.unwrap();
        store
            .upsert(
                &meta("1", "INBOX", 100),
                Some(&content("1", "INBOX", "body")),
            )
            .await
            .unwrap();

        store.remove(&MessageId::new("1")).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.metadata_count, 0);
        assert_eq!(stats.content_count, 0);
        assert_eq!(stats.indexed_count, 0);
    }

    #[tokio::test]
    async fn test_reclassify_updates_changed_rows() {
        let store = MessageStore::in_memory().await.unwrap();
        let mut m = meta("1", "INBOX", 100);
        m.account = None;
        store.upsert(&m, None).await.unwrap();

        let classifier = OwnershipClassifier::new(vec!["alice@example.com".to_string()]);
        let changed = store.reclassify(&classifier, None).await.unwrap();
        assert_eq!(changed, 1);

        let got = store.get_metadata(&MessageId::new("1")).await.unwrap();
        assert_eq!(got.unwrap().account.as_deref(), Some("alice@example.com"));

        // Second pass is a no-op
        assert_eq!(store.reclassify(&classifier, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_attachments_round_trip() {
        let store = MessageStore::in_memory().await.unwrap();
        let mut c = content("1", "INBOX", "see attached");
        c.attachments.push(AttachmentInfo {
            filename: "invoice.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            size: 1024,
        });
        store.upsert(&meta("1", "INBOX", 100), Some(&c)).await.unwrap();

        let stored = store.get_content(&MessageId::new("1")).await.unwrap().unwrap();
        assert_eq!(stored.attachments.len(), 1);
        assert_eq!(stored.attachments[0].filename, "invoice.pdf");
    }

    #[test]
    fn test_prepare_fts_query() {
        assert_eq!(prepare_fts_query("invoice"), "\"invoice\"*");
        assert_eq!(prepare_fts_query("invoice mar"), "\"invoice\"* \"mar\"*");
        assert_eq!(prepare_fts_query("say \"hi\""), "\"say\"* \"\"\"hi\"\"\"*");
        assert_eq!(prepare_fts_query("   "), "");
    }

    #[test]
    fn test_excerpt_for_bounds() {
        let text = "x".repeat(100) + "needle" + &"y".repeat(100);
        let excerpt = excerpt_for(&text, "needle").unwrap();
        assert!(excerpt.starts_with('…'));
        assert!(excerpt.ends_with('…'));
        assert!(excerpt.contains("<mark>needle</mark>"));

        assert!(excerpt_for("no match here", "needle").is_none());
    }
}
