//! Message store: the only durable state in the process.
//!
//! Every mutating operation is safe under concurrent callers: SQLite
//! serializes the writes, and `received_at` stamps are clamped monotonic
//! per store instance so "most recent first" queries stay consistent.

use crate::models::email::{db_email::DbEmail, email_summary::EmailSummary, new_email::NewEmail};
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};

/// Listing size when the caller does not ask for one.
pub const DEFAULT_LIST_LIMIT: u32 = 50;
/// Hard cap on a single listing; the store never returns an unbounded list.
pub const MAX_LIST_LIMIT: u32 = 200;

#[derive(Clone)]
pub struct MailStore {
    pool: SqlitePool,
    last_stamp: Arc<Mutex<DateTime<Utc>>>,
}

impl MailStore {
    pub fn new(pool: SqlitePool) -> Self {
        MailStore {
            pool,
            last_stamp: Arc::new(Mutex::new(DateTime::<Utc>::MIN_UTC)),
        }
    }

    /// Next receive timestamp: wall clock, but never earlier than the stamp
    /// handed out before it. Insertion order stays recoverable even if the
    /// clock steps backwards between two inserts.
    fn next_stamp(&self) -> DateTime<Utc> {
        let mut last = self.last_stamp.lock().unwrap();
        let mut now = Utc::now();
        if now < *last {
            now = *last;
        }
        *last = now;
        now
    }

    /// Persist one message and return it with `id` and `received_at` filled
    /// in. The row is fully committed when this returns; only then may the
    /// caller publish a notification for it.
    pub async fn insert(&self, email: NewEmail) -> Result<DbEmail, sqlx::Error> {
        let received_at = self.next_stamp();
        let result = sqlx::query(
            "INSERT INTO emails (inbox_id, from_addr, to_addr, subject, text_body, html_body, received_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&email.inbox_id)
        .bind(&email.from_addr)
        .bind(&email.to_addr)
        .bind(&email.subject)
        .bind(&email.text_body)
        .bind(&email.html_body)
        .bind(received_at)
        .execute(&self.pool)
        .await?;

        Ok(DbEmail {
            id: result.last_insert_rowid(),
            inbox_id: email.inbox_id,
            from_addr: email.from_addr,
            to_addr: email.to_addr,
            subject: email.subject,
            text_body: email.text_body,
            html_body: email.html_body,
            received_at,
        })
    }

    /// Up to `limit` summaries for one inbox, most recent first (ties broken
    /// by id, also descending). Snippets are cut to 100 characters in SQL;
    /// full bodies never travel through a listing.
    pub async fn list_recent(
        &self,
        inbox_id: &str,
        limit: u32,
    ) -> Result<Vec<EmailSummary>, sqlx::Error> {
        sqlx::query_as::<_, EmailSummary>(
            "SELECT id, from_addr, subject, received_at, substr(text_body, 1, 100) AS snippet FROM emails WHERE inbox_id = ? ORDER BY received_at DESC, id DESC LIMIT ?",
        )
        .bind(inbox_id)
        .bind(limit.min(MAX_LIST_LIMIT) as i64)
        .fetch_all(&self.pool)
        .await
    }

    /// Full record by id; `Ok(None)` when no such message exists.
    pub async fn get(&self, id: i64) -> Result<Option<DbEmail>, sqlx::Error> {
        sqlx::query_as::<_, DbEmail>(
            "SELECT id, inbox_id, from_addr, to_addr, subject, text_body, html_body, received_at FROM emails WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Delete everything received more than `minutes` ago; returns how many
    /// rows went. Running it again without new inserts deletes nothing.
    pub async fn delete_older_than(&self, minutes: i64) -> Result<u64, sqlx::Error> {
        // A window too large for chrono means nothing is old enough to delete.
        let cutoff = Duration::try_minutes(minutes)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let result = sqlx::query("DELETE FROM emails WHERE received_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
