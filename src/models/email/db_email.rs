//! Database row for a stored email.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DbEmail {
    pub id: i64,
    pub inbox_id: String,
    pub from_addr: String,
    pub to_addr: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
    pub received_at: DateTime<Utc>,
}
