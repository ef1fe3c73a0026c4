//! Bounded listing projection of an email.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, FromRow, Serialize)]
pub struct EmailSummary {
  pub id: i64,
  pub from_addr: String,
  pub subject: String,
  pub received_at: DateTime<Utc>,
  pub snippet: String,
}
