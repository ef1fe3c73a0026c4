//! Push notification describing a newly stored email.

use crate::models::email::db_email::DbEmail;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Text-body characters carried in a push notification. Viewers wanting more
/// fetch the full message over the API.
pub const SNIPPET_LEN: usize = 50;

/// The ephemeral event published once per successful insert and fanned out
/// to matching subscribers. Never persisted; a subscriber that misses one
/// catches up by re-listing the inbox.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub inbox_id: String,
    pub from_addr: String,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub snippet: String,
}

impl From<&DbEmail> for Notification {
    fn from(email: &DbEmail) -> Self {
        Notification {
            inbox_id: email.inbox_id.clone(),
            from_addr: email.from_addr.clone(),
            subject: email.subject.clone(),
            received_at: email.received_at,
            // chars, not bytes: a multi-byte body must not be split mid-codepoint
            snippet: email.text_body.chars().take(SNIPPET_LEN).collect(),
        }
    }
}
