//! Insert input for the message store.

/// Caller-supplied fields; the store assigns `id` and `received_at`.
#[derive(Debug, Clone)]
pub struct NewEmail {
  pub inbox_id: String,
  pub from_addr: String,
  pub to_addr: String,
  pub subject: String,
  pub text_body: String,
  pub html_body: String,
}
