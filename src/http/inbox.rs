//! Inbox listing API.

use crate::{
  app::AppState,
  models::email::email_summary::EmailSummary,
  store::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT},
};
use axum::{
  Json,
  extract::{Path as AxumPath, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::error;

#[derive(Debug, Default, Deserialize)]
pub struct InboxParams {
  pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct InboxResponse {
  pub emails: Vec<EmailSummary>,
}

pub async fn list_inbox(
  State(state): State<AppState>,
  AxumPath(id): AxumPath<String>,
  Query(params): Query<InboxParams>,
) -> impl IntoResponse {
  let limit = params
    .limit
    .unwrap_or(DEFAULT_LIST_LIMIT)
    .clamp(1, MAX_LIST_LIMIT);
  match state.store.list_recent(&id, limit).await {
    Ok(emails) => Json(InboxResponse { emails }).into_response(),
    Err(e) => {
      error!("list_inbox error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}
