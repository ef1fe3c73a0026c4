//! Full message fetch API.

use crate::app::AppState;
use axum::{
  Json,
  extract::{Path as AxumPath, State},
  http::StatusCode,
  response::IntoResponse,
};
use tracing::error;

pub async fn get_message(
  State(state): State<AppState>,
  AxumPath(id): AxumPath<i64>,
) -> impl IntoResponse {
  match state.store.get(id).await {
    Ok(Some(email)) => Json(email).into_response(),
    Ok(None) => (StatusCode::NOT_FOUND, "message not found").into_response(),
    Err(e) => {
      error!("get_message error: {e}");
      (StatusCode::INTERNAL_SERVER_ERROR, "db error").into_response()
    }
  }
}
