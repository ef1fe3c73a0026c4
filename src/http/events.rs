//! Server-sent events stream of new-mail notifications.

use crate::{app::AppState, bus};
use axum::{
  extract::{Query, State},
  response::sse::{Event, KeepAlive, Sse},
};
use serde::Deserialize;
use std::{convert::Infallible, time::Duration};
use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt, wrappers::ReceiverStream};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct EventsParams {
  pub inbox: String,
}

/// Subscribe to `new_email` events for one inbox. The guard captured in
/// the stream deregisters the subscription when the client disconnects.
pub async fn subscribe(
  State(state): State<AppState>,
  Query(params): Query<EventsParams>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
  let (tx, rx) = mpsc::channel(bus::SINK_BUFFER);
  let registry = state.bus.registry().clone();
  let handle = registry.register(params.inbox.clone(), tx);
  let guard = registry.guard(handle);
  info!(
    "sse subscriber attached for inbox {} ({} active)",
    params.inbox,
    registry.len()
  );

  let stream = ReceiverStream::new(rx).map(move |notification| {
    let _keep_registered = &guard;
    Ok::<_, Infallible>(
      Event::default()
        .event("new_email")
        .data(serde_json::to_string(&notification).unwrap_or_default()),
    )
  });

  Sse::new(stream).keep_alive(
    KeepAlive::new()
      .interval(Duration::from_secs(15))
      .text("ping"),
  )
}
