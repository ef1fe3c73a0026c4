//! Application setup and runtime.

use crate::{bus::EventBus, config::Config, db, http, retention, smtp, store::MailStore};
use sqlx::sqlite::SqlitePoolOptions;
use tracing::{error, info};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
  pub store: MailStore,
  pub bus: EventBus,
  pub config: Config,
}

/// Start the SMTP listener, retention sweeper, and HTTP API.
pub async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
  crate::util::init_tracing();

  let config = Config::from_env();
  let db_url = db::ensure_sqlite_path(&config.database_url);
  let pool = SqlitePoolOptions::new()
    .max_connections(5)
    .connect(&db_url)
    .await?;
  db::run_migrations(&pool).await?;

  let state = AppState {
    store: MailStore::new(pool),
    bus: EventBus::new(),
    config: config.clone(),
  };

  // Bind both ports before spawning anything; either failing is fatal.
  let smtp_listener = tokio::net::TcpListener::bind(&config.smtp_addr).await?;
  let http_listener = tokio::net::TcpListener::bind(&config.http_addr).await?;

  info!("smtp listener:  {}", config.smtp_addr);
  info!("http api:       http://{}/api", config.http_addr);
  info!("issuing addresses under @{}", config.email_domain);

  let smtp_state = state.clone();
  tokio::spawn(async move {
    if let Err(e) = smtp::serve(smtp_listener, smtp_state).await {
      error!("smtp listener error: {e}");
    }
  });

  tokio::spawn(retention::run_sweeper(
    state.store.clone(),
    config.sweep_interval,
    config.retention_minutes,
  ));

  let app = http::build_router(state);
  axum::serve(http_listener, app).await?;
  Ok(())
}
