//! Environment-driven configuration with development defaults.

use std::time::Duration;

/// Every tunable the service reads, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Config {
  /// HTTP API bind address. `EPHEMAIL_HTTP_ADDR`, default `0.0.0.0:3000`.
  pub http_addr: String,
  /// SMTP listener bind address. `EPHEMAIL_SMTP_ADDR`, default `0.0.0.0:2525`.
  pub smtp_addr: String,
  /// sqlx database URL. `EPHEMAIL_DATABASE`, default `sqlite://ephemail.db`.
  pub database_url: String,
  /// Domain suffix for issued addresses. `EPHEMAIL_DOMAIN`, default `ephemail.test`.
  pub email_domain: String,
  /// Minutes a message survives before the sweeper may delete it.
  /// `EPHEMAIL_RETENTION_MINUTES`, default 60.
  pub retention_minutes: i64,
  /// Pause between retention sweeps. `EPHEMAIL_SWEEP_INTERVAL_SECS`, default 300.
  pub sweep_interval: Duration,
}

impl Config {
  pub fn from_env() -> Self {
    Config {
      http_addr: env_or("EPHEMAIL_HTTP_ADDR", "0.0.0.0:3000"),
      smtp_addr: env_or("EPHEMAIL_SMTP_ADDR", "0.0.0.0:2525"),
      database_url: env_or("EPHEMAIL_DATABASE", "sqlite://ephemail.db"),
      email_domain: env_or("EPHEMAIL_DOMAIN", "ephemail.test"),
      retention_minutes: env_parse("EPHEMAIL_RETENTION_MINUTES", 60),
      sweep_interval: Duration::from_secs(env_parse("EPHEMAIL_SWEEP_INTERVAL_SECS", 300)),
    }
  }
}

fn env_or(key: &str, default: &str) -> String {
  std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
  std::env::var(key)
    .ok()
    .and_then(|v| v.parse().ok())
    .unwrap_or(default)
}
