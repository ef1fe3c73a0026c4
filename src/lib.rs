//! ephemail library entrypoint.
//!
//! Modules:
//! - `app`: startup and shared state
//! - `bus`: in-process fan-out of new-mail notifications
//! - `config`: environment-driven settings
//! - `db`: migrations and SQLite helpers
//! - `http`: Axum router, JSON APIs, SSE stream
//! - `models`: typed records used across layers
//! - `retention`: periodic expiry sweep
//! - `smtp`: lightweight SMTP intake listener
//! - `store`: mailbox persistence on top of sqlx
//! - `util`: parsing and address helpers

pub mod app;
pub mod bus;
pub mod config;
pub mod db;
pub mod http;
pub mod models;
pub mod retention;
pub mod smtp;
pub mod store;
pub mod util;
