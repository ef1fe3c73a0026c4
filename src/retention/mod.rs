//! Periodic sweep that expires stored mail past its retention window.

use std::time::Duration;

use crate::store::MailStore;

/// Deletes expired messages on a fixed cadence until the process exits.
///
/// The first sweep happens one full interval after startup, so a restart
/// never races fresh mail straight into deletion.
pub async fn run_sweeper(store: MailStore, every: Duration, retention_minutes: i64) {
    // interval() panics on a zero period.
    let every = every.max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(every);
    // interval() fires immediately; consume that tick so the loop waits first.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match store.delete_older_than(retention_minutes).await {
            Ok(0) => {}
            Ok(deleted) => {
                tracing::info!("retention sweep deleted {} expired message(s)", deleted);
            }
            Err(e) => {
                tracing::error!("retention sweep failed: {}", e);
            }
        }
    }
}
