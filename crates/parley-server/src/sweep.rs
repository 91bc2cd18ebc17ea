use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use parley_db::Database;

use crate::config::OrphanSweep;

/// Background task that deletes orphaned conversations.
///
/// Runs on an interval and removes conversations older than the grace period
/// that never got both participants. The grace period must comfortably exceed
/// the store deadline so a creation still in progress is never swept.
pub async fn run_orphan_sweep(db: Arc<Database>, sweep: OrphanSweep) {
    let mut interval = tokio::time::interval(Duration::from_secs(sweep.interval_secs));

    loop {
        interval.tick().await;

        let db = Arc::clone(&db);
        let swept = tokio::task::spawn_blocking(move || db.delete_orphan_conversations(sweep.grace_secs)).await;

        match swept {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Orphan sweep: removed {} conversations", count);
                }
            }
            Ok(Err(e)) => warn!("Orphan sweep error: {:#}", e),
            Err(e) => warn!("Orphan sweep task failed: {}", e),
        }
    }
}
