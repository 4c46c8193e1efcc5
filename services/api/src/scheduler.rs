//! services/api/src/scheduler.rs
//!
//! Time-triggered side effects, decoupled from client requests: the weekly
//! archival of the current week into history, and periodic full-state
//! backups. Errors are logged only; there is no retry and no alert.

use crate::web::sync::SyncHandle;
use chrono::{Datelike, Local, Timelike, Weekday};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// The archival check runs once a minute so the weekly instant
/// (Saturday 23:59 local time) is hit at most once.
const ARCHIVE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

pub fn spawn(sync: SyncHandle, backup_interval: Duration) -> JoinHandle<()> {
    tokio::spawn(run(sync, backup_interval))
}

async fn run(sync: SyncHandle, backup_interval: Duration) {
    info!(
        "Scheduler started (backup every {:?}, archival check every {:?})",
        backup_interval, ARCHIVE_CHECK_INTERVAL
    );

    let mut archive_tick = tokio::time::interval(ARCHIVE_CHECK_INTERVAL);
    let mut backup_tick = tokio::time::interval(backup_interval);
    // The immediate first ticks: skip them so boot does not archive/backup.
    archive_tick.tick().await;
    backup_tick.tick().await;

    loop {
        tokio::select! {
            _ = archive_tick.tick() => {
                if is_archival_instant() {
                    match sync.archive_week().await {
                        Ok(Some(receipt)) => {
                            info!("Scheduled archival completed for week {}", receipt.week);
                        }
                        Ok(None) => {
                            info!("Scheduled archival skipped: no payments this week");
                        }
                        Err(e) => error!("Scheduled archival failed: {}", e),
                    }
                }
            }
            _ = backup_tick.tick() => {
                match sync.backup().await {
                    Ok(id) => info!("Automatic backup created: {}", id),
                    Err(e) => error!("Automatic backup failed: {}", e),
                }
            }
        }
    }
}

/// Saturday 23:59 on the household wall clock. The archival itself is
/// idempotent per week key, so a double fire within the minute is harmless.
fn is_archival_instant() -> bool {
    let now = Local::now();
    now.weekday() == Weekday::Sat && now.hour() == 23 && now.minute() == 59
}
