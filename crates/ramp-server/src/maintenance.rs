use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use ramp_api::auth::AppState;
use ramp_core::{notify, snapshot};

/// Background task for storage hygiene.
///
/// Runs on an interval: prunes snapshots past the retention window that no
/// live assignment references, and notifies assignees whose due dates
/// slipped past.
pub async fn run_maintenance_loop(state: AppState, interval_secs: u64, retention_days: i64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match sweep(state.clone(), retention_days).await {
            Ok((pruned, notified)) => {
                if pruned > 0 || notified > 0 {
                    info!(
                        "Maintenance: pruned {} snapshots, notified {} overdue assignments",
                        pruned, notified
                    );
                }
            }
            Err(e) => {
                warn!("Maintenance error: {}", e);
            }
        }
    }
}

async fn sweep(state: AppState, retention_days: i64) -> anyhow::Result<(usize, usize)> {
    let result = tokio::task::spawn_blocking(move || {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let pruned = snapshot::prune_old_snapshots(&state.db, cutoff)?;
        let notified = notify::sweep_overdue(&state.db)?;
        Ok::<_, ramp_core::CoreError>((pruned, notified))
    })
    .await??;

    Ok(result)
}
