//! Background maintenance: expires overdue plans and purges lapsed sessions
//! on a fixed interval.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::state::AppState;

/// One maintenance pass. Returns the number of plans expired.
pub async fn run_once(state: &AppState) -> usize {
    let expired = state.services.ledger.sweep();
    if let Some(pool) = &state.db_pool {
        for tx in &expired {
            if let Err(e) = crate::db::transactions::upsert(pool, tx).await {
                tracing::error!(
                    transaction_id = %tx.transaction_id,
                    error = %e,
                    "failed to persist expired plan"
                );
            }
        }
    }
    let purged = state.services.sessions.purge_expired();
    if !expired.is_empty() || purged > 0 {
        tracing::info!(expired = expired.len(), sessions_purged = purged, "sweep complete");
    }
    expired.len()
}

/// Start the periodic sweep. Returns `None` when the interval is zero.
pub fn spawn_sweeper(state: AppState) -> Option<JoinHandle<()>> {
    let secs = state.config.sweep_interval_secs;
    if secs == 0 {
        tracing::info!("background sweep disabled");
        return None;
    }
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_once(&state).await;
        }
    }))
}
