use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use pulse_api::AppState;

/// Background task that purges expired stories on an interval.
pub async fn run_story_sweep(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match sweep_expired_stories(&state).await {
            Ok(count) => {
                if count > 0 {
                    info!("Story sweep: purged {} expired stories", count);
                }
            }
            Err(e) => {
                warn!("Story sweep error: {:#}", e);
            }
        }
    }
}

pub async fn sweep_expired_stories(state: &AppState) -> anyhow::Result<usize> {
    let state = state.clone();
    tokio::task::spawn_blocking(move || state.db.purge_expired_stories(Utc::now())).await?
}
