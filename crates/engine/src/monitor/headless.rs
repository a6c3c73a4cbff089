use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::state::EngineShared;

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Logs a progress summary every five seconds until the run finishes,
/// then logs a final tally.
pub(crate) async fn run_headless(shared: Arc<EngineShared>, finished: CancellationToken) {
    let mut ticker = tokio::time::interval(REPORT_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so the opening log line
    // comes from the engine, not the reporter.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => report_progress(&shared),
            _ = finished.cancelled() => break,
        }
    }
    report_final(&shared);
}

fn report_progress(shared: &EngineShared) {
    let totals = shared.set.totals();
    let progress = if totals.total_bytes > 0 {
        totals.uploaded_bytes as f64 * 100.0 / totals.total_bytes as f64
    } else {
        0.0
    };
    info!(
        "Upload progress: {progress:.1}% | Total: {} | Completed: {} | Failed: {} | Skipped: {}",
        totals.total, totals.completed, totals.failed, totals.skipped
    );
}

fn report_final(shared: &EngineShared) {
    let totals = shared.set.totals();
    info!(
        "Upload completed! Total: {} | Success: {} | Failed: {} | Skipped: {}",
        totals.total, totals.completed, totals.failed, totals.skipped
    );
}
