use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;
use crate::model::Ms;

/// Background task that cancels pending bookings whose payment never
/// completed, releasing their dates, and compacts the WAL once enough
/// churn has accumulated.
pub async fn run_reaper(engine: Arc<Engine>, compact_threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis() as Ms;

        let stale = engine.collect_stale_pending(now);
        for (booking_id, _room_id) in stale {
            match engine.reap_stale_booking(booking_id).await {
                Ok(()) => info!("reaped unpaid booking {booking_id}"),
                Err(e) => {
                    // Payment may have completed since the scan — that's fine
                    tracing::debug!("reaper skip {booking_id}: {e}");
                }
            }
        }

        if engine.wal_appends_since_compact().await >= compact_threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}
