use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::engine::Engine;

/// Background task that rewrites a community's booking log once enough
/// records have accumulated since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        compact_if_due(&engine, threshold).await;
    }
}

/// One compactor pass. Returns true if the log was rewritten.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.log_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    debug!(community = engine.community_id(), appends, "compacting booking log");
    match engine.compact_log().await {
        Ok(()) => true,
        Err(e) => {
            warn!(community = engine.community_id(), "compaction failed: {e}");
            false
        }
    }
}
