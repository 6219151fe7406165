/// Lane market-snapshot store
///
/// Snapshots are immutable once captured; the background refresher swaps
/// whole `Arc`s in, so readers never block on a refresh and never observe
/// a half-updated snapshot. A quote priced between refreshes simply reads
/// whatever snapshot is current, however old, and lets the confidence
/// model account for the age.
use crate::models::MarketSnapshot;
use crate::services::MarketDataClient;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Market lane identifier for an origin/destination pair: the two state
/// codes joined as "GA->FL". Market conditions are tracked per state pair,
/// not per city pair.
pub fn lane_id(origin: &str, destination: &str) -> String {
    format!(
        "{}->{}",
        state_of(origin).unwrap_or_else(|| "??".to_string()),
        state_of(destination).unwrap_or_else(|| "??".to_string())
    )
}

fn state_of(place: &str) -> Option<String> {
    let state_regex = Regex::new(r"\b([A-Za-z]{2})\s*$").unwrap();
    state_regex
        .captures(place.trim())
        .map(|caps| caps[1].to_uppercase())
}

/// Shared snapshot store. Single background writer, many readers.
pub struct MarketStore {
    snapshots: RwLock<HashMap<String, Arc<MarketSnapshot>>>,
}

impl MarketStore {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, lane: &str) -> Option<Arc<MarketSnapshot>> {
        self.snapshots.read().await.get(lane).cloned()
    }

    pub async fn insert(&self, snapshot: MarketSnapshot) {
        let lane = snapshot.lane.clone();
        self.snapshots
            .write()
            .await
            .insert(lane, Arc::new(snapshot));
    }

    /// Lanes the refresher keeps warm: every lane a quote has been asked
    /// for so far.
    pub async fn tracked_lanes(&self) -> Vec<String> {
        self.snapshots.read().await.keys().cloned().collect()
    }

    /// Returns the held snapshot for the lane, fetching one synchronously
    /// only when the lane has never been seen. The fetch happens outside
    /// the lock; concurrent first requests may both fetch, and the later
    /// insert wins, which is harmless for idempotent feed reads.
    pub async fn get_or_fetch(
        &self,
        lane: &str,
        client: &MarketDataClient,
    ) -> Result<Arc<MarketSnapshot>, crate::errors::AppError> {
        if let Some(snapshot) = self.get(lane).await {
            return Ok(snapshot);
        }

        tracing::info!("No snapshot held for lane {}, fetching", lane);
        let snapshot = client.current_snapshot(lane).await?;
        self.insert(snapshot).await;
        self.get(lane)
            .await
            .ok_or_else(|| crate::errors::AppError::Internal("snapshot vanished after insert".into()))
    }
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the independent refresh task. Runs until the process exits;
/// failures leave the previous snapshot in place and are retried on the
/// next tick.
pub fn spawn_refresher(
    store: Arc<MarketStore>,
    client: Arc<MarketDataClient>,
    refresh_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(refresh_secs));
        // First tick fires immediately; skip it so startup isn't delayed
        // by a burst of feed calls before any lane is tracked.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let lanes = store.tracked_lanes().await;
            if lanes.is_empty() {
                continue;
            }
            tracing::debug!("Refreshing {} market lane(s)", lanes.len());
            for lane in lanes {
                match client.current_snapshot(&lane).await {
                    Ok(snapshot) => store.insert(snapshot).await,
                    Err(e) => {
                        tracing::warn!(
                            "Market refresh failed for lane {}: {} (keeping stale snapshot)",
                            lane,
                            e
                        );
                    }
                }
            }
        }
    })
}
