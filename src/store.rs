/// In-memory Unified Lead set
///
/// Persistence technology is out of scope for the core; the lead set lives
/// behind an async RwLock keyed by identity key. One ingestion cycle is
/// the single writer: the pipeline snapshots the map, transforms it, and
/// commits the result, so readers only ever see a complete cycle's output.
/// Leads are never hard-deleted; inactivity past the TTL soft-expires
/// them.
use crate::models::UnifiedLead;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};

pub struct LeadStore {
    leads: RwLock<HashMap<String, UnifiedLead>>,
    /// Serializes ingestion cycles; quote traffic never touches this.
    cycle_lock: Mutex<()>,
}

impl LeadStore {
    pub fn new() -> Self {
        Self {
            leads: RwLock::new(HashMap::new()),
            cycle_lock: Mutex::new(()),
        }
    }

    /// Takes the single-writer guard for one ingestion cycle.
    pub async fn begin_cycle(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.cycle_lock.lock().await
    }

    /// Clones the current lead set for a cycle to transform.
    pub async fn snapshot(&self) -> HashMap<String, UnifiedLead> {
        self.leads.read().await.clone()
    }

    /// Commits a cycle's transformed lead set.
    pub async fn commit(&self, leads: HashMap<String, UnifiedLead>) {
        *self.leads.write().await = leads;
    }

    /// Active (non-expired) leads.
    pub async fn active_leads(&self) -> Vec<UnifiedLead> {
        self.leads
            .read()
            .await
            .values()
            .filter(|l| !l.expired)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.leads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.leads.read().await.is_empty()
    }
}

impl Default for LeadStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Flags leads idle past the TTL. Operates on a cycle's working map so the
/// sweep commits atomically with the rest of the cycle.
pub fn sweep_expired(
    leads: &mut HashMap<String, UnifiedLead>,
    ttl_days: i64,
    now: DateTime<Utc>,
) -> usize {
    let cutoff = now - ChronoDuration::days(ttl_days);
    let mut swept = 0;
    for lead in leads.values_mut() {
        if !lead.expired && lead.last_seen < cutoff {
            lead.expired = true;
            swept += 1;
        }
    }
    if swept > 0 {
        tracing::info!("Soft-expired {} inactive lead(s)", swept);
    }
    swept
}
