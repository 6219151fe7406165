/// Ingestion-cycle orchestration
///
/// One call to `generate_unified_leads` runs a full cycle: fetch raw
/// records from every configured provider, normalize them through the
/// bounded stage queue, fuse into the existing Unified Lead set, enrich
/// against the registry, re-score, sweep expiry, and commit. Per-record
/// and per-provider errors are isolated; only a total inability to produce
/// a report surfaces to the caller.
use crate::config::Config;
use crate::enricher::RegistryEnricher;
use crate::errors::AppError;
use crate::fusion::FusionEngine;
use crate::models::{
    LeadFilters, LeadGenerationStats, LeadReport, NormalizedIdentity, RawLeadRecord, UnifiedLead,
};
use crate::normalizer::normalize_record;
use crate::scoring;
use crate::services::LeadProviderClient;
use crate::store::{sweep_expired, LeadStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

pub struct LeadPipeline {
    config: Config,
    providers: Vec<Arc<LeadProviderClient>>,
    fusion: FusionEngine,
    enricher: RegistryEnricher,
    store: Arc<LeadStore>,
}

impl LeadPipeline {
    pub fn new(
        config: Config,
        providers: Vec<Arc<LeadProviderClient>>,
        enricher: RegistryEnricher,
        store: Arc<LeadStore>,
    ) -> Self {
        let fusion = FusionEngine::new(config.fusion.clone());
        Self {
            config,
            providers,
            fusion,
            enricher,
            store,
        }
    }

    /// Runs one ingestion cycle and returns the ranked, filtered lead set
    /// with its statistics. This is one of the core's two public entry
    /// points.
    pub async fn generate_unified_leads(
        &self,
        filters: &LeadFilters,
    ) -> Result<LeadReport, AppError> {
        // Single writer per ingestion cycle.
        let _cycle = self.store.begin_cycle().await;
        let now = Utc::now();

        let raw_records = self.fetch_all(filters).await;
        tracing::info!("Cycle fetched {} raw record(s)", raw_records.len());

        let batch = normalize_stage(raw_records, self.config.fusion.queue_capacity).await;

        let mut leads = self.store.snapshot().await;

        let fused = self.fusion.fuse_into(&mut leads, &batch, now);
        tracing::info!(
            "Fusion: {} merged, {} created ({} unified leads total)",
            fused.merged,
            fused.created,
            leads.len()
        );

        let enriched = self.enricher.enrich_all(&mut leads, now).await;
        tracing::info!(
            "Enrichment: {} looked up, {} verified, {} no-match, {} failed, {} skipped",
            enriched.looked_up,
            enriched.verified,
            enriched.no_match,
            enriched.failed,
            enriched.skipped
        );

        for lead in leads.values_mut() {
            scoring::apply_scores(lead, &self.config.scoring, now);
        }

        sweep_expired(&mut leads, self.config.lead_ttl_days, now);

        self.store.commit(leads.clone()).await;

        Ok(build_report(leads, filters))
    }

    /// Fetches from every provider concurrently. A failing provider is
    /// logged and skipped; its records simply miss this cycle.
    async fn fetch_all(&self, filters: &LeadFilters) -> Vec<RawLeadRecord> {
        let wanted: Option<&Vec<String>> = filters.sources.as_ref();
        let mut join_set = JoinSet::new();

        for provider in &self.providers {
            if let Some(wanted) = wanted {
                if !wanted.iter().any(|s| s == provider.provider()) {
                    continue;
                }
            }
            let provider = provider.clone();
            let filters = filters.clone();
            join_set.spawn(async move {
                let name = provider.provider().to_string();
                (name, provider.fetch_leads(&filters).await)
            });
        }

        let mut by_provider: Vec<(String, Vec<RawLeadRecord>)> = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(records))) => by_provider.push((name, records)),
                Ok((name, Err(e))) => {
                    tracing::warn!("Provider '{}' failed this cycle: {}", name, e);
                }
                Err(e) => tracing::error!("Provider fetch task panicked: {}", e),
            }
        }

        // Stable provider order keeps the cycle deterministic regardless
        // of which fetch finished first.
        by_provider.sort_by(|a, b| a.0.cmp(&b.0));
        by_provider
            .into_iter()
            .flat_map(|(_, records)| records)
            .collect()
    }
}

/// The normalize stage: raw records stream through a bounded queue into
/// the collected batch for fusion. Unparsable records are dropped and
/// logged here, never merged.
async fn normalize_stage(
    records: Vec<RawLeadRecord>,
    queue_capacity: usize,
) -> Vec<(RawLeadRecord, NormalizedIdentity)> {
    let (tx, mut rx) = mpsc::channel::<(RawLeadRecord, NormalizedIdentity)>(queue_capacity.max(1));

    let producer = tokio::spawn(async move {
        let mut dropped = 0usize;
        for record in records {
            match normalize_record(&record) {
                Ok(identity) => {
                    if tx.send((record, identity)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    dropped += 1;
                    tracing::warn!(
                        "Dropping record {}:{}: {}",
                        record.source,
                        record.source_record_id,
                        e
                    );
                }
            }
        }
        dropped
    });

    let mut batch = Vec::new();
    while let Some(item) = rx.recv().await {
        batch.push(item);
    }

    match producer.await {
        Ok(dropped) if dropped > 0 => {
            tracing::info!("Normalize stage dropped {} invalid record(s)", dropped)
        }
        Ok(_) => {}
        Err(e) => tracing::error!("Normalize stage panicked: {}", e),
    }

    batch
}

/// Filters, ranks, and summarizes a cycle's lead set.
fn build_report(leads: HashMap<String, UnifiedLead>, filters: &LeadFilters) -> LeadReport {
    let mut selected: Vec<UnifiedLead> = leads
        .into_values()
        .filter(|lead| !lead.expired)
        .filter(|lead| matches_filters(lead, filters))
        .collect();

    // Ranked by score; identity key breaks ties so the order is stable.
    selected.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.identity_key.cmp(&b.identity_key))
    });

    let total_found = selected.len();
    let high_priority = selected
        .iter()
        .filter(|l| l.priority == crate::models::PriorityTier::High)
        .count();
    let average_score = if total_found > 0 {
        selected.iter().map(|l| l.score).sum::<f64>() / total_found as f64
    } else {
        0.0
    };
    let mut source_breakdown: HashMap<String, usize> = HashMap::new();
    for lead in &selected {
        *source_breakdown.entry(lead.source_label()).or_default() += 1;
    }
    let registry_matches = selected.iter().filter(|l| l.registry.verified()).count();

    LeadReport {
        leads: selected,
        stats: LeadGenerationStats {
            total_found,
            high_priority,
            average_score,
            source_breakdown,
            registry_matches,
        },
    }
}

fn matches_filters(lead: &UnifiedLead, filters: &LeadFilters) -> bool {
    if let Some(ref industries) = filters.industries {
        let industry = lead.industry.as_deref().unwrap_or("");
        if !industries.iter().any(|i| i == industry) {
            return false;
        }
    }
    if let Some(ref states) = filters.states {
        let state = lead.state.as_deref().unwrap_or("");
        if !states.iter().any(|s| s.eq_ignore_ascii_case(state)) {
            return false;
        }
    }
    if let Some(ref sources) = filters.sources {
        let distinct = lead.distinct_sources();
        if !distinct
            .iter()
            .any(|lead_source| sources.iter().any(|s| s == lead_source))
        {
            return false;
        }
    }
    if let Some(min_score) = filters.min_score {
        if lead.score < min_score {
            return false;
        }
    }
    true
}
