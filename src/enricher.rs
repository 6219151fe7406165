/// Registry enrichment
///
/// Cross-references Unified Leads against the carrier regulatory registry.
/// The only pipeline stage doing concurrent external I/O: lookups run
/// through a semaphore-bounded worker pool with a per-call timeout,
/// bounded in-call retries with exponential backoff, a per-cycle circuit
/// breaker, and an integrity-checked profile cache. A failed or timed-out
/// lookup never aborts the batch — the lead proceeds unverified and the
/// next cycle retries on its own backoff schedule.
use crate::cache_validator::SealedEntry;
use crate::circuit_breaker::create_registry_circuit_breaker;
use crate::config::EnrichmentConfig;
use crate::errors::AppError;
use crate::models::{RegistryProfile, SafetyRating, UnifiedLead};
use crate::services::{RegistryClient, RegistryQuery};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use failsafe::CircuitBreaker;
use moka::future::Cache;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// What one enrichment pass did, for cycle logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichmentSummary {
    /// Lookups attempted this cycle.
    pub looked_up: usize,
    /// Positive, verified registry matches.
    pub verified: usize,
    /// Definitive no-match answers.
    pub no_match: usize,
    /// Lookups that failed after the retry budget.
    pub failed: usize,
    /// Leads skipped: already checked, or waiting out their backoff.
    pub skipped: usize,
}

pub struct RegistryEnricher {
    client: Arc<RegistryClient>,
    cache: Cache<String, SealedEntry>,
    config: EnrichmentConfig,
}

impl RegistryEnricher {
    pub fn new(client: Arc<RegistryClient>, config: EnrichmentConfig) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.cache_ttl_secs))
            .max_capacity(config.cache_capacity)
            .build();
        Self {
            client,
            cache,
            config,
        }
    }

    /// Enriches every lead that still needs a registry answer and is not
    /// waiting out a backoff window. Mutates leads in place; never fails
    /// the batch.
    pub async fn enrich_all(
        &self,
        leads: &mut HashMap<String, UnifiedLead>,
        now: DateTime<Utc>,
    ) -> EnrichmentSummary {
        let mut summary = EnrichmentSummary::default();

        let mut pending: Vec<(String, RegistryQuery)> = Vec::new();
        for lead in leads.values() {
            if lead.registry.checked {
                summary.skipped += 1;
                continue;
            }
            if let Some(retry_at) = lead.registry.next_retry_at {
                if now < retry_at {
                    summary.skipped += 1;
                    continue;
                }
            }
            pending.push((lead.identity_key.clone(), query_for(lead)));
        }

        if pending.is_empty() {
            return summary;
        }

        // Sorted so the lookup order (and thus log output) is stable
        // across runs of the same input set.
        pending.sort_by(|a, b| a.0.cmp(&b.0));
        summary.looked_up = pending.len();
        tracing::info!("Enriching {} lead(s) against the registry", pending.len());

        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel));
        let breaker = Arc::new(create_registry_circuit_breaker());
        let mut join_set = JoinSet::new();

        for (key, query) in pending {
            let semaphore = semaphore.clone();
            let client = self.client.clone();
            let cache = self.cache.clone();
            let breaker = breaker.clone();
            let config = self.config.clone();
            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (key, Err(AppError::Internal("enrichment pool closed".into())))
                    }
                };
                let result =
                    lookup_with_retry(&client, &cache, breaker.as_ref(), &config, &query).await;
                (key, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((key, result)) => {
                    if let Some(lead) = leads.get_mut(&key) {
                        match result {
                            Ok(Some(profile)) => {
                                if profile.verified {
                                    summary.verified += 1;
                                } else {
                                    summary.no_match += 1;
                                }
                                apply_profile(lead, profile);
                            }
                            Ok(None) => {
                                summary.no_match += 1;
                                apply_no_match(lead);
                            }
                            Err(e) => {
                                summary.failed += 1;
                                tracing::warn!(
                                    "Registry lookup failed for {}: {} (lead proceeds unverified)",
                                    lead.company_name,
                                    e
                                );
                                apply_failure(lead, &self.config, now);
                            }
                        }
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::error!("Enrichment task panicked: {}", e);
                }
            }
        }

        summary
    }
}

/// Lookup plan for one lead: identifier when we have one, otherwise
/// normalized name + address.
fn query_for(lead: &UnifiedLead) -> RegistryQuery {
    if let Some(ref dot) = lead.dot_number {
        RegistryQuery::ByDotNumber(dot.clone())
    } else if let Some(ref mc) = lead.mc_number {
        RegistryQuery::ByMcNumber(mc.clone())
    } else {
        RegistryQuery::ByNameAddress {
            name: lead.normalized_name.clone(),
            address: lead.address.clone().unwrap_or_default(),
        }
    }
}

/// One lookup with cache, breaker gate, per-call timeout, and bounded
/// retries. Cached answers cover both matches and definitive no-matches.
async fn lookup_with_retry<B: CircuitBreaker>(
    client: &RegistryClient,
    cache: &Cache<String, SealedEntry>,
    breaker: &B,
    config: &EnrichmentConfig,
    query: &RegistryQuery,
) -> Result<Option<RegistryProfile>, AppError> {
    let cache_key = query.cache_key();

    if let Some(entry) = cache.get(&cache_key).await {
        if let Some(cached) = entry.open::<Option<RegistryProfile>>() {
            tracing::debug!("Registry cache hit for {}", cache_key);
            return Ok(cached);
        }
        // Tampered or shape-drifted entry: drop it and refetch.
        cache.invalidate(&cache_key).await;
    }

    let mut last_error = AppError::ExternalService("registry lookup not attempted".to_string());

    for attempt in 0..config.max_call_attempts {
        if !breaker.is_call_permitted() {
            return Err(AppError::ExternalService(
                "registry circuit breaker open".to_string(),
            ));
        }

        let outcome = tokio::time::timeout(
            Duration::from_secs(config.call_timeout_secs),
            client.lookup(query),
        )
        .await;

        let result = match outcome {
            Ok(inner) => inner,
            Err(_) => Err(AppError::ExternalService(format!(
                "registry lookup timed out after {}s",
                config.call_timeout_secs
            ))),
        };

        // Feed the observed outcome into the breaker's failure accounting.
        let _ = breaker.call(|| match &result {
            Ok(_) => Ok(()),
            Err(e) => Err(e.to_string()),
        });

        match result {
            Ok(answer) => {
                if let Some(entry) = SealedEntry::seal(&answer) {
                    cache.insert(cache_key, entry).await;
                }
                return Ok(answer);
            }
            Err(e) => {
                let delay = backoff_delay(config, attempt);
                tracing::debug!(
                    "Registry attempt {}/{} failed: {} (backing off {:?})",
                    attempt + 1,
                    config.max_call_attempts,
                    e,
                    delay
                );
                last_error = e;
                if attempt + 1 < config.max_call_attempts {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(last_error)
}

fn backoff_delay(config: &EnrichmentConfig, attempt: u32) -> Duration {
    let ms = config
        .backoff_base_ms
        .saturating_mul(1u64 << attempt.min(16))
        .min(config.backoff_cap_ms);
    Duration::from_millis(ms)
}

/// Merges a registry answer into the lead. A verified legal name outranks
/// every provider-supplied name.
fn apply_profile(lead: &mut UnifiedLead, profile: RegistryProfile) {
    if profile.verified {
        if let Some(ref legal_name) = profile.legal_name {
            lead.company_name = legal_name.clone();
            lead.field_sources
                .insert("company_name".to_string(), "registry".to_string());
        }
        if let Some(ref dot) = profile.dot_number {
            lead.dot_number = Some(dot.clone());
            lead.field_sources
                .insert("dot_number".to_string(), "registry".to_string());
        }
        if let Some(ref mc) = profile.mc_number {
            lead.mc_number = Some(mc.clone());
            lead.field_sources
                .insert("mc_number".to_string(), "registry".to_string());
        }
    }
    lead.registry.profile = Some(profile);
    lead.registry.checked = true;
    lead.registry.next_retry_at = None;
}

/// A definitive no-match still merges an (unverified) profile block so the
/// lead records that the registry was consulted.
fn apply_no_match(lead: &mut UnifiedLead) {
    lead.registry.profile = Some(RegistryProfile {
        dot_number: lead.dot_number.clone(),
        mc_number: lead.mc_number.clone(),
        legal_name: None,
        verified: false,
        safety_rating: SafetyRating::Unknown,
    });
    lead.registry.checked = true;
    lead.registry.next_retry_at = None;
}

/// Transport failure: schedule the next cycle's retry with exponential
/// backoff, or give up permanently once the cycle budget is spent.
fn apply_failure(lead: &mut UnifiedLead, config: &EnrichmentConfig, now: DateTime<Utc>) {
    lead.registry.attempts += 1;
    if lead.registry.attempts >= config.max_cycles {
        tracing::warn!(
            "Registry retry budget exhausted for {}; permanently unverified",
            lead.company_name
        );
        lead.registry.checked = true;
        lead.registry.next_retry_at = None;
    } else {
        let exponent = (lead.registry.attempts - 1).min(16);
        let delay_secs = config.cycle_backoff_base_secs.saturating_mul(1i64 << exponent);
        lead.registry.next_retry_at = Some(now + ChronoDuration::seconds(delay_secs));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_doubles_and_caps() {
        let config = EnrichmentConfig::default();
        assert_eq!(backoff_delay(&config, 0), Duration::from_millis(250));
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(500));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(1_000));
        // Capped at the configured ceiling.
        assert_eq!(backoff_delay(&config, 10), Duration::from_millis(2_000));
    }

    #[test]
    fn test_failure_schedules_then_exhausts() {
        let config = EnrichmentConfig::default();
        let now = Utc::now();
        let mut lead = sample_lead();

        for cycle in 1..config.max_cycles {
            apply_failure(&mut lead, &config, now);
            assert_eq!(lead.registry.attempts, cycle);
            assert!(!lead.registry.checked);
            let expected =
                now + ChronoDuration::seconds(config.cycle_backoff_base_secs << (cycle - 1));
            assert_eq!(lead.registry.next_retry_at, Some(expected));
        }

        apply_failure(&mut lead, &config, now);
        assert!(lead.registry.checked);
        assert!(!lead.registry.verified());
        assert_eq!(lead.registry.next_retry_at, None);
    }

    fn sample_lead() -> UnifiedLead {
        use crate::models::{PriorityTier, RegistryState};
        UnifiedLead {
            identity_key: "k".to_string(),
            company_name: "Acme Manufacturing".to_string(),
            normalized_name: "acme manufacturing".to_string(),
            phone: None,
            email: None,
            address: None,
            zip: None,
            state: None,
            industry: None,
            dot_number: None,
            mc_number: None,
            monthly_shipments: None,
            sources: Vec::new(),
            field_sources: HashMap::new(),
            registry: RegistryState::unchecked(),
            score: 0.0,
            priority: PriorityTier::Low,
            conversion_probability: 0.0,
            estimated_monthly_revenue: 0.0,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            expired: false,
        }
    }
}
