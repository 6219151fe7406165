/// Deduplication & fusion of normalized lead records
///
/// The primary identity key is a SHA-256 over normalized name + zip; exact
/// key matches merge unconditionally. Near-misses merge through the
/// secondary fuzzy path: token-set name similarity at or above the
/// configured threshold, corroborated by a phone or address match.
/// Field conflicts resolve by source priority (registry-verified data
/// outranks every provider), with most-recently-observed as the tie-break.
use crate::config::FusionConfig;
use crate::models::{
    NormalizedIdentity, PriorityTier, RawLeadRecord, RegistryState, SourceAttribution,
    UnifiedLead,
};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Rank reserved for registry-verified field values; always wins.
const REGISTRY_SOURCE: &str = "registry";

/// Stable identity key for a company: hex SHA-256 of normalized name and
/// five-digit zip.
pub fn identity_key(normalized_name: &str, zip: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_name.as_bytes());
    hasher.update(b":");
    hasher.update(zip.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Token-set similarity between two normalized names.
///
/// Overlap coefficient: |A ∩ B| / min(|A|, |B|). Chosen over plain Jaccard
/// so that "acme manufacturing" still scores 1.0 against
/// "acme manufacturing group" — provider listings habitually append filler
/// tokens that must not defeat a merge.
pub fn token_set_similarity(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<&str> = a.split_whitespace().collect();
    let set_b: std::collections::HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count() as f64;
    intersection / set_a.len().min(set_b.len()) as f64
}

/// Counts of what one fusion pass did, for cycle logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FusionOutcome {
    pub created: usize,
    pub merged: usize,
}

pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    /// Fuses one cycle's normalized records into the existing Unified Lead
    /// set. Single-pass, pure over its inputs; idempotent for an unchanged
    /// batch and instant.
    pub fn fuse_into(
        &self,
        leads: &mut HashMap<String, UnifiedLead>,
        batch: &[(RawLeadRecord, NormalizedIdentity)],
        now: DateTime<Utc>,
    ) -> FusionOutcome {
        let mut outcome = FusionOutcome::default();

        for (raw, identity) in batch {
            let key = identity_key(&identity.company_name, identity.zip.as_deref());

            let target_key = if leads.contains_key(&key) {
                Some(key.clone())
            } else {
                self.fuzzy_match(leads, identity)
            };

            match target_key {
                Some(existing_key) => {
                    if let Some(lead) = leads.get_mut(&existing_key) {
                        self.merge_record(lead, raw, identity, now);
                        outcome.merged += 1;
                    }
                }
                None => {
                    let lead = self.new_lead(key.clone(), raw, identity, now);
                    leads.insert(key, lead);
                    outcome.created += 1;
                }
            }
        }

        outcome
    }

    /// Secondary match: a corroborating phone or address hit plus name
    /// similarity at or above the configured threshold. When several leads
    /// qualify, the highest similarity wins with the identity key as a
    /// tie-break, so the outcome never depends on map iteration order.
    fn fuzzy_match(
        &self,
        leads: &HashMap<String, UnifiedLead>,
        identity: &NormalizedIdentity,
    ) -> Option<String> {
        let mut best: Option<(f64, &String)> = None;

        for (key, lead) in leads {
            let phone_match = match (&identity.phone, &lead.phone) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            let address_match = match (&identity.address, &lead.address) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
            if !(phone_match || address_match) {
                continue;
            }

            let similarity = token_set_similarity(&identity.company_name, &lead.normalized_name);
            if similarity < self.config.fuzzy_name_threshold {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_sim, best_key)) => {
                    similarity > best_sim || (similarity == best_sim && key < best_key)
                }
            };
            if better {
                best = Some((similarity, key));
            }
        }

        best.map(|(similarity, key)| {
            tracing::debug!(
                "Fuzzy merge: '{}' (similarity {:.2})",
                identity.company_name,
                similarity
            );
            key.clone()
        })
    }

    fn new_lead(
        &self,
        key: String,
        raw: &RawLeadRecord,
        identity: &NormalizedIdentity,
        now: DateTime<Utc>,
    ) -> UnifiedLead {
        let mut lead = UnifiedLead {
            identity_key: key,
            company_name: raw.company_name.trim().to_string(),
            normalized_name: identity.company_name.clone(),
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
            first_seen: now,
            last_seen: now,
            expired: false,
        };
        self.merge_record(&mut lead, raw, identity, now);
        lead
    }

    /// Merges one record's fields into a lead under the source-priority
    /// rules and appends provenance.
    fn merge_record(
        &self,
        lead: &mut UnifiedLead,
        raw: &RawLeadRecord,
        identity: &NormalizedIdentity,
        now: DateTime<Utc>,
    ) {
        // Provenance is append-once per (source, record id); no source is
        // ever overwritten.
        let already_attributed = lead
            .sources
            .iter()
            .any(|a| a.source == raw.source && a.source_record_id == raw.source_record_id);
        if !already_attributed {
            lead.sources.push(SourceAttribution {
                source: raw.source.clone(),
                source_record_id: raw.source_record_id.clone(),
                observed_at: now,
            });
        }

        let source = raw.source.as_str();
        let display_name = raw.company_name.trim().to_string();
        self.update_field(lead, "company_name", Some(display_name), source, |l, v| {
            l.company_name = v
        });
        self.update_field(lead, "phone", identity.phone.clone(), source, |l, v| {
            l.phone = Some(v)
        });
        self.update_field(lead, "email", raw.email.clone(), source, |l, v| {
            l.email = Some(v)
        });
        self.update_field(lead, "address", identity.address.clone(), source, |l, v| {
            l.address = Some(v)
        });
        self.update_field(lead, "zip", identity.zip.clone(), source, |l, v| {
            l.zip = Some(v)
        });
        self.update_field(
            lead,
            "state",
            raw.state.as_deref().map(|s| s.trim().to_uppercase()),
            source,
            |l, v| l.state = Some(v),
        );
        self.update_field(
            lead,
            "industry",
            raw.industry.as_deref().map(normalize_industry_tag),
            source,
            |l, v| l.industry = Some(v),
        );
        self.update_field(lead, "dot_number", raw.dot_number.clone(), source, |l, v| {
            l.dot_number = Some(v)
        });
        self.update_field(lead, "mc_number", raw.mc_number.clone(), source, |l, v| {
            l.mc_number = Some(v)
        });
        if let Some(volume) = raw.monthly_shipments {
            if self.should_replace(lead, "monthly_shipments", source) {
                lead.monthly_shipments = Some(volume);
                lead.field_sources
                    .insert("monthly_shipments".to_string(), source.to_string());
            }
        }

        lead.last_seen = now;
        lead.expired = false;
    }

    fn update_field<F>(
        &self,
        lead: &mut UnifiedLead,
        field: &str,
        value: Option<String>,
        source: &str,
        apply: F,
    ) where
        F: FnOnce(&mut UnifiedLead, String),
    {
        let Some(value) = value else { return };
        if value.is_empty() {
            return;
        }
        if self.should_replace(lead, field, source) {
            apply(lead, value);
            lead.field_sources
                .insert(field.to_string(), source.to_string());
        }
    }

    /// Whether `source` may overwrite the current value of `field`:
    /// strictly-higher priority always wins, equal priority defers to the
    /// most recent observation, lower priority never overwrites.
    fn should_replace(&self, lead: &UnifiedLead, field: &str, source: &str) -> bool {
        match lead.field_sources.get(field) {
            None => true,
            Some(current) => self.source_rank(source) <= self.source_rank(current),
        }
    }

    /// Lower rank = higher priority. Registry-verified data is rank 0;
    /// configured providers follow in order; unknown sources trail.
    fn source_rank(&self, source: &str) -> usize {
        if source == REGISTRY_SOURCE {
            return 0;
        }
        self.config
            .source_priority
            .iter()
            .position(|s| s == source)
            .map(|i| i + 1)
            .unwrap_or(self.config.source_priority.len() + 1)
    }
}

fn normalize_industry_tag(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}
