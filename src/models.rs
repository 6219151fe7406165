use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// ============ Lead Ingestion Models ============

/// A raw company record as returned by one lead-source provider.
///
/// Transient: raw records live for a single ingestion cycle and are never
/// persisted past fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawLeadRecord {
    /// Provider identifier (e.g. "trucking_planet", "thomas_net").
    pub source: String,
    /// Provider-local record id, used to keep provenance append-once.
    pub source_record_id: String,
    /// Company name as the provider spells it.
    pub company_name: String,
    /// Street address line.
    pub street: Option<String>,
    /// City.
    pub city: Option<String>,
    /// Two-letter state code.
    pub state: Option<String>,
    /// Postal code.
    pub zip: Option<String>,
    /// Contact phone in whatever format the provider uses.
    pub phone: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Industry tag.
    pub industry: Option<String>,
    /// Free-text notes from the provider.
    pub notes: Option<String>,
    /// Provider-supplied estimate of monthly shipment volume.
    pub monthly_shipments: Option<f64>,
    /// US DOT number when the provider knows it.
    pub dot_number: Option<String>,
    /// Motor carrier (MC) number when the provider knows it.
    pub mc_number: Option<String>,
}

/// Canonical identity tuple produced by the normalizer.
///
/// Comparison between records from different providers happens exclusively
/// on these fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedIdentity {
    /// Folded-case company name, legal suffixes stripped, trade
    /// abbreviations expanded.
    pub company_name: String,
    /// E.164 phone (+1...) when the raw phone parsed as a valid US number.
    pub phone: Option<String>,
    /// Single-line normalized street + city + state.
    pub address: Option<String>,
    /// Five-digit zip.
    pub zip: Option<String>,
}

/// One provider's contribution to a Unified Lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribution {
    /// Provider identifier.
    pub source: String,
    /// Provider-local record id.
    pub source_record_id: String,
    /// When this contribution was observed.
    pub observed_at: DateTime<Utc>,
}

// ============ Registry Models ============

/// Safety rating assigned by the carrier regulatory registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyRating {
    Satisfactory,
    Conditional,
    Unsatisfactory,
    Unknown,
}

impl SafetyRating {
    /// Parses the registry's free-form rating string.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "satisfactory" | "s" => SafetyRating::Satisfactory,
            "conditional" | "c" => SafetyRating::Conditional,
            "unsatisfactory" | "u" => SafetyRating::Unsatisfactory,
            _ => SafetyRating::Unknown,
        }
    }
}

/// Verification block returned by the regulatory registry lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryProfile {
    /// US DOT number on file.
    pub dot_number: Option<String>,
    /// MC number on file.
    pub mc_number: Option<String>,
    /// Legal name on file; supersedes provider names when verified.
    pub legal_name: Option<String>,
    /// Whether the registry confirmed this company.
    pub verified: bool,
    /// Safety standing.
    pub safety_rating: SafetyRating,
}

/// Registry-enrichment bookkeeping carried on each Unified Lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryState {
    /// Profile merged in after a successful lookup.
    pub profile: Option<RegistryProfile>,
    /// True once the lookup reached a definitive answer (match, no-match,
    /// or the retry budget ran out).
    pub checked: bool,
    /// Ingestion cycles that attempted (and failed) the lookup so far.
    pub attempts: u32,
    /// Earliest instant the next cycle may retry. Exponential backoff.
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl RegistryState {
    pub fn unchecked() -> Self {
        Self {
            profile: None,
            checked: false,
            attempts: 0,
            next_retry_at: None,
        }
    }

    /// A lead counts as verified only with a positive registry match.
    pub fn verified(&self) -> bool {
        self.profile.as_ref().map(|p| p.verified).unwrap_or(false)
    }
}

// ============ Unified Lead ============

/// Priority tier derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PriorityTier {
    Low,
    Medium,
    High,
}

/// The deduplicated, enriched representation of one company across all
/// lead sources.
///
/// Created on first merge, updated in place on later cycles, never
/// hard-deleted; inactivity past the configured TTL soft-expires it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedLead {
    /// Stable identity key: hex SHA-256 of normalized name + zip.
    pub identity_key: String,
    /// Best-known display name (registry legal name once verified).
    pub company_name: String,
    /// Canonical name used for matching.
    pub normalized_name: String,
    /// E.164 phone.
    pub phone: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Normalized address line.
    pub address: Option<String>,
    /// Five-digit zip.
    pub zip: Option<String>,
    /// Two-letter state code.
    pub state: Option<String>,
    /// Industry tag.
    pub industry: Option<String>,
    /// US DOT number, when any source supplied one.
    pub dot_number: Option<String>,
    /// MC number, when any source supplied one.
    pub mc_number: Option<String>,
    /// Best-known monthly shipment estimate.
    pub monthly_shipments: Option<f64>,
    /// Append-only provenance: every provider record that fed this lead.
    pub sources: Vec<SourceAttribution>,
    /// Which source supplied the current value of each merged field.
    pub field_sources: HashMap<String, String>,
    /// Registry verification block.
    pub registry: RegistryState,
    /// Composite quality score in [0, 100].
    pub score: f64,
    /// Tier derived from the score.
    pub priority: PriorityTier,
    /// Modeled conversion probability, strictly in (0, 1).
    pub conversion_probability: f64,
    /// Expected-value monthly revenue estimate, not a guarantee.
    pub estimated_monthly_revenue: f64,
    /// First ingestion cycle that saw this company.
    pub first_seen: DateTime<Utc>,
    /// Most recent cycle that touched this lead.
    pub last_seen: DateTime<Utc>,
    /// Soft-expiry flag; expired leads are kept but excluded from reports.
    pub expired: bool,
}

impl UnifiedLead {
    /// Distinct providers present in provenance.
    pub fn distinct_sources(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for attribution in &self.sources {
            if !seen.contains(&attribution.source.as_str()) {
                seen.push(&attribution.source);
            }
        }
        seen
    }

    /// Display label for the lead's origin: the single provider name, or
    /// "Combined" once more than one provider contributed.
    pub fn source_label(&self) -> String {
        let distinct = self.distinct_sources();
        if distinct.len() > 1 {
            "Combined".to_string()
        } else {
            distinct.first().map(|s| s.to_string()).unwrap_or_default()
        }
    }
}

/// Filters accepted by `generate_unified_leads`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadFilters {
    pub industries: Option<Vec<String>>,
    pub states: Option<Vec<String>>,
    pub sources: Option<Vec<String>>,
    pub min_score: Option<f64>,
}

/// Aggregate statistics for one generated lead set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadGenerationStats {
    pub total_found: usize,
    pub high_priority: usize,
    pub average_score: f64,
    /// Lead count per source label (provider name or "Combined").
    pub source_breakdown: HashMap<String, usize>,
    /// Leads with a positive registry match.
    pub registry_matches: usize,
}

/// The ranked lead set plus its statistics; the payload of
/// `generate_unified_leads`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadReport {
    pub leads: Vec<UnifiedLead>,
    pub stats: LeadGenerationStats,
}

// ============ Market Data ============

/// A timestamped capture of lane market conditions.
///
/// Immutable once captured; the background refresher replaces whole
/// snapshots, it never mutates one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Lane identifier ("GA->FL").
    pub lane: String,
    /// Diesel price, $/gal.
    pub fuel_price: f64,
    /// Demand index in [0, 1].
    pub demand_index: f64,
    /// Capacity-utilization index in [0, 1].
    pub capacity_utilization: f64,
    /// Capture instant.
    pub captured_at: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Seconds elapsed since capture, saturating at zero.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.captured_at).num_seconds().max(0)
    }
}

/// Distance answer from the routing collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistanceResolution {
    /// Lane distance in miles.
    pub miles: f64,
    /// Resolution certainty in [0, 1]; routed distances are 1.0,
    /// great-circle estimates come back lower.
    pub certainty: f64,
}

// ============ Quote Models ============

/// Trailer/equipment needed for a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentType {
    DryVan,
    Reefer,
    Flatbed,
    PowerOnly,
    StepDeck,
    Lowboy,
}

impl EquipmentType {
    pub const ALL: [EquipmentType; 6] = [
        EquipmentType::DryVan,
        EquipmentType::Reefer,
        EquipmentType::Flatbed,
        EquipmentType::PowerOnly,
        EquipmentType::StepDeck,
        EquipmentType::Lowboy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentType::DryVan => "dry_van",
            EquipmentType::Reefer => "reefer",
            EquipmentType::Flatbed => "flatbed",
            EquipmentType::PowerOnly => "power_only",
            EquipmentType::StepDeck => "step_deck",
            EquipmentType::Lowboy => "lowboy",
        }
    }
}

/// Commodity class of the freight being moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommodityClass {
    GeneralFreight,
    Hazmat,
    FoodGrade,
    Pharmaceutical,
    Electronics,
}

impl CommodityClass {
    pub const ALL: [CommodityClass; 5] = [
        CommodityClass::GeneralFreight,
        CommodityClass::Hazmat,
        CommodityClass::FoodGrade,
        CommodityClass::Pharmaceutical,
        CommodityClass::Electronics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommodityClass::GeneralFreight => "general_freight",
            CommodityClass::Hazmat => "hazmat",
            CommodityClass::FoodGrade => "food_grade",
            CommodityClass::Pharmaceutical => "pharmaceutical",
            CommodityClass::Electronics => "electronics",
        }
    }

    /// Commodities whose handling carries elevated operational risk.
    pub fn hazardous(&self) -> bool {
        matches!(
            self,
            CommodityClass::Hazmat | CommodityClass::Pharmaceutical
        )
    }
}

/// One shipment request to price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// Origin as "City, ST".
    pub origin: String,
    /// Destination as "City, ST".
    pub destination: String,
    /// Shipment weight in pounds.
    pub weight_lbs: f64,
    pub equipment_type: EquipmentType,
    pub commodity_class: CommodityClass,
    pub pickup_date: NaiveDate,
    /// Declared special requirements (accessorial codes).
    #[serde(default)]
    pub special_requirements: Vec<String>,
    /// When true, a snapshot past max age fails with `StaleData` instead of
    /// degrading confidence.
    #[serde(default)]
    pub strict_freshness: bool,
}

/// Risk severity for a priced shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Deterministic, table-driven risk verdict attached to a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// Named risk factors that fired.
    pub factors: Vec<String>,
    /// One or more mitigation strategies per fired factor.
    pub mitigation_strategies: Vec<String>,
}

/// A fully itemized freight quote.
///
/// Immutable once created; callers must regenerate after `valid_until`
/// because the market inputs may have moved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteBreakdown {
    pub quote_id: Uuid,
    pub origin: String,
    pub destination: String,
    /// Market lane the snapshot was read for.
    pub lane: String,
    pub distance_miles: f64,
    pub base_rate: f64,
    pub fuel_surcharge: f64,
    pub market_adjustment: f64,
    pub seasonal_adjustment: f64,
    pub competitive_positioning: f64,
    pub accessorial_charges: f64,
    /// Sum of the six components above.
    pub total: f64,
    /// Trustworthiness of this quote in [0, 1].
    pub confidence_score: f64,
    /// (total - estimated cost) / total.
    pub profit_margin: f64,
    /// Modeled likelihood the quoted price wins against competing offers.
    pub win_probability: f64,
    pub risk_assessment: RiskAssessment,
    /// Deterministic rule-driven pricing recommendations.
    pub recommendations: Vec<String>,
    /// Age of the market snapshot used, in seconds.
    pub snapshot_age_secs: i64,
    pub created_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl QuoteBreakdown {
    /// True once the validity window has closed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }
}
