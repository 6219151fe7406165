use crate::models::{CommodityClass, EquipmentType};
use std::collections::HashMap;

/// Token-set similarity a fuzzy name match must reach before two records
/// may merge (spec'd together with a phone or address match).
pub const FUZZY_NAME_THRESHOLD: f64 = 0.8;

/// Top-level application configuration.
///
/// Collaborator endpoints come from the environment and are validated at
/// startup; the rule/rate tables carry documented defaults and the handful
/// of tunables that operators actually adjust can be overridden via env.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// TruckingPlanet-style carrier/shipper network directory.
    pub trucking_planet_base_url: String,
    pub trucking_planet_api_key: String,
    /// ThomasNet-style industrial supplier directory.
    pub thomas_net_base_url: String,
    pub thomas_net_api_key: String,
    /// Carrier regulatory registry (FMCSA-style).
    pub registry_base_url: String,
    pub registry_api_key: Option<String>,
    /// Lane distance resolver.
    pub routing_base_url: String,
    /// Market conditions feed.
    pub market_feed_base_url: String,
    pub fusion: FusionConfig,
    pub scoring: ScoringConfig,
    pub pricing: PricingConfig,
    pub enrichment: EnrichmentConfig,
    /// Background market refresh cadence, seconds.
    pub market_refresh_secs: u64,
    /// Days of inactivity before a Unified Lead soft-expires.
    pub lead_ttl_days: i64,
}

/// Deduplication & fusion tunables.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Minimum token-set similarity for the secondary fuzzy match.
    pub fuzzy_name_threshold: f64,
    /// Field-conflict priority, strongest first. Registry-verified data
    /// outranks every entry here; "most recently observed" breaks ties.
    pub source_priority: Vec<String>,
    /// Capacity of the bounded queue between the normalize and fusion
    /// stages.
    pub queue_capacity: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            fuzzy_name_threshold: FUZZY_NAME_THRESHOLD,
            source_priority: vec!["trucking_planet".to_string(), "thomas_net".to_string()],
            queue_capacity: 256,
        }
    }
}

/// Weights and tables for the composite scoring engine.
///
/// The five component weights sum to 1.0 and `validate` enforces it, so a
/// score stays in [0, 100] as long as every component does.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub w_industry_fit: f64,
    pub w_volume: f64,
    pub w_verification: f64,
    pub w_recency: f64,
    pub w_reliability: f64,
    /// Fixed component value granted iff the lead is registry-verified.
    pub verification_bonus: f64,
    /// Half-life (days) of the recency-decay component.
    pub half_life_days: f64,
    /// Score at or above which a lead is HIGH priority.
    pub high_threshold: f64,
    /// Score at or above which a lead is MEDIUM priority.
    pub medium_threshold: f64,
    /// Logistic steepness for conversion probability.
    pub logistic_steepness: f64,
    /// Logistic midpoint (score with 50% conversion probability).
    pub logistic_midpoint: f64,
    /// Score-equivalent lift a verified lead gets inside the logistic.
    pub verified_lift: f64,
    /// Average gross revenue per load, used for the revenue estimate.
    pub average_load_value: f64,
    /// Industry tag -> fit score (0-100).
    pub industry_fit: HashMap<String, f64>,
    /// Fit score for industries missing from the table.
    pub default_industry_fit: f64,
    /// Provider -> reliability score (0-100).
    pub source_reliability: HashMap<String, f64>,
    /// Reliability for providers missing from the table.
    pub default_source_reliability: f64,
    /// Monthly shipments at which the volume signal saturates at 100.
    pub volume_saturation: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let industry_fit = [
            ("manufacturing", 90.0),
            ("food_and_beverage", 85.0),
            ("automotive", 85.0),
            ("construction", 80.0),
            ("retail", 75.0),
            ("chemicals", 70.0),
            ("agriculture", 70.0),
            ("pharmaceuticals", 65.0),
            ("technology", 55.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let source_reliability = [("trucking_planet", 80.0), ("thomas_net", 70.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        Self {
            w_industry_fit: 0.25,
            w_volume: 0.30,
            w_verification: 0.15,
            w_recency: 0.20,
            w_reliability: 0.10,
            verification_bonus: 100.0,
            half_life_days: 30.0,
            high_threshold: 85.0,
            medium_threshold: 70.0,
            logistic_steepness: 0.08,
            logistic_midpoint: 55.0,
            verified_lift: 5.0,
            average_load_value: 2_500.0,
            industry_fit,
            default_industry_fit: 50.0,
            source_reliability,
            default_source_reliability: 60.0,
            volume_saturation: 200.0,
        }
    }
}

impl ScoringConfig {
    /// Sum of the five component weights; documented to be 1.0.
    pub fn weight_sum(&self) -> f64 {
        self.w_industry_fit + self.w_volume + self.w_verification + self.w_recency
            + self.w_reliability
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let sum = self.weight_sum();
        if (sum - 1.0).abs() > 1e-9 {
            anyhow::bail!("scoring weights must sum to 1.0, got {}", sum);
        }
        if self.half_life_days <= 0.0 {
            anyhow::bail!("recency half-life must be positive");
        }
        if self.medium_threshold > self.high_threshold {
            anyhow::bail!("MEDIUM threshold cannot exceed HIGH threshold");
        }
        Ok(())
    }
}

/// Rate tables, adjustment factors and rule thresholds for the quote
/// pricing engine. All values here are deliberate configuration, not
/// anything inferred at runtime.
#[derive(Debug, Clone)]
pub struct PricingConfig {
    /// Per-mile linehaul rate by equipment and commodity. A missing entry
    /// means the combination is not quotable (`RateUnavailable`).
    pub rate_table: HashMap<(EquipmentType, CommodityClass), f64>,
    /// Diesel $/gal at which the fuel surcharge equals its base fraction.
    pub baseline_fuel_price: f64,
    /// Fuel surcharge as a fraction of linehaul at the baseline price.
    pub fuel_surcharge_fraction: f64,
    /// Baseline market premium applied to every lane.
    pub market_base_premium: f64,
    /// Demand index above which the premium tilts up.
    pub demand_high: f64,
    /// Demand index below which the premium tilts down.
    pub demand_low: f64,
    /// Size of the demand tilt.
    pub demand_tilt: f64,
    /// Capacity utilization above which the tight-capacity bump applies.
    pub tight_capacity_threshold: f64,
    pub tight_capacity_premium: f64,
    /// Historical seasonality factors, January first.
    pub month_factors: [f64; 12],
    /// Origin states that get the produce-season bump.
    pub produce_states: Vec<String>,
    /// Added to the month factor for produce states, June through September.
    pub produce_season_bump: f64,
    /// Published market average linehaul rate, $/mile.
    pub market_average_per_mile: f64,
    /// Logistic steepness of win probability in the relative price gap.
    pub win_steepness: f64,
    /// Win probability the competitive positioning step aims for.
    pub target_win_probability: f64,
    /// Fraction of the gap to the target price the positioning step moves.
    pub positioning_blend: f64,
    /// Positioning never moves the price more than this fraction of base.
    pub positioning_max_swing: f64,
    /// Accessorial code -> flat charge.
    pub accessorial_table: HashMap<String, f64>,
    /// Commodity -> carrier-cost benchmark as a fraction of base rate.
    pub cost_benchmark: HashMap<CommodityClass, f64>,
    /// Fraction of the fuel surcharge passed through as cost.
    pub fuel_cost_passthrough: f64,
    pub confidence_w_distance: f64,
    pub confidence_w_freshness: f64,
    pub confidence_w_coverage: f64,
    /// Snapshot age (seconds) under which freshness is perfect.
    pub freshness_threshold_secs: i64,
    /// Exponential time constant of freshness decay past the threshold.
    pub freshness_tau_secs: f64,
    /// Snapshot age past which the quote confidence is capped.
    pub stale_max_age_secs: i64,
    /// Documented confidence ceiling for quotes priced off stale data.
    pub stale_confidence_ceiling: f64,
    /// Quote validity window, hours.
    pub quote_valid_hours: i64,
    // Risk rule thresholds.
    pub fuel_risk_threshold: f64,
    pub capacity_risk_threshold: f64,
    pub volatility_gap_threshold: f64,
    // Recommendation rule thresholds.
    pub demand_premium_threshold: f64,
    pub maintain_win_threshold: f64,
    pub discount_win_threshold: f64,
    pub reefer_capacity_threshold: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        // Dry-van general freight anchors the table; the other entries are
        // that anchor scaled by equipment and commodity multipliers, stored
        // explicitly so coverage gaps stay visible. Food-grade and pharma
        // loads are not quotable on open-deck equipment.
        let base: f64 = 2.50;
        let equipment_mult = [
            (EquipmentType::DryVan, 1.00),
            (EquipmentType::Reefer, 1.25),
            (EquipmentType::Flatbed, 1.15),
            (EquipmentType::PowerOnly, 0.85),
            (EquipmentType::StepDeck, 1.20),
            (EquipmentType::Lowboy, 1.35),
        ];
        let commodity_mult = [
            (CommodityClass::GeneralFreight, 1.00),
            (CommodityClass::Hazmat, 1.40),
            (CommodityClass::FoodGrade, 1.20),
            (CommodityClass::Pharmaceutical, 1.30),
            (CommodityClass::Electronics, 1.15),
        ];
        let open_deck = [
            EquipmentType::Flatbed,
            EquipmentType::PowerOnly,
            EquipmentType::StepDeck,
            EquipmentType::Lowboy,
        ];
        let mut rate_table = HashMap::new();
        for (equipment, em) in equipment_mult {
            for (commodity, cm) in commodity_mult {
                let protected = matches!(
                    commodity,
                    CommodityClass::FoodGrade | CommodityClass::Pharmaceutical
                );
                if protected && open_deck.contains(&equipment) {
                    continue;
                }
                let rate = (base * em * cm * 100.0).round() / 100.0;
                rate_table.insert((equipment, commodity), rate);
            }
        }

        let accessorial_table = [
            ("hazmat", 350.0),
            ("temperature_control", 250.0),
            ("team_service", 500.0),
            ("liftgate", 75.0),
            ("residential", 120.0),
            ("inside_delivery", 90.0),
            ("detention", 65.0),
            ("tarp", 85.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        let cost_benchmark = [
            (CommodityClass::GeneralFreight, 0.82),
            (CommodityClass::Hazmat, 0.86),
            (CommodityClass::FoodGrade, 0.84),
            (CommodityClass::Pharmaceutical, 0.85),
            (CommodityClass::Electronics, 0.83),
        ]
        .into_iter()
        .collect();

        Self {
            rate_table,
            baseline_fuel_price: 3.00,
            fuel_surcharge_fraction: 0.18,
            market_base_premium: 0.12,
            demand_high: 0.85,
            demand_low: 0.60,
            demand_tilt: 0.03,
            tight_capacity_threshold: 0.80,
            tight_capacity_premium: 0.04,
            month_factors: [
                1.15, 1.10, 1.05, 1.00, 0.95, 0.90, 0.85, 0.90, 0.95, 1.00, 1.10, 1.20,
            ],
            produce_states: vec![
                "FL".to_string(),
                "CA".to_string(),
                "GA".to_string(),
                "WA".to_string(),
            ],
            produce_season_bump: 0.08,
            market_average_per_mile: 2.75,
            win_steepness: 8.0,
            target_win_probability: 0.60,
            positioning_blend: 0.35,
            positioning_max_swing: 0.08,
            accessorial_table,
            cost_benchmark,
            fuel_cost_passthrough: 0.90,
            confidence_w_distance: 0.35,
            confidence_w_freshness: 0.40,
            confidence_w_coverage: 0.25,
            freshness_threshold_secs: 900,
            freshness_tau_secs: 1800.0,
            stale_max_age_secs: 3600,
            stale_confidence_ceiling: 0.5,
            quote_valid_hours: 48,
            fuel_risk_threshold: 4.00,
            capacity_risk_threshold: 0.90,
            volatility_gap_threshold: 0.25,
            demand_premium_threshold: 0.80,
            maintain_win_threshold: 0.85,
            discount_win_threshold: 0.40,
            reefer_capacity_threshold: 0.85,
        }
    }
}

/// Registry enrichment pool and retry tunables.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Concurrent registry lookups allowed in flight.
    pub max_parallel: usize,
    /// Per-call timeout, seconds.
    pub call_timeout_secs: u64,
    /// In-cycle attempts per lookup before degrading the lead.
    pub max_call_attempts: u32,
    /// In-cycle backoff: base * 2^attempt milliseconds.
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    /// Cycles a lead may fail enrichment before it is permanently marked
    /// unverified.
    pub max_cycles: u32,
    /// Across-cycle backoff base: next_retry_at = now + base * 2^attempts.
    pub cycle_backoff_base_secs: i64,
    /// Registry profile cache TTL, seconds.
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            max_parallel: 8,
            call_timeout_secs: 10,
            max_call_attempts: 3,
            backoff_base_ms: 250,
            backoff_cap_ms: 2_000,
            max_cycles: 5,
            cycle_backoff_base_secs: 300,
            cache_ttl_secs: 86_400,
            cache_capacity: 50_000,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            trucking_planet_base_url: required_url("TRUCKING_PLANET_BASE_URL")?,
            trucking_planet_api_key: required_var("TRUCKING_PLANET_API_KEY")?,
            thomas_net_base_url: required_url("THOMAS_NET_BASE_URL")?,
            thomas_net_api_key: required_var("THOMAS_NET_API_KEY")?,
            registry_base_url: required_url("CARRIER_REGISTRY_BASE_URL")?,
            registry_api_key: std::env::var("CARRIER_REGISTRY_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            routing_base_url: required_url("ROUTING_BASE_URL")?,
            market_feed_base_url: required_url("MARKET_FEED_BASE_URL")?,
            fusion: FusionConfig {
                fuzzy_name_threshold: env_f64("FUZZY_NAME_THRESHOLD")
                    .unwrap_or(FUZZY_NAME_THRESHOLD),
                ..FusionConfig::default()
            },
            scoring: ScoringConfig {
                half_life_days: env_f64("SCORE_HALF_LIFE_DAYS")
                    .unwrap_or(ScoringConfig::default().half_life_days),
                ..ScoringConfig::default()
            },
            pricing: PricingConfig {
                quote_valid_hours: env_i64("QUOTE_VALID_HOURS")
                    .unwrap_or(PricingConfig::default().quote_valid_hours),
                stale_max_age_secs: env_i64("MARKET_MAX_AGE_SECS")
                    .unwrap_or(PricingConfig::default().stale_max_age_secs),
                ..PricingConfig::default()
            },
            enrichment: EnrichmentConfig {
                max_parallel: env_i64("ENRICH_MAX_PARALLEL")
                    .map(|v| v.max(1) as usize)
                    .unwrap_or(EnrichmentConfig::default().max_parallel),
                ..EnrichmentConfig::default()
            },
            market_refresh_secs: env_i64("MARKET_REFRESH_SECS")
                .map(|v| v.max(30) as u64)
                .unwrap_or(900),
            lead_ttl_days: env_i64("LEAD_TTL_DAYS").unwrap_or(90),
        };

        config.scoring.validate()?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Registry base URL: {}", config.registry_base_url);
        tracing::debug!("Routing base URL: {}", config.routing_base_url);
        tracing::debug!("Market feed base URL: {}", config.market_feed_base_url);
        tracing::debug!("Server port: {}", config.port);

        Ok(config)
    }

    /// Config with all-default tables and placeholder endpoints; the
    /// integration tests point the URLs at mock servers.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            trucking_planet_base_url: "http://localhost:0".to_string(),
            trucking_planet_api_key: "test".to_string(),
            thomas_net_base_url: "http://localhost:0".to_string(),
            thomas_net_api_key: "test".to_string(),
            registry_base_url: "http://localhost:0".to_string(),
            registry_api_key: None,
            routing_base_url: "http://localhost:0".to_string(),
            market_feed_base_url: "http://localhost:0".to_string(),
            fusion: FusionConfig::default(),
            scoring: ScoringConfig::default(),
            pricing: PricingConfig::default(),
            enrichment: EnrichmentConfig::default(),
            market_refresh_secs: 900,
            lead_ttl_days: 90,
        }
    }
}

fn required_var(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn required_url(name: &str) -> anyhow::Result<String> {
    required_var(name).and_then(|url| {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("{} must start with http:// or https://", name);
        }
        Ok(url)
    })
}

fn env_f64(name: &str) -> Option<f64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_i64(name: &str) -> Option<i64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
