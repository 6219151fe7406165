/// Quote pricing engine
///
/// One linear pipeline per request: resolve distance, price the six
/// components off the rate tables and the lane's market snapshot, then
/// attach confidence, margin, risk, and the rule-driven recommendations.
/// Any missing input is a hard failure; no partial quote is ever returned.
/// Every number here is a deterministic function of the request, the
/// configuration tables, and the snapshot.
use crate::config::PricingConfig;
use crate::errors::AppError;
use crate::market::{lane_id, MarketStore};
use crate::models::{
    EquipmentType, MarketSnapshot, QuoteBreakdown, QuoteRequest, RiskAssessment, RiskLevel,
};
use crate::services::{MarketDataClient, RoutingClient};
use chrono::{Datelike, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use uuid::Uuid;

pub struct QuotePricingEngine {
    config: PricingConfig,
    routing: Arc<RoutingClient>,
    market_client: Arc<MarketDataClient>,
    market: Arc<MarketStore>,
}

impl QuotePricingEngine {
    pub fn new(
        config: PricingConfig,
        routing: Arc<RoutingClient>,
        market_client: Arc<MarketDataClient>,
        market: Arc<MarketStore>,
    ) -> Self {
        Self {
            config,
            routing,
            market_client,
            market,
        }
    }

    /// Prices one shipment request.
    pub async fn generate_quote(&self, request: &QuoteRequest) -> Result<QuoteBreakdown, AppError> {
        validate_request(request)?;

        // Accessorials are validated before any external call so a typo'd
        // requirement fails fast instead of after a routing round-trip.
        let accessorial_charges = self.accessorial_charges(&request.special_requirements)?;

        let lane = lane_id(&request.origin, &request.destination);

        let distance = self
            .routing
            .resolve_distance(&request.origin, &request.destination)
            .await?;

        let snapshot = self
            .market
            .get_or_fetch(&lane, &self.market_client)
            .await?;

        let now = Utc::now();
        let snapshot_age_secs = snapshot.age_secs(now);

        if request.strict_freshness && snapshot_age_secs > self.config.stale_max_age_secs {
            return Err(AppError::StaleData(format!(
                "market snapshot for lane {} is {}s old (max {}s)",
                lane, snapshot_age_secs, self.config.stale_max_age_secs
            )));
        }

        let per_mile = self
            .config
            .rate_table
            .get(&(request.equipment_type, request.commodity_class))
            .copied()
            .ok_or_else(|| {
                AppError::RateUnavailable(format!(
                    "no rate on file for {} / {}",
                    request.equipment_type.as_str(),
                    request.commodity_class.as_str()
                ))
            })?;

        let base_rate = distance.miles * per_mile;
        let fuel_surcharge = base_rate
            * self.config.fuel_surcharge_fraction
            * (snapshot.fuel_price / self.config.baseline_fuel_price);
        let market_adjustment = base_rate * demand_capacity_delta(&self.config, &snapshot);

        let origin_state = state_token(&request.origin);
        let month_index = request.pickup_date.month0() as usize;
        let seasonal_adjustment =
            base_rate * (seasonal_factor(&self.config, month_index, origin_state.as_deref()) - 1.0);

        let subtotal = base_rate + fuel_surcharge + market_adjustment + seasonal_adjustment;
        let market_average_total = self.config.market_average_per_mile * distance.miles;
        let competitive_positioning =
            competitive_positioning(&self.config, subtotal, market_average_total, base_rate);

        let total = base_rate
            + fuel_surcharge
            + market_adjustment
            + seasonal_adjustment
            + competitive_positioning
            + accessorial_charges;

        let win_probability = win_probability(&self.config, total, market_average_total);

        let coverage = coverage_quality(&request.origin, &request.destination);
        let confidence_score =
            confidence_score(&self.config, distance.certainty, snapshot_age_secs, coverage);

        let cost_ratio = self
            .config
            .cost_benchmark
            .get(&request.commodity_class)
            .copied()
            .unwrap_or(0.85);
        let estimated_cost =
            base_rate * cost_ratio + fuel_surcharge * self.config.fuel_cost_passthrough;
        let profit_margin = if total > 0.0 {
            (total - estimated_cost) / total
        } else {
            0.0
        };

        let risk_assessment = assess_risk(
            &self.config,
            &snapshot,
            request.commodity_class,
            snapshot_age_secs,
        );
        let recommendations = recommendations(
            &self.config,
            &snapshot,
            request.equipment_type,
            win_probability,
            month_index,
        );

        let quote = QuoteBreakdown {
            quote_id: Uuid::new_v4(),
            origin: request.origin.clone(),
            destination: request.destination.clone(),
            lane,
            distance_miles: distance.miles,
            base_rate,
            fuel_surcharge,
            market_adjustment,
            seasonal_adjustment,
            competitive_positioning,
            accessorial_charges,
            total,
            confidence_score,
            profit_margin,
            win_probability,
            risk_assessment,
            recommendations,
            snapshot_age_secs,
            created_at: now,
            valid_until: now + ChronoDuration::hours(self.config.quote_valid_hours),
        };

        tracing::info!(
            "Quote {} for {} -> {}: total ${:.2}, confidence {:.2}",
            quote.quote_id,
            quote.origin,
            quote.destination,
            quote.total,
            quote.confidence_score
        );

        Ok(quote)
    }

    fn accessorial_charges(&self, requirements: &[String]) -> Result<f64, AppError> {
        let mut sum = 0.0;
        for code in requirements {
            match self.config.accessorial_table.get(code) {
                Some(charge) => sum += charge,
                None => {
                    return Err(AppError::Validation(format!(
                        "unknown special requirement '{}'",
                        code
                    )))
                }
            }
        }
        Ok(sum)
    }
}

fn validate_request(request: &QuoteRequest) -> Result<(), AppError> {
    if request.origin.trim().is_empty() || request.destination.trim().is_empty() {
        return Err(AppError::Validation(
            "origin and destination are required".to_string(),
        ));
    }
    if !request.weight_lbs.is_finite() || request.weight_lbs <= 0.0 {
        return Err(AppError::Validation(format!(
            "weight must be positive, got {}",
            request.weight_lbs
        )));
    }
    Ok(())
}

fn state_token(place: &str) -> Option<String> {
    place
        .trim()
        .rsplit(|c: char| c == ',' || c.is_whitespace())
        .next()
        .filter(|token| token.len() == 2 && token.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|token| token.to_uppercase())
}

/// Market adjustment fraction: the base premium, tilted by the demand
/// bands and bumped when capacity is tight.
pub fn demand_capacity_delta(config: &PricingConfig, snapshot: &MarketSnapshot) -> f64 {
    let mut delta = config.market_base_premium;
    if snapshot.demand_index > config.demand_high {
        delta += config.demand_tilt;
    } else if snapshot.demand_index < config.demand_low {
        delta -= config.demand_tilt;
    }
    if snapshot.capacity_utilization > config.tight_capacity_threshold {
        delta += config.tight_capacity_premium;
    }
    delta
}

/// Seasonal multiplier for a pickup month, with the produce-season bump
/// for configured origin states.
pub fn seasonal_factor(config: &PricingConfig, month_index: usize, origin_state: Option<&str>) -> f64 {
    let mut factor = config.month_factors[month_index.min(11)];
    if let Some(state) = origin_state {
        // June through September.
        if (5..=8).contains(&month_index)
            && config.produce_states.iter().any(|s| s == state)
        {
            factor += config.produce_season_bump;
        }
    }
    factor
}

/// Win probability of a price against the lane's market average: logistic
/// in the relative price gap, steeper per configuration. Pricing exactly
/// at market wins half the time.
pub fn win_probability(config: &PricingConfig, price: f64, market_average: f64) -> f64 {
    if market_average <= 0.0 {
        return 0.5;
    }
    let gap = (price - market_average) / market_average;
    1.0 / (1.0 + (config.win_steepness * gap).exp())
}

/// Competitive positioning: the signed nudge that moves the subtotal a
/// configured fraction toward the price that would hit the target win
/// probability, clamped to the maximum swing.
pub fn competitive_positioning(
    config: &PricingConfig,
    subtotal: f64,
    market_average: f64,
    base_rate: f64,
) -> f64 {
    if market_average <= 0.0 {
        return 0.0;
    }
    // Invert the win-probability logistic at the target.
    let target = config.target_win_probability.clamp(0.01, 0.99);
    let target_price =
        market_average * (1.0 + (1.0 / target - 1.0).ln() / config.win_steepness);

    let nudge = (target_price - subtotal) * config.positioning_blend;
    let max_swing = base_rate * config.positioning_max_swing;
    nudge.clamp(-max_swing, max_swing)
}

/// Coverage-quality component of confidence: penalized when a state code
/// could not be read off an endpoint (the seasonal and market tables are
/// keyed by state).
fn coverage_quality(origin: &str, destination: &str) -> f64 {
    let mut coverage = 1.0;
    if state_token(origin).is_none() {
        coverage -= 0.15;
    }
    if state_token(destination).is_none() {
        coverage -= 0.15;
    }
    coverage
}

/// Quote confidence in [0, 1]: weighted blend of distance-resolution
/// certainty, snapshot freshness, and table coverage.
///
/// Freshness is 1.0 up to the freshness threshold and decays
/// exponentially past it, so confidence is non-increasing in snapshot
/// age. Once the snapshot is past max age the result is additionally
/// capped strictly below the documented stale ceiling.
pub fn confidence_score(
    config: &PricingConfig,
    distance_certainty: f64,
    snapshot_age_secs: i64,
    coverage: f64,
) -> f64 {
    let freshness = if snapshot_age_secs <= config.freshness_threshold_secs {
        1.0
    } else {
        let excess = (snapshot_age_secs - config.freshness_threshold_secs) as f64;
        (-excess / config.freshness_tau_secs).exp()
    };

    let blended = config.confidence_w_distance * distance_certainty.clamp(0.0, 1.0)
        + config.confidence_w_freshness * freshness
        + config.confidence_w_coverage * coverage.clamp(0.0, 1.0);

    let score = if snapshot_age_secs > config.stale_max_age_secs {
        // Strictly below the ceiling, per the documented degradation.
        blended.min(config.stale_confidence_ceiling - 0.01)
    } else {
        blended
    };

    score.clamp(0.0, 1.0)
}

/// Deterministic, table-driven risk assessment.
pub fn assess_risk(
    config: &PricingConfig,
    snapshot: &MarketSnapshot,
    commodity: crate::models::CommodityClass,
    snapshot_age_secs: i64,
) -> RiskAssessment {
    let mut factors: Vec<String> = Vec::new();

    if snapshot.fuel_price > config.fuel_risk_threshold {
        factors.push("high_fuel_prices".to_string());
    }
    if snapshot.capacity_utilization > config.capacity_risk_threshold {
        factors.push("capacity_constraints".to_string());
    }
    if (snapshot.demand_index - snapshot.capacity_utilization).abs()
        > config.volatility_gap_threshold
    {
        factors.push("lane_volatility".to_string());
    }
    if commodity.hazardous() {
        factors.push("commodity_hazard".to_string());
    }
    if snapshot_age_secs > config.stale_max_age_secs {
        factors.push("stale_market_data".to_string());
    }

    let hazard_and_tight = factors.iter().any(|f| f == "commodity_hazard")
        && factors.iter().any(|f| f == "capacity_constraints");
    let level = if factors.len() >= 3 || hazard_and_tight {
        RiskLevel::High
    } else if !factors.is_empty() {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    };

    let mitigation_strategies = factors
        .iter()
        .flat_map(|factor| mitigation_for(factor))
        .map(|s| s.to_string())
        .collect();

    RiskAssessment {
        level,
        factors,
        mitigation_strategies,
    }
}

fn mitigation_for(factor: &str) -> &'static [&'static str] {
    match factor {
        "high_fuel_prices" => &[
            "Apply dynamic fuel surcharge adjustments",
            "Prefer fuel-efficient routing",
        ],
        "capacity_constraints" => &[
            "Pre-book capacity with preferred carriers",
            "Offer premium rates for urgent pickups",
        ],
        "lane_volatility" => &[
            "Shorten the quote validity window",
            "Re-check lane conditions before booking",
        ],
        "commodity_hazard" => &[
            "Confirm carrier certification and insurance limits",
            "Verify handling requirements before dispatch",
        ],
        "stale_market_data" => &["Regenerate the quote once fresh market data lands"],
        _ => &[],
    }
}

/// Deterministic pricing recommendations. Every rule is named
/// configuration; nothing here is inferred at runtime.
pub fn recommendations(
    config: &PricingConfig,
    snapshot: &MarketSnapshot,
    equipment: EquipmentType,
    win_probability: f64,
    month_index: usize,
) -> Vec<String> {
    let mut out = Vec::new();

    if snapshot.demand_index > config.demand_premium_threshold {
        out.push("Consider premium pricing due to high market demand".to_string());
    }
    if win_probability > config.maintain_win_threshold {
        out.push("High win probability - maintain competitive pricing".to_string());
    } else if win_probability < config.discount_win_threshold {
        out.push("Consider strategic discounting to improve win probability".to_string());
    }
    if equipment == EquipmentType::Reefer
        && snapshot.capacity_utilization > config.reefer_capacity_threshold
    {
        out.push("Reefer capacity is tight - leverage for premium pricing".to_string());
    }
    // December / January.
    if month_index == 11 || month_index == 0 {
        out.push("Holiday season - expect premium pricing opportunities".to_string());
    }

    out
}
