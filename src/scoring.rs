/// Composite lead scoring
///
/// Pure functions of a lead's current attributes, the scoring
/// configuration, and the evaluation instant. Identical inputs always
/// produce identical outputs; there is no hidden state and no randomness.
use crate::config::ScoringConfig;
use crate::models::{PriorityTier, UnifiedLead};
use chrono::{DateTime, Utc};

/// Industry-fit component, 0-100, from the configured table.
pub fn industry_fit(config: &ScoringConfig, industry: Option<&str>) -> f64 {
    industry
        .and_then(|tag| config.industry_fit.get(tag).copied())
        .unwrap_or(config.default_industry_fit)
}

/// Volume-signal component, 0-100.
///
/// Log-scaled so the difference between 5 and 20 loads a month matters far
/// more than the difference between 150 and 165; saturates at the
/// configured volume.
pub fn volume_signal(config: &ScoringConfig, monthly_shipments: Option<f64>) -> f64 {
    let volume = monthly_shipments.unwrap_or(0.0).max(0.0);
    let scaled = 100.0 * (1.0 + volume).ln() / (1.0 + config.volume_saturation).ln();
    scaled.clamp(0.0, 100.0)
}

/// Recency-decay component, 0-100: exponential in days since the lead was
/// last observed, with the configured half-life.
pub fn recency_decay(config: &ScoringConfig, last_seen: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (now - last_seen).num_seconds().max(0) as f64 / 86_400.0;
    100.0 * 0.5_f64.powf(days / config.half_life_days)
}

/// Source-reliability component, 0-100: configured reliability averaged
/// over the distinct providers in provenance.
pub fn source_reliability(config: &ScoringConfig, lead: &UnifiedLead) -> f64 {
    let distinct = lead.distinct_sources();
    if distinct.is_empty() {
        return config.default_source_reliability;
    }
    let sum: f64 = distinct
        .iter()
        .map(|source| {
            config
                .source_reliability
                .get(*source)
                .copied()
                .unwrap_or(config.default_source_reliability)
        })
        .sum();
    sum / distinct.len() as f64
}

/// The composite quality score, clamped to [0, 100].
///
/// Weighted sum of the five components; the weights sum to 1.0 (validated
/// at startup) and every component lives on the 0-100 scale, so the clamp
/// only guards rounding at the edges.
pub fn composite_score(lead: &UnifiedLead, config: &ScoringConfig, now: DateTime<Utc>) -> f64 {
    let verification = if lead.registry.verified() {
        config.verification_bonus
    } else {
        0.0
    };

    let score = config.w_industry_fit * industry_fit(config, lead.industry.as_deref())
        + config.w_volume * volume_signal(config, lead.monthly_shipments)
        + config.w_verification * verification
        + config.w_recency * recency_decay(config, lead.last_seen, now)
        + config.w_reliability * source_reliability(config, lead);

    score.clamp(0.0, 100.0)
}

/// Priority tier from fixed thresholds; monotonic in score by
/// construction.
pub fn priority_tier(score: f64, config: &ScoringConfig) -> PriorityTier {
    if score >= config.high_threshold {
        PriorityTier::High
    } else if score >= config.medium_threshold {
        PriorityTier::Medium
    } else {
        PriorityTier::Low
    }
}

/// Conversion probability: a logistic transform of score plus the verified
/// lift. Strictly inside (0, 1) for every finite score.
pub fn conversion_probability(score: f64, verified: bool, config: &ScoringConfig) -> f64 {
    let lift = if verified { config.verified_lift } else { 0.0 };
    let x = config.logistic_steepness * (score + lift - config.logistic_midpoint);
    1.0 / (1.0 + (-x).exp())
}

/// Expected-value revenue estimate: monthly shipments x average load value
/// x conversion probability. Zero when the volume signal is absent.
pub fn estimated_monthly_revenue(
    monthly_shipments: Option<f64>,
    probability: f64,
    config: &ScoringConfig,
) -> f64 {
    monthly_shipments.unwrap_or(0.0).max(0.0) * config.average_load_value * probability
}

/// Recomputes and stores all derived scoring fields on a lead.
pub fn apply_scores(lead: &mut UnifiedLead, config: &ScoringConfig, now: DateTime<Utc>) {
    let score = composite_score(lead, config, now);
    let probability = conversion_probability(score, lead.registry.verified(), config);
    lead.score = score;
    lead.priority = priority_tier(score, config);
    lead.conversion_probability = probability;
    lead.estimated_monthly_revenue =
        estimated_monthly_revenue(lead.monthly_shipments, probability, config);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_signal_saturates() {
        let config = ScoringConfig::default();
        assert_eq!(volume_signal(&config, None), 0.0);
        assert_eq!(volume_signal(&config, Some(config.volume_saturation)), 100.0);
        assert_eq!(volume_signal(&config, Some(config.volume_saturation * 10.0)), 100.0);
    }

    #[test]
    fn test_recency_decay_half_life() {
        let config = ScoringConfig::default();
        let now = Utc::now();
        let fresh = recency_decay(&config, now, now);
        assert!((fresh - 100.0).abs() < 1e-9);

        let one_half_life = now - chrono::Duration::days(config.half_life_days as i64);
        let decayed = recency_decay(&config, one_half_life, now);
        assert!((decayed - 50.0).abs() < 0.1);
    }

    #[test]
    fn test_tier_thresholds() {
        let config = ScoringConfig::default();
        assert_eq!(priority_tier(85.0, &config), PriorityTier::High);
        assert_eq!(priority_tier(84.9, &config), PriorityTier::Medium);
        assert_eq!(priority_tier(70.0, &config), PriorityTier::Medium);
        assert_eq!(priority_tier(69.9, &config), PriorityTier::Low);
    }
}
