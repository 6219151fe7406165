/// Unit tests for the quote pricing engine's pure parts
/// Rate table coverage, confidence behavior, win probability, risk rules,
/// and the recommendation rules
use chrono::Utc;
use rust_broker_api::config::PricingConfig;
use rust_broker_api::models::{CommodityClass, EquipmentType, MarketSnapshot, RiskLevel};
use rust_broker_api::pricing::{
    assess_risk, competitive_positioning, confidence_score, demand_capacity_delta,
    recommendations, seasonal_factor, win_probability,
};

fn snapshot(fuel: f64, demand: f64, capacity: f64) -> MarketSnapshot {
    MarketSnapshot {
        lane: "GA->FL".to_string(),
        fuel_price: fuel,
        demand_index: demand,
        capacity_utilization: capacity,
        captured_at: Utc::now(),
    }
}

#[test]
fn test_rate_table_covers_dry_van_but_not_produce_on_flatbed() {
    let config = PricingConfig::default();

    let dry_van = config
        .rate_table
        .get(&(EquipmentType::DryVan, CommodityClass::GeneralFreight));
    assert_eq!(dry_van.copied(), Some(2.50));

    // Reefer hazmat: 2.50 * 1.25 * 1.40.
    let reefer_hazmat = config
        .rate_table
        .get(&(EquipmentType::Reefer, CommodityClass::Hazmat))
        .copied()
        .unwrap();
    assert!((reefer_hazmat - 4.38).abs() < 0.01);

    // Food-grade and pharma loads are not quotable on open-deck equipment.
    assert!(config
        .rate_table
        .get(&(EquipmentType::Flatbed, CommodityClass::FoodGrade))
        .is_none());
    assert!(config
        .rate_table
        .get(&(EquipmentType::Lowboy, CommodityClass::Pharmaceutical))
        .is_none());
}

#[test]
fn test_confidence_is_perfect_with_fresh_inputs() {
    let config = PricingConfig::default();
    let confidence = confidence_score(&config, 1.0, 0, 1.0);
    assert!((confidence - 1.0).abs() < 1e-9);
}

#[test]
fn test_confidence_non_increasing_in_snapshot_age() {
    let config = PricingConfig::default();
    let mut previous = f64::INFINITY;
    for age in (0..=7200).step_by(60) {
        let confidence = confidence_score(&config, 1.0, age, 1.0);
        assert!(
            confidence <= previous + 1e-12,
            "confidence rose at age {}s: {} -> {}",
            age,
            previous,
            confidence
        );
        assert!((0.0..=1.0).contains(&confidence));
        previous = confidence;
    }
}

#[test]
fn test_confidence_capped_below_ceiling_when_stale() {
    let config = PricingConfig::default();
    let age = config.stale_max_age_secs + 1;
    let confidence = confidence_score(&config, 1.0, age, 1.0);
    assert!(
        confidence < config.stale_confidence_ceiling,
        "stale confidence {} must sit below the ceiling {}",
        confidence,
        config.stale_confidence_ceiling
    );
}

#[test]
fn test_confidence_reflects_distance_certainty() {
    let config = PricingConfig::default();
    let routed = confidence_score(&config, 1.0, 0, 1.0);
    let estimated = confidence_score(&config, 0.75, 0, 1.0);
    assert!(estimated < routed);
}

#[test]
fn test_win_probability_tracks_the_price_gap() {
    let config = PricingConfig::default();
    assert!((win_probability(&config, 1000.0, 1000.0) - 0.5).abs() < 1e-12);

    // Cheaper than market wins more; the relationship is monotone.
    let mut previous = 1.0;
    for price in (800..=1200).step_by(50) {
        let p = win_probability(&config, price as f64, 1000.0);
        assert!(p < previous);
        assert!(p > 0.0 && p < 1.0);
        previous = p;
    }
}

#[test]
fn test_positioning_nudges_toward_target_win_probability() {
    let config = PricingConfig::default();
    let market_average = 2000.0;
    let base_rate = 1800.0;

    // Subtotal priced well above the target price gets pulled down.
    let above = competitive_positioning(&config, 2500.0, market_average, base_rate);
    assert!(above < 0.0);

    // Subtotal priced well below gets pushed up.
    let below = competitive_positioning(&config, 1500.0, market_average, base_rate);
    assert!(below > 0.0);

    // Never more than the configured swing either way.
    let swing = base_rate * config.positioning_max_swing;
    assert!(above >= -swing && below <= swing);
}

#[test]
fn test_market_delta_is_deterministic_and_banded() {
    let config = PricingConfig::default();
    let hot = snapshot(3.5, 0.95, 0.9);
    let a = demand_capacity_delta(&config, &hot);
    let b = demand_capacity_delta(&config, &hot);
    assert_eq!(a, b);

    let expected = config.market_base_premium + config.demand_tilt + config.tight_capacity_premium;
    assert!((a - expected).abs() < 1e-12);
}

#[test]
fn test_seasonal_table_shape() {
    let config = PricingConfig::default();
    // December is the peak, July the trough.
    assert_eq!(seasonal_factor(&config, 11, None), 1.20);
    assert_eq!(seasonal_factor(&config, 6, None), 0.85);
    // Produce origins get the summer bump.
    assert!(
        seasonal_factor(&config, 6, Some("FL")) > seasonal_factor(&config, 6, Some("OH"))
    );
}

#[test]
fn test_risk_rules_fire_individually() {
    let config = PricingConfig::default();

    let fuel_only = assess_risk(
        &config,
        &snapshot(4.5, 0.75, 0.75),
        CommodityClass::GeneralFreight,
        0,
    );
    assert_eq!(fuel_only.level, RiskLevel::Medium);
    assert_eq!(fuel_only.factors, vec!["high_fuel_prices".to_string()]);

    let volatile = assess_risk(
        &config,
        &snapshot(3.2, 0.95, 0.55),
        CommodityClass::GeneralFreight,
        0,
    );
    assert!(volatile.factors.contains(&"lane_volatility".to_string()));

    let stale = assess_risk(
        &config,
        &snapshot(3.2, 0.75, 0.75),
        CommodityClass::GeneralFreight,
        config.stale_max_age_secs + 60,
    );
    assert!(stale.factors.contains(&"stale_market_data".to_string()));

    // Hazard plus tight capacity escalates straight to HIGH.
    let hazmat_tight = assess_risk(
        &config,
        &snapshot(3.2, 0.92, 0.95),
        CommodityClass::Hazmat,
        0,
    );
    assert_eq!(hazmat_tight.level, RiskLevel::High);

    // Every fired factor ships at least one mitigation strategy.
    for assessment in [&fuel_only, &volatile, &stale, &hazmat_tight] {
        if !assessment.factors.is_empty() {
            assert!(!assessment.mitigation_strategies.is_empty());
        }
    }
}

#[test]
fn test_recommendation_rules() {
    let config = PricingConfig::default();

    let hot = recommendations(&config, &snapshot(3.2, 0.9, 0.7), EquipmentType::DryVan, 0.5, 3);
    assert!(hot
        .iter()
        .any(|r| r.contains("premium pricing due to high market demand")));

    let winning = recommendations(&config, &snapshot(3.2, 0.5, 0.5), EquipmentType::DryVan, 0.9, 3);
    assert!(winning.iter().any(|r| r.contains("maintain competitive pricing")));

    let losing = recommendations(&config, &snapshot(3.2, 0.5, 0.5), EquipmentType::DryVan, 0.2, 3);
    assert!(losing.iter().any(|r| r.contains("strategic discounting")));

    let reefer = recommendations(&config, &snapshot(3.2, 0.5, 0.9), EquipmentType::Reefer, 0.5, 3);
    assert!(reefer.iter().any(|r| r.contains("Reefer capacity is tight")));

    let december = recommendations(&config, &snapshot(3.2, 0.5, 0.5), EquipmentType::DryVan, 0.5, 11);
    assert!(december.iter().any(|r| r.contains("Holiday season")));

    // Calm market, mid win probability, spring pickup: no rule fires.
    let quiet = recommendations(&config, &snapshot(3.2, 0.5, 0.5), EquipmentType::DryVan, 0.5, 3);
    assert!(quiet.is_empty());
}
