/// Unit tests for the composite scoring engine
/// Determinism, bounds, the verification bonus, tier cutoffs, and the
/// revenue estimate
use chrono::{Duration, TimeZone, Utc};
use rust_broker_api::config::ScoringConfig;
use rust_broker_api::models::{
    PriorityTier, RegistryProfile, RegistryState, SafetyRating, SourceAttribution, UnifiedLead,
};
use rust_broker_api::scoring::{
    apply_scores, composite_score, conversion_probability, estimated_monthly_revenue,
    priority_tier,
};
use std::collections::HashMap;

fn lead(industry: Option<&str>, volume: Option<f64>, verified: bool) -> UnifiedLead {
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let registry = if verified {
        RegistryState {
            profile: Some(RegistryProfile {
                dot_number: Some("1234567".to_string()),
                mc_number: None,
                legal_name: Some("ACME MANUFACTURING INC".to_string()),
                verified: true,
                safety_rating: SafetyRating::Satisfactory,
            }),
            checked: true,
            attempts: 0,
            next_retry_at: None,
        }
    } else {
        RegistryState {
            profile: None,
            checked: true,
            attempts: 0,
            next_retry_at: None,
        }
    };

    UnifiedLead {
        identity_key: "test-key".to_string(),
        company_name: "Acme Manufacturing".to_string(),
        normalized_name: "acme manufacturing".to_string(),
        phone: None,
        email: None,
        address: None,
        zip: Some("48084".to_string()),
        state: Some("MI".to_string()),
        industry: industry.map(|s| s.to_string()),
        dot_number: None,
        mc_number: None,
        monthly_shipments: volume,
        sources: vec![SourceAttribution {
            source: "trucking_planet".to_string(),
            source_record_id: "tp-1".to_string(),
            observed_at: now,
        }],
        field_sources: HashMap::new(),
        registry,
        score: 0.0,
        priority: PriorityTier::Low,
        conversion_probability: 0.0,
        estimated_monthly_revenue: 0.0,
        first_seen: now,
        last_seen: now,
        expired: false,
    }
}

#[test]
fn test_identical_inputs_give_identical_scores() {
    let config = ScoringConfig::default();
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let subject = lead(Some("manufacturing"), Some(80.0), true);

    let first = composite_score(&subject, &config, now);
    for _ in 0..50 {
        assert_eq!(composite_score(&subject, &config, now), first);
    }
}

#[test]
fn test_score_stays_in_bounds() {
    let config = ScoringConfig::default();
    let now = Utc::now();

    let best = lead(Some("manufacturing"), Some(10_000.0), true);
    let best_score = composite_score(&best, &config, now);
    assert!((0.0..=100.0).contains(&best_score));

    let mut worst = lead(None, None, false);
    worst.last_seen = now - Duration::days(3650);
    let worst_score = composite_score(&worst, &config, now);
    assert!((0.0..=100.0).contains(&worst_score));
    assert!(worst_score < best_score);
}

#[test]
fn test_verification_bonus_is_the_weighted_constant() {
    let config = ScoringConfig::default();
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();

    let verified = lead(Some("manufacturing"), Some(80.0), true);
    let unverified = lead(Some("manufacturing"), Some(80.0), false);

    let delta = composite_score(&verified, &config, now)
        - composite_score(&unverified, &config, now);
    let expected = config.w_verification * config.verification_bonus;
    assert!(
        (delta - expected).abs() < 1e-9,
        "verification should be worth exactly {} points, got {}",
        expected,
        delta
    );
}

#[test]
fn test_unverified_lead_scores_without_bonus() {
    // A lead whose registry lookup never succeeded still gets a score;
    // the verification component is simply zero.
    let config = ScoringConfig::default();
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();

    let mut timed_out = lead(Some("manufacturing"), Some(80.0), false);
    timed_out.registry.checked = false;
    timed_out.registry.attempts = 2;

    let score = composite_score(&timed_out, &config, now);
    let baseline = composite_score(&lead(Some("manufacturing"), Some(80.0), false), &config, now);
    assert_eq!(score, baseline);
}

#[test]
fn test_tier_assignment_is_monotonic() {
    let config = ScoringConfig::default();
    let mut previous = priority_tier(0.0, &config);
    for step in 0..=1000 {
        let score = step as f64 * 0.1;
        let tier = priority_tier(score, &config);
        assert!(tier >= previous, "tier regressed at score {}", score);
        previous = tier;
    }
    assert_eq!(priority_tier(100.0, &config), PriorityTier::High);
}

#[test]
fn test_conversion_probability_open_interval() {
    let config = ScoringConfig::default();
    for score in [0.0, 1.0, 50.0, 99.0, 100.0] {
        for verified in [false, true] {
            let p = conversion_probability(score, verified, &config);
            assert!(p > 0.0 && p < 1.0, "p out of (0,1) at score {}", score);
        }
    }

    // Verification lifts the probability, never lowers it.
    let p_plain = conversion_probability(70.0, false, &config);
    let p_verified = conversion_probability(70.0, true, &config);
    assert!(p_verified > p_plain);
}

#[test]
fn test_revenue_estimate_formula() {
    let config = ScoringConfig::default();
    let p = 0.4;
    let revenue = estimated_monthly_revenue(Some(80.0), p, &config);
    assert!((revenue - 80.0 * config.average_load_value * p).abs() < 1e-9);

    // No volume signal, no revenue estimate.
    assert_eq!(estimated_monthly_revenue(None, p, &config), 0.0);
}

#[test]
fn test_apply_scores_fills_all_derived_fields() {
    let config = ScoringConfig::default();
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let mut subject = lead(Some("manufacturing"), Some(150.0), true);

    apply_scores(&mut subject, &config, now);

    assert!(subject.score > 0.0);
    assert_eq!(subject.priority, priority_tier(subject.score, &config));
    assert!(subject.conversion_probability > 0.0 && subject.conversion_probability < 1.0);
    assert!(subject.estimated_monthly_revenue > 0.0);
}
