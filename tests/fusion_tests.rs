/// Unit tests for the deduplication & fusion engine
/// Covers the cross-provider merge scenario, idempotency, conflict
/// resolution priority, and identity-key uniqueness
use chrono::{TimeZone, Utc};
use rust_broker_api::config::FusionConfig;
use rust_broker_api::fusion::{identity_key, FusionEngine};
use rust_broker_api::models::{NormalizedIdentity, RawLeadRecord, UnifiedLead};
use rust_broker_api::normalizer::normalize_record;
use std::collections::HashMap;

fn record(
    source: &str,
    record_id: &str,
    name: &str,
    zip: &str,
    phone: Option<&str>,
) -> RawLeadRecord {
    RawLeadRecord {
        source: source.to_string(),
        source_record_id: record_id.to_string(),
        company_name: name.to_string(),
        street: Some("1200 West Maple Street".to_string()),
        city: Some("Troy".to_string()),
        state: Some("MI".to_string()),
        zip: Some(zip.to_string()),
        phone: phone.map(|p| p.to_string()),
        email: None,
        industry: Some("Manufacturing".to_string()),
        notes: None,
        monthly_shipments: Some(40.0),
        dot_number: None,
        mc_number: None,
    }
}

fn normalize_batch(records: &[RawLeadRecord]) -> Vec<(RawLeadRecord, NormalizedIdentity)> {
    records
        .iter()
        .map(|r| (r.clone(), normalize_record(r).unwrap()))
        .collect()
}

fn engine() -> FusionEngine {
    FusionEngine::new(FusionConfig::default())
}

#[test]
fn test_cross_provider_duplicate_merges_into_one_lead() {
    // "Acme Mfg LLC" from one provider and "ACME MANUFACTURING" from
    // another, same zip and phone, are the same company.
    let records = vec![
        record(
            "trucking_planet",
            "tp-100",
            "Acme Mfg LLC",
            "48084",
            Some("(248) 555-0147"),
        ),
        record(
            "thomas_net",
            "tn-200",
            "ACME MANUFACTURING",
            "48084",
            Some("248-555-0147"),
        ),
    ];
    let batch = normalize_batch(&records);
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();

    let mut leads: HashMap<String, UnifiedLead> = HashMap::new();
    let outcome = engine().fuse_into(&mut leads, &batch, now);

    assert_eq!(leads.len(), 1);
    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.merged, 1);

    let lead = leads.values().next().unwrap();
    assert_eq!(lead.source_label(), "Combined");
    assert_eq!(lead.sources.len(), 2);
    assert_eq!(lead.normalized_name, "acme manufacturing");
    assert_eq!(lead.phone.as_deref(), Some("+12485550147"));
}

#[test]
fn test_refusing_to_merge_distinct_companies() {
    let records = vec![
        record(
            "trucking_planet",
            "tp-1",
            "Acme Manufacturing",
            "48084",
            Some("(248) 555-0147"),
        ),
        record(
            "thomas_net",
            "tn-1",
            "Zenith Freight Lines",
            "48084",
            Some("(248) 555-0190"),
        ),
    ];
    let batch = normalize_batch(&records);
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();

    let mut leads = HashMap::new();
    engine().fuse_into(&mut leads, &batch, now);

    assert_eq!(leads.len(), 2);
}

#[test]
fn test_fuzzy_merge_needs_name_similarity_and_corroboration() {
    // Same phone, zip typo'd one digit apart: primary keys differ, the
    // fuzzy path must still merge because the names agree and the phone
    // corroborates.
    let records = vec![
        record(
            "trucking_planet",
            "tp-1",
            "Acme Manufacturing",
            "48084",
            Some("(248) 555-0147"),
        ),
        record(
            "thomas_net",
            "tn-1",
            "Acme Manufacturing Group",
            "48085",
            Some("(248) 555-0147"),
        ),
    ];
    let batch = normalize_batch(&records);
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();

    let mut leads = HashMap::new();
    engine().fuse_into(&mut leads, &batch, now);

    assert_eq!(leads.len(), 1);
    assert_eq!(leads.values().next().unwrap().sources.len(), 2);
}

#[test]
fn test_fusion_is_idempotent() {
    let records = vec![
        record(
            "trucking_planet",
            "tp-100",
            "Acme Mfg LLC",
            "48084",
            Some("(248) 555-0147"),
        ),
        record(
            "thomas_net",
            "tn-200",
            "ACME MANUFACTURING",
            "48084",
            Some("248-555-0147"),
        ),
        record(
            "thomas_net",
            "tn-300",
            "Zenith Freight Lines",
            "30301",
            None,
        ),
    ];
    let batch = normalize_batch(&records);
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let engine = engine();

    let mut first = HashMap::new();
    engine.fuse_into(&mut first, &batch, now);

    // Re-running the same batch at the same instant changes nothing.
    let mut second = first.clone();
    engine.fuse_into(&mut second, &batch, now);

    let a = serde_json::to_value(&sorted(&first)).unwrap();
    let b = serde_json::to_value(&sorted(&second)).unwrap();
    assert_eq!(a, b);

    // Provenance stayed append-once.
    for lead in second.values() {
        let mut pairs: Vec<_> = lead
            .sources
            .iter()
            .map(|s| (s.source.clone(), s.source_record_id.clone()))
            .collect();
        pairs.sort();
        pairs.dedup();
        assert_eq!(pairs.len(), lead.sources.len());
    }
}

#[test]
fn test_conflict_resolution_follows_source_priority() {
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2026, 8, 2, 12, 0, 0).unwrap();
    let engine = engine();
    let mut leads = HashMap::new();

    // thomas_net (lower priority) observes first and owns the fields.
    let mut tn = record(
        "thomas_net",
        "tn-1",
        "Acme Manufacturing",
        "48084",
        Some("(248) 555-0147"),
    );
    tn.industry = Some("Retail".to_string());
    engine.fuse_into(&mut leads, &normalize_batch(&[tn.clone()]), now);
    assert_eq!(
        leads.values().next().unwrap().industry.as_deref(),
        Some("retail")
    );

    // trucking_planet outranks thomas_net and takes the field over.
    let mut tp = record(
        "trucking_planet",
        "tp-1",
        "Acme Manufacturing",
        "48084",
        Some("(248) 555-0147"),
    );
    tp.industry = Some("Manufacturing".to_string());
    engine.fuse_into(&mut leads, &normalize_batch(&[tp]), later);
    let lead = leads.values().next().unwrap();
    assert_eq!(lead.industry.as_deref(), Some("manufacturing"));
    assert_eq!(
        lead.field_sources.get("industry").map(String::as_str),
        Some("trucking_planet")
    );

    // A later thomas_net observation cannot claw the field back.
    let mut tn_again = tn;
    tn_again.source_record_id = "tn-2".to_string();
    tn_again.industry = Some("Chemicals".to_string());
    let even_later = Utc.with_ymd_and_hms(2026, 8, 3, 12, 0, 0).unwrap();
    engine.fuse_into(&mut leads, &normalize_batch(&[tn_again]), even_later);
    let lead = leads.values().next().unwrap();
    assert_eq!(lead.industry.as_deref(), Some("manufacturing"));

    // Provenance still recorded every contribution.
    assert_eq!(lead.sources.len(), 3);
}

#[test]
fn test_equal_priority_most_recent_wins() {
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let later = Utc.with_ymd_and_hms(2026, 8, 2, 12, 0, 0).unwrap();
    let engine = engine();
    let mut leads = HashMap::new();

    let mut first = record(
        "trucking_planet",
        "tp-1",
        "Acme Manufacturing",
        "48084",
        None,
    );
    first.monthly_shipments = Some(40.0);
    engine.fuse_into(&mut leads, &normalize_batch(&[first]), now);

    let mut second = record(
        "trucking_planet",
        "tp-1",
        "Acme Manufacturing",
        "48084",
        None,
    );
    second.monthly_shipments = Some(65.0);
    engine.fuse_into(&mut leads, &normalize_batch(&[second]), later);

    let lead = leads.values().next().unwrap();
    assert_eq!(lead.monthly_shipments, Some(65.0));
    // Same provider + record id: provenance did not duplicate.
    assert_eq!(lead.sources.len(), 1);
}

#[test]
fn test_identity_keys_stay_unique() {
    let mut records = Vec::new();
    for i in 0..20 {
        records.push(record(
            "trucking_planet",
            &format!("tp-{}", i),
            &format!("Company Number {}", i),
            "48084",
            None,
        ));
    }
    // Duplicates of the first few under provider spelling variants.
    records.push(record(
        "thomas_net",
        "tn-0",
        "COMPANY NUMBER 0",
        "48084",
        None,
    ));
    records.push(record(
        "thomas_net",
        "tn-1",
        "Company Number 1 Inc",
        "48084",
        None,
    ));

    let batch = normalize_batch(&records);
    let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
    let mut leads = HashMap::new();
    engine().fuse_into(&mut leads, &batch, now);

    assert_eq!(leads.len(), 20);
    for (key, lead) in &leads {
        assert_eq!(key, &lead.identity_key);
        assert_eq!(
            lead.identity_key,
            identity_key(&lead.normalized_name, lead.zip.as_deref())
        );
    }
}

fn sorted(leads: &HashMap<String, UnifiedLead>) -> Vec<&UnifiedLead> {
    let mut v: Vec<&UnifiedLead> = leads.values().collect();
    v.sort_by(|a, b| a.identity_key.cmp(&b.identity_key));
    v
}
