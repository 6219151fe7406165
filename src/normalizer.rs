/// Identity normalization for raw lead records
///
/// Every comparison between records from different providers happens on the
/// canonical tuple produced here: folded company name, E.164 phone, and a
/// normalized address line. Pure functions, no side effects.
use crate::errors::AppError;
use crate::models::{NormalizedIdentity, RawLeadRecord};
use phonenumber::country::Id as CountryId;
use phonenumber::Mode;
use regex::Regex;

/// Legal-entity suffix tokens stripped from the tail of a company name.
const LEGAL_SUFFIXES: &[&str] = &[
    "llc", "inc", "corp", "co", "ltd", "lp", "llp", "pllc", "plc", "company", "corporation",
    "incorporated", "limited",
];

/// Trade abbreviations expanded so provider spelling variants of the same
/// company converge on one canonical name.
const TRADE_ABBREVIATIONS: &[(&str, &str)] = &[
    ("mfg", "manufacturing"),
    ("mfr", "manufacturing"),
    ("svcs", "services"),
    ("svc", "service"),
    ("intl", "international"),
    ("natl", "national"),
    ("dist", "distribution"),
    ("distr", "distribution"),
    ("bros", "brothers"),
    ("assoc", "associates"),
    ("equip", "equipment"),
    ("whse", "warehouse"),
];

/// USPS-style street abbreviations applied during address normalization.
const STREET_ABBREVIATIONS: &[(&str, &str)] = &[
    ("STREET", "ST"),
    ("AVENUE", "AVE"),
    ("BOULEVARD", "BLVD"),
    ("DRIVE", "DR"),
    ("ROAD", "RD"),
    ("LANE", "LN"),
    ("COURT", "CT"),
    ("PLACE", "PL"),
    ("HIGHWAY", "HWY"),
    ("PARKWAY", "PKWY"),
    ("SUITE", "STE"),
    ("NORTH", "N"),
    ("SOUTH", "S"),
    ("EAST", "E"),
    ("WEST", "W"),
];

/// Canonicalizes a company name for identity comparison.
///
/// Folds case, strips punctuation, expands trade abbreviations, and drops
/// trailing legal-entity suffixes. Returns an empty string when nothing
/// usable remains.
pub fn normalize_company_name(raw: &str) -> String {
    let folded: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<String> = folded
        .split_whitespace()
        .map(|t| {
            TRADE_ABBREVIATIONS
                .iter()
                .find(|(abbr, _)| *abbr == t)
                .map(|(_, full)| full.to_string())
                .unwrap_or_else(|| t.to_string())
        })
        .collect();

    // Suffixes are only meaningful at the tail; "co" inside a name stays.
    while let Some(last) = tokens.last() {
        if LEGAL_SUFFIXES.contains(&last.as_str()) && tokens.len() > 1 {
            tokens.pop();
        } else {
            break;
        }
    }

    tokens.join(" ")
}

/// Validate and normalize a US phone number.
///
/// Uses the phonenumber library (port of Google's libphonenumber) to:
/// - Parse the number with the US region
/// - Validate it
/// - Return normalized E.164 format (+12485551234)
///
/// Returns: (is_valid, normalized_phone_or_error_msg)
pub fn validate_us_phone(raw: &str) -> (bool, String) {
    // Skip empty or very short strings
    if raw.trim().is_empty() || raw.len() < 7 {
        return (false, "Phone too short".to_string());
    }

    match phonenumber::parse(Some(CountryId::US), raw) {
        Ok(number) => {
            if phonenumber::is_valid(&number) {
                let formatted = number.format().mode(Mode::E164).to_string();
                tracing::debug!("Valid US phone: {} -> {}", raw, formatted);
                (true, formatted)
            } else {
                tracing::warn!("Invalid US phone number: {}", raw);
                (false, "Invalid US phone number".to_string())
            }
        }
        Err(e) => {
            tracing::warn!("Failed to parse US phone '{}': {:?}", raw, e);
            (false, format!("Parse error: {:?}", e))
        }
    }
}

/// Extracts the five-digit zip from whatever the provider sent.
pub fn normalize_zip(raw: &str) -> Option<String> {
    let zip_regex = Regex::new(r"\b(\d{5})(?:-\d{4})?\b").unwrap();
    zip_regex
        .captures(raw)
        .map(|caps| caps[1].to_string())
}

/// Normalizes street + city + state into one uppercase comparison line.
pub fn normalize_address(
    street: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
) -> Option<String> {
    let street = street.map(normalize_street_line).filter(|s| !s.is_empty());
    let city = city
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty());
    let state = state
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty());

    let parts: Vec<String> = [street, city, state].into_iter().flatten().collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn normalize_street_line(raw: &str) -> String {
    let cleaned: String = raw
        .to_uppercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .map(|token| {
            STREET_ABBREVIATIONS
                .iter()
                .find(|(long, _)| *long == token)
                .map(|(_, short)| short.to_string())
                .unwrap_or_else(|| token.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Produces the canonical identity tuple for one raw record.
///
/// Fails with a `Validation` error when the company name is empty or
/// reduces to nothing after normalization; the pipeline drops and logs such
/// records rather than merging them blind.
pub fn normalize_record(record: &RawLeadRecord) -> Result<NormalizedIdentity, AppError> {
    let company_name = normalize_company_name(&record.company_name);
    if company_name.is_empty() {
        return Err(AppError::Validation(format!(
            "unparsable company name '{}' from source {}",
            record.company_name, record.source
        )));
    }

    let phone = record.phone.as_deref().and_then(|raw| {
        let (valid, normalized) = validate_us_phone(raw);
        if valid {
            Some(normalized)
        } else {
            tracing::warn!(
                "Dropping invalid phone '{}' on record {}:{}",
                raw,
                record.source,
                record.source_record_id
            );
            None
        }
    });

    let zip = record.zip.as_deref().and_then(normalize_zip);
    let address = normalize_address(
        record.street.as_deref(),
        record.city.as_deref(),
        record.state.as_deref(),
    );

    Ok(NormalizedIdentity {
        company_name,
        phone,
        address,
        zip,
    })
}
