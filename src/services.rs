use crate::config::Config;
use crate::errors::AppError;
use crate::models::{
    DistanceResolution, LeadFilters, MarketSnapshot, RawLeadRecord, RegistryProfile, SafetyRating,
};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

fn build_client(timeout_secs: u64) -> Result<Client, AppError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| AppError::ExternalService(format!("Failed to create HTTP client: {}", e)))
}

// ============ Lead Source Providers ============

/// Record shape shared by the lead-source provider APIs. The provider does
/// not know which source label we file it under; the client stamps that.
#[derive(Debug, Deserialize)]
struct ProviderRecord {
    id: String,
    company_name: String,
    #[serde(default)]
    street: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    zip: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    industry: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    monthly_shipments: Option<f64>,
    #[serde(default)]
    dot_number: Option<String>,
    #[serde(default)]
    mc_number: Option<String>,
}

/// Client for one lead-source provider (network directory, industrial
/// directory, ...). One instance per configured provider.
pub struct LeadProviderClient {
    provider: String,
    client: Client,
    base_url: String,
    api_key: String,
}

impl LeadProviderClient {
    pub fn new(provider: &str, base_url: &str, api_key: &str) -> Result<Self, AppError> {
        Ok(Self {
            provider: provider.to_string(),
            client: build_client(15)?,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Fetches raw company records matching the filters.
    pub async fn fetch_leads(&self, filters: &LeadFilters) -> Result<Vec<RawLeadRecord>, AppError> {
        let mut params: Vec<(&str, String)> = vec![("api_key", self.api_key.clone())];
        if let Some(ref industries) = filters.industries {
            params.push(("industries", industries.join(",")));
        }
        if let Some(ref states) = filters.states {
            params.push(("states", states.join(",")));
        }

        // Build URL with proper parameter encoding
        let url =
            reqwest::Url::parse_with_params(&format!("{}/leads", self.base_url), &params)
                .map_err(|e| AppError::ExternalService(format!("Failed to build URL: {}", e)))?;

        tracing::info!("Fetching leads from provider '{}'", self.provider);
        // Redact the key from logs
        tracing::debug!("{} URL: {}/leads?api_key=[REDACTED]", self.provider, self.base_url);

        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::ExternalService(format!("{} request failed: {}", self.provider, e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("{} returned error {}: {}", self.provider, status, error_text);
            return Err(AppError::ExternalService(format!(
                "{} returned status {}: {}",
                self.provider, status, error_text
            )));
        }

        let records: Vec<ProviderRecord> = response.json().await.map_err(|e| {
            AppError::ExternalService(format!(
                "Failed to parse {} response: {}",
                self.provider, e
            ))
        })?;

        tracing::info!(
            "Provider '{}' returned {} records",
            self.provider,
            records.len()
        );

        Ok(records
            .into_iter()
            .map(|r| RawLeadRecord {
                source: self.provider.clone(),
                source_record_id: r.id,
                company_name: r.company_name,
                street: r.street,
                city: r.city,
                state: r.state,
                zip: r.zip,
                phone: r.phone,
                email: r.email,
                industry: r.industry,
                notes: r.notes,
                monthly_shipments: r.monthly_shipments,
                dot_number: r.dot_number,
                mc_number: r.mc_number,
            })
            .collect())
    }
}

// ============ Carrier Regulatory Registry ============

/// How to look a company up in the regulatory registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegistryQuery {
    ByDotNumber(String),
    ByMcNumber(String),
    ByNameAddress { name: String, address: String },
}

impl RegistryQuery {
    /// Cache key for the registry-profile cache.
    pub fn cache_key(&self) -> String {
        match self {
            RegistryQuery::ByDotNumber(dot) => format!("dot:{}", dot),
            RegistryQuery::ByMcNumber(mc) => format!("mc:{}", mc),
            RegistryQuery::ByNameAddress { name, address } => {
                format!("name:{}|{}", name, address)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryCarrierRecord {
    #[serde(default)]
    dot_number: Option<String>,
    #[serde(default)]
    mc_number: Option<String>,
    #[serde(default)]
    legal_name: Option<String>,
    /// "Y"/"N" operating-authority flag, registry convention.
    #[serde(default)]
    allowed_to_operate: Option<String>,
    #[serde(default)]
    safety_rating: Option<String>,
}

impl RegistryCarrierRecord {
    fn into_profile(self) -> RegistryProfile {
        let verified = self
            .allowed_to_operate
            .as_deref()
            .map(|flag| flag.eq_ignore_ascii_case("y"))
            .unwrap_or(false);
        let safety_rating = self
            .safety_rating
            .as_deref()
            .map(SafetyRating::parse)
            .unwrap_or(SafetyRating::Unknown);
        RegistryProfile {
            dot_number: self.dot_number,
            mc_number: self.mc_number,
            legal_name: self.legal_name,
            verified,
            safety_rating,
        }
    }
}

/// Client for the carrier regulatory registry.
pub struct RegistryClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RegistryClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(config.enrichment.call_timeout_secs)?,
            base_url: config.registry_base_url.clone(),
            api_key: config.registry_api_key.clone(),
        })
    }

    /// Looks a company up by identifier when available, else by normalized
    /// name + address. `Ok(None)` is a definitive no-match; `Err` means the
    /// registry could not be consulted.
    pub async fn lookup(&self, query: &RegistryQuery) -> Result<Option<RegistryProfile>, AppError> {
        let url = match query {
            RegistryQuery::ByDotNumber(dot) => {
                self.build_url(&format!("/carriers/dot/{}", dot), &[])?
            }
            RegistryQuery::ByMcNumber(mc) => {
                self.build_url(&format!("/carriers/mc/{}", mc), &[])?
            }
            RegistryQuery::ByNameAddress { name, address } => self.build_url(
                "/carriers/search",
                &[("name", name.as_str()), ("address", address.as_str())],
            )?,
        };

        tracing::debug!("Registry lookup: {:?}", query);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Registry request failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalService(format!(
                "Registry returned status {}",
                status
            )));
        }

        // Search endpoints answer with an array; identifier endpoints with
        // a single record. An empty array is a definitive no-match.
        let body: serde_json::Value = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse registry response: {}", e))
        })?;

        let record: Option<RegistryCarrierRecord> = match body {
            serde_json::Value::Array(items) => items
                .into_iter()
                .next()
                .and_then(|v| serde_json::from_value(v).ok()),
            other => serde_json::from_value(other).ok(),
        };

        Ok(record.map(|r| r.into_profile()))
    }

    fn build_url(&self, path: &str, params: &[(&str, &str)]) -> Result<reqwest::Url, AppError> {
        let mut all: Vec<(&str, &str)> = Vec::new();
        if let Some(ref key) = self.api_key {
            all.push(("api_key", key.as_str()));
        }
        all.extend_from_slice(params);
        reqwest::Url::parse_with_params(&format!("{}{}", self.base_url, path), &all)
            .map_err(|e| AppError::ExternalService(format!("Failed to build URL: {}", e)))
    }
}

// ============ Lane Distance Resolver ============

#[derive(Debug, Deserialize)]
struct DistanceResponse {
    miles: f64,
    /// "routed" when the resolver followed the road network; anything else
    /// is an estimate and lowers the resolution certainty.
    #[serde(default)]
    method: Option<String>,
}

/// Client for the routing collaborator.
pub struct RoutingClient {
    client: Client,
    base_url: String,
}

impl RoutingClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(10)?,
            base_url: config.routing_base_url.clone(),
        })
    }

    pub async fn resolve_distance(
        &self,
        origin: &str,
        destination: &str,
    ) -> Result<DistanceResolution, AppError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/distance", self.base_url),
            &[("origin", origin), ("destination", destination)],
        )
        .map_err(|e| AppError::ExternalService(format!("Failed to build URL: {}", e)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Routing request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalService(format!(
                "Routing service returned status {}",
                status
            )));
        }

        let body: DistanceResponse = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse routing response: {}", e))
        })?;

        if !body.miles.is_finite() || body.miles <= 0.0 {
            return Err(AppError::ExternalService(format!(
                "Routing service returned unusable distance {} for {} -> {}",
                body.miles, origin, destination
            )));
        }

        let certainty = match body.method.as_deref() {
            Some("routed") => 1.0,
            Some("great_circle") | Some("estimated") => 0.75,
            _ => 0.9,
        };

        Ok(DistanceResolution {
            miles: body.miles,
            certainty,
        })
    }
}

// ============ Market Conditions Feed ============

#[derive(Debug, Deserialize)]
struct MarketFeedResponse {
    fuel_price: f64,
    demand_index: f64,
    capacity_utilization: f64,
    #[serde(default)]
    captured_at: Option<DateTime<Utc>>,
}

/// Client for the market-conditions feed.
pub struct MarketDataClient {
    client: Client,
    base_url: String,
}

impl MarketDataClient {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        Ok(Self {
            client: build_client(10)?,
            base_url: config.market_feed_base_url.clone(),
        })
    }

    /// Fetches the feed's current view of one lane.
    pub async fn current_snapshot(&self, lane: &str) -> Result<MarketSnapshot, AppError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/snapshot", self.base_url),
            &[("lane", lane)],
        )
        .map_err(|e| AppError::ExternalService(format!("Failed to build URL: {}", e)))?;

        let response = self.client.get(url).send().await.map_err(|e| {
            AppError::ExternalService(format!("Market feed request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::ExternalService(format!(
                "Market feed returned status {}",
                status
            )));
        }

        let body: MarketFeedResponse = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse market feed response: {}", e))
        })?;

        Ok(MarketSnapshot {
            lane: lane.to_string(),
            fuel_price: body.fuel_price,
            demand_index: body.demand_index.clamp(0.0, 1.0),
            capacity_utilization: body.capacity_utilization.clamp(0.0, 1.0),
            captured_at: body.captured_at.unwrap_or_else(Utc::now),
        })
    }
}
