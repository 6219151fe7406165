use crate::config::Config;
use crate::errors::AppError;
use crate::models::{LeadFilters, LeadReport, QuoteBreakdown, QuoteRequest, UnifiedLead};
use crate::pipeline::LeadPipeline;
use crate::pricing::QuotePricingEngine;
use crate::store::LeadStore;
use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;
use std::sync::Arc;

/// Shared application state injected into handlers.
///
/// The HTTP layer is a thin caller of the two core entry points; all of
/// the actual behavior lives behind `pipeline` and `pricing`.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// The lead ingestion pipeline (`generate_unified_leads`).
    pub pipeline: LeadPipeline,
    /// The quote pricing engine (`generate_quote`).
    pub pricing: QuotePricingEngine,
    /// The Unified Lead store, for read-only listing.
    pub store: Arc<LeadStore>,
}

/// Health check endpoint.
///
/// Returns the service status, version, and health information.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-broker-api",
            "version": "0.1.0"
        })),
    )
}

/// POST /api/v1/leads/generate
///
/// Runs one ingestion cycle over the configured lead sources and returns
/// the ranked, deduplicated lead set with its statistics.
pub async fn generate_leads(
    State(state): State<Arc<AppState>>,
    Json(filters): Json<LeadFilters>,
) -> Result<Json<LeadReport>, AppError> {
    tracing::info!("POST /leads/generate - filters: {:?}", filters);

    if let Some(min_score) = filters.min_score {
        if !(0.0..=100.0).contains(&min_score) {
            return Err(AppError::Validation(format!(
                "min_score must be within [0, 100], got {}",
                min_score
            )));
        }
    }

    let report = state.pipeline.generate_unified_leads(&filters).await?;

    tracing::info!(
        "Generated {} lead(s), {} high priority, average score {:.1}",
        report.stats.total_found,
        report.stats.high_priority,
        report.stats.average_score
    );

    Ok(Json(report))
}

/// GET /api/v1/leads
///
/// Lists the current (non-expired) Unified Lead set without running a new
/// ingestion cycle.
pub async fn list_leads(State(state): State<Arc<AppState>>) -> Json<Vec<UnifiedLead>> {
    let mut leads = state.store.active_leads().await;
    leads.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.identity_key.cmp(&b.identity_key))
    });
    Json(leads)
}

/// POST /api/v1/quotes
///
/// Prices one shipment request. Errors come back whole; there is no
/// partial quote.
pub async fn generate_quote(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<QuoteBreakdown>, AppError> {
    tracing::info!(
        "POST /quotes - {} -> {} ({})",
        request.origin,
        request.destination,
        request.equipment_type.as_str()
    );

    let quote = state.pricing.generate_quote(&request).await?;
    Ok(Json(quote))
}

/// GET /api/v1/status
///
/// Summarizes the configured collaborators and the scoring setup; the
/// ops dashboard polls this.
pub async fn service_status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let scoring = &state.config.scoring;
    Json(json!({
        "lead_sources": ["trucking_planet", "thomas_net"],
        "registry": {
            "base_url": state.config.registry_base_url,
            "capabilities": ["dot_lookup", "mc_lookup", "name_address_search"],
        },
        "scoring": {
            "method": "weighted_composite",
            "weights": {
                "industry_fit": scoring.w_industry_fit,
                "volume_signal": scoring.w_volume,
                "verification": scoring.w_verification,
                "recency": scoring.w_recency,
                "source_reliability": scoring.w_reliability,
            },
            "tier_thresholds": {
                "high": scoring.high_threshold,
                "medium": scoring.medium_threshold,
            },
        },
        "unified_leads_held": state.store.len().await,
    }))
}
