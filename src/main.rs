use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_broker_api::config::Config;
use rust_broker_api::enricher::RegistryEnricher;
use rust_broker_api::handlers::{self, AppState};
use rust_broker_api::market::{self, MarketStore};
use rust_broker_api::pipeline::LeadPipeline;
use rust_broker_api::pricing::QuotePricingEngine;
use rust_broker_api::services::{
    LeadProviderClient, MarketDataClient, RegistryClient, RoutingClient,
};
use rust_broker_api::store::LeadStore;

/// Main entry point for the application.
///
/// This function initializes the application, including:
/// - Logging and tracing.
/// - Configuration loading.
/// - Collaborator clients (lead providers, registry, routing, market feed).
/// - The market-snapshot refresher task.
/// - HTTP routes and middleware (CORS, Rate Limiting).
///
/// It then starts the Axum server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_broker_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Collaborator clients
    let providers = vec![
        Arc::new(LeadProviderClient::new(
            "trucking_planet",
            &config.trucking_planet_base_url,
            &config.trucking_planet_api_key,
        )?),
        Arc::new(LeadProviderClient::new(
            "thomas_net",
            &config.thomas_net_base_url,
            &config.thomas_net_api_key,
        )?),
    ];
    let registry_client = Arc::new(RegistryClient::new(&config)?);
    let routing_client = Arc::new(RoutingClient::new(&config)?);
    let market_client = Arc::new(MarketDataClient::new(&config)?);
    tracing::info!("Collaborator clients initialized");

    // Shared state
    let lead_store = Arc::new(LeadStore::new());
    let market_store = Arc::new(MarketStore::new());

    // Independent market refresh task; readers never wait on it.
    market::spawn_refresher(
        market_store.clone(),
        market_client.clone(),
        config.market_refresh_secs,
    );
    tracing::info!(
        "Market refresher started ({}s cadence)",
        config.market_refresh_secs
    );

    let enricher = RegistryEnricher::new(registry_client, config.enrichment.clone());
    let pipeline = LeadPipeline::new(
        config.clone(),
        providers,
        enricher,
        lead_store.clone(),
    );
    let pricing = QuotePricingEngine::new(
        config.pricing.clone(),
        routing_client,
        market_client,
        market_store,
    );

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        pipeline,
        pricing,
        store: lead_store,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        .route("/api/v1/leads/generate", post(handlers::generate_leads))
        .route("/api/v1/leads", get(handlers::list_leads))
        .route("/api/v1/quotes", post(handlers::generate_quote))
        .route("/api/v1/status", get(handlers::service_status))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 5MB max payload (prevents memory exhaustion)
                .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Build final app with health check (bypasses rate limiting)
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
