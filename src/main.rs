//! cover-quote-engine server entry point.
//!
//! Loads configuration, backfills the cover ledger, starts the refresh
//! tasks and serves the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use cover_quote_engine::api;
use cover_quote_engine::api::auth::AccessControl;
use cover_quote_engine::app_state::AppState;
use cover_quote_engine::chain::{ChainDataSource, JsonRpcChain, ProtocolAddresses};
use cover_quote_engine::config::{AddressSource, EngineConfig, LogFormat};
use cover_quote_engine::ledger::{CoverLedger, spawn_refresh_tasks};
use cover_quote_engine::persistence::{ApiKeyStore, PostgresPersistence, QuoteStore};
use cover_quote_engine::pricing::CapacityParams;
use cover_quote_engine::service::{
    QuoteService, QuoteServiceParts, QuoteSettings, ReservationTracker,
};
use cover_quote_engine::signing::QuoteSigner;
use cover_quote_engine::staking::StakeTracker;
use cover_quote_engine::whitelist::WhitelistLoader;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = EngineConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, network = %config.network, "starting cover-quote-engine");

    let http = reqwest::Client::builder()
        .timeout(config.chain_timeout)
        .build()
        .context("building HTTP client")?;

    // Chain access
    let addresses = match &config.addresses {
        AddressSource::Explicit(addresses) => *addresses,
        AddressSource::VersionData(url) => {
            ProtocolAddresses::fetch(&http, url, &config.network).await?
        }
    };
    let chain: Arc<dyn ChainDataSource> = Arc::new(JsonRpcChain::new(
        http.clone(),
        config.provider_url.clone(),
        addresses,
    ));

    // Cover ledger backfill
    let ledger = Arc::new(CoverLedger::new(Arc::clone(&chain), config.ledger));
    let covers = ledger.full_resync().await.context("initial ledger backfill")?;
    tracing::info!(covers, "cover ledger loaded");

    // Persistence
    let persistence = if config.persistence_enabled {
        let pg = PostgresPersistence::connect(
            &config.database_url,
            config.database_max_connections,
            config.database_min_connections,
            config.database_connect_timeout,
        )
        .await?;
        tracing::info!("persistence enabled");
        Some(Arc::new(pg))
    } else {
        tracing::info!("persistence disabled");
        None
    };
    let quote_store = persistence
        .as_ref()
        .map(|pg| Arc::clone(pg) as Arc<dyn QuoteStore>);
    let key_store = persistence
        .as_ref()
        .map(|pg| Arc::clone(pg) as Arc<dyn ApiKeyStore>);

    // Build service layer
    let signer = QuoteSigner::from_hex_key(config.private_key.expose(), config.verifier)?;
    tracing::info!(signer = %signer.address(), verifier = %config.verifier, "quote signer ready");

    let reservations = Arc::new(ReservationTracker::new());
    let quote_service = Arc::new(QuoteService::new(QuoteServiceParts {
        chain: Arc::clone(&chain),
        ledger: Arc::clone(&ledger),
        stake: StakeTracker::new(Arc::clone(&chain), config.unstake, config.chain_timeout),
        whitelist: Arc::new(WhitelistLoader::new(
            config.whitelist_source.clone(),
            http,
            config.whitelist_ttl,
        )),
        signer,
        reservations: Arc::clone(&reservations),
        store: quote_store.clone(),
        settings: QuoteSettings {
            quote_ttl_secs: config.quote_ttl_secs,
            chain_timeout: config.chain_timeout,
            min_sign_interval: config.quote_sign_min_interval,
            capacity_cache_ttl: config.capacity_cache_ttl,
            capacity: CapacityParams {
                legacy_cutover: config.capacity_factor_end_date,
                ..CapacityParams::default()
            },
            ..QuoteSettings::default()
        },
    }));

    match quote_service.restore_reservations().await {
        Ok(restored) => tracing::info!(restored, "reservations restored"),
        Err(e) => tracing::warn!(error = %e, "could not restore reservations"),
    }

    // Background tasks
    let _refresh = spawn_refresh_tasks(Arc::clone(&ledger), reservations, config.refresh);
    if let Some(store) = quote_store
        && config.cleanup_after_days > 0
    {
        tokio::spawn(cleanup_loop(store, config.cleanup_after_days));
    }

    // Build application state
    let app_state = AppState {
        quote_service,
        access: Arc::new(AccessControl::new(config.access.clone(), key_store)),
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router(&app_state))
        .layer(TimeoutLayer::new(config.http_request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically deletes quotes that expired more than `after_days` ago.
async fn cleanup_loop(store: Arc<dyn QuoteStore>, after_days: u64) {
    let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let days = i64::try_from(after_days).unwrap_or(i64::MAX);
        let cutoff = Utc::now() - chrono::Duration::days(days.min(36_500));
        match store.delete_quotes_before(cutoff).await {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(deleted, "expired quotes removed"),
            Err(e) => tracing::warn!(error = %e, "quote cleanup failed"),
        }
    }
}
