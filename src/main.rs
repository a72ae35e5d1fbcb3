use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use vigil_gate::{
    AppState, GateConfig, MetadataCache, MetadataService, OriginForwarder, RateLimiterSet,
    RiskEngine, StateBroadcaster, create_router,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(GateConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check VIGIL_* environment variables.");
        e
    })?);

    let _log_guard = init_logging(&config)?;

    info!("Starting Vigil Gate traffic-mitigation server");
    info!(
        upstream = %config.upstream.target_url,
        decay_interval_secs = config.risk.decay_interval_secs,
        risk_threshold = config.risk.risk_threshold,
        "Mitigation policy loaded"
    );

    // Metadata side cache, loaded best-effort from disk
    let cache = Arc::new(MetadataCache::load(config.metadata.cache_path.clone()).await);
    let metadata = MetadataService::new(&config.metadata, Arc::clone(&cache))?;

    // The engine owns all mitigation state and pushes every change to the
    // broadcaster's subscribers
    let broadcaster = StateBroadcaster::new();
    let engine = Arc::new(RiskEngine::new(
        config.risk.to_thresholds(),
        broadcaster,
        cache,
    ));

    let limiters = Arc::new(RateLimiterSet::new(
        config.rate_rules.iter().map(|rule| rule.to_rule()).collect(),
    ));
    for rule in &config.rate_rules {
        info!(
            prefix = %rule.prefix,
            max_requests = rule.max_requests,
            window_secs = rule.window_secs,
            "Rate rule active"
        );
    }

    let forwarder = OriginForwarder::new(&config.upstream)?;

    spawn_decay_task(
        Arc::clone(&engine),
        Arc::clone(&limiters),
        config.risk.decay_interval_secs,
    );

    let state = AppState {
        engine,
        metadata,
        limiters,
        forwarder,
    };

    // A handler or forwarder failure must never take the process down; the
    // outermost layer converts anything unhandled into a bare 500.
    let app = create_router(state)
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;

    info!("Vigil Gate listening on {}", bind_addr);

    // Serve with connect info for client address extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Initialize logging: console always, daily-rotated files when configured.
fn init_logging(config: &GateConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(&config.logging.level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let span_events = if config.logging.log_requests {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(span_events);

    if config.logging.log_to_file {
        std::fs::create_dir_all(&config.logging.log_dir)?;
        let appender = tracing_appender::rolling::daily(&config.logging.log_dir, "vigil-gate.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        builder.with_writer(non_blocking).init();
        Ok(Some(guard))
    } else {
        builder.init();
        Ok(None)
    }
}

/// Periodic risk decay, independent of request traffic. Stale limiter windows
/// are swept on the same cadence.
fn spawn_decay_task(engine: Arc<RiskEngine>, limiters: Arc<RateLimiterSet>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        // The first tick fires immediately; skip it so decay starts one full
        // interval after boot.
        interval.tick().await;
        loop {
            interval.tick().await;
            engine.decay_tick().await;
            limiters.cleanup();
        }
    });
}
