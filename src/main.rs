use anyhow::{Context, Result};
use axum::{Router, middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use faucet_orchestrator::{
    ClaimExecutor, ExecutorMode, FaucetRegistry, HttpClaimExecutor, HttpFetcher, HttpProxySource,
    OrchestratorConfig, ProxyPool, SessionSupervisor, SimulatedCaptchaSolver,
    SimulatedClaimExecutor,
    api::{
        ApiState, RateLimiter, SecurityMiddlewareConfig, SecurityState, body_size_middleware,
        create_router, logging_middleware, rate_limit_middleware, security_headers_middleware,
    },
    config::sanitize_for_logging,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so bad settings fail before anything starts
    let config = OrchestratorConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check the FAUCET_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting faucet orchestrator");
    info!(
        "Executor mode: {:?}, max concurrent sessions: {}, round delay: {}s",
        config.executor.mode,
        config.session.max_concurrent_sessions,
        config.session.round_delay_secs
    );

    let registry = Arc::new(FaucetRegistry::with_defaults().await);
    let proxies = Arc::new(ProxyPool::new());

    let proxy_fetcher = HttpFetcher::new(config.proxy_fetch_config())
        .context("Failed to create proxy listing client")?;
    let proxy_source = Arc::new(HttpProxySource::new(
        proxy_fetcher,
        config.proxy.sources.clone(),
        config.proxy.per_source_limit,
    ));
    for upstream in proxy_source.upstreams() {
        info!("Proxy source: {}", redact(&config, upstream));
    }

    let executor = create_executor(&config)?;

    let supervisor = Arc::new(SessionSupervisor::new(
        registry,
        proxies,
        proxy_source,
        executor,
        config.supervisor_config(),
    ));

    if config.proxy.refresh_on_startup {
        match supervisor.refresh_proxies().await {
            Ok(count) => info!("Loaded {} proxies at startup", count),
            Err(e) => warn!(error = %e, "Startup proxy refresh failed, running without proxies"),
        }
    }
    spawn_proxy_refresh(supervisor.clone(), config.proxy.refresh_interval_minutes);

    let security_state = SecurityState::new(SecurityMiddlewareConfig::from(&config));
    spawn_rate_limiter_cleanup(supervisor.clone(), security_state.rate_limiter.clone());

    // Layers run bottom-up: trace, logging, rate limit, body size, headers
    let app = Router::new()
        .nest("/api", create_router(ApiState::new(supervisor.clone())))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(middleware::from_fn_with_state(
            security_state.clone(),
            body_size_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            security_state.clone(),
            rate_limit_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            security_state.clone(),
            logging_middleware,
        ));
    let app = if config.security.enable_cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    };
    let app = app.layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    info!("Faucet orchestrator listening on {}", bind_addr);
    info!(
        "Middleware: CORS={}, Rate limit={}/min, Max body={}KB",
        config.security.enable_cors,
        config.security.rate_limit_per_minute,
        config.security.max_request_size / 1024
    );

    // Serve with connect info for client IP extraction
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    supervisor.shutdown().await;
    info!("Faucet orchestrator stopped");

    Ok(())
}

/// Initialize logging. `RUST_LOG` wins over the configured level when set.
fn init_logging(config: &OrchestratorConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_lowercase()));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Logging initialized with credential sanitization enabled");
    }

    Ok(())
}

fn redact(config: &OrchestratorConfig, value: &str) -> String {
    if config.logging.sanitize_logs {
        sanitize_for_logging(value)
    } else {
        value.to_string()
    }
}

fn create_executor(config: &OrchestratorConfig) -> Result<Arc<dyn ClaimExecutor>> {
    match config.executor.mode {
        ExecutorMode::Http => {
            let fetcher = HttpFetcher::new(config.page_fetch_config())
                .context("Failed to create faucet page client")?;
            let solver = Arc::new(SimulatedCaptchaSolver::new(
                config.executor.captcha_success_rate,
            ));
            info!(
                "HTTP claim executor ready (captcha solving: {})",
                config.executor.captcha_solving_enabled
            );
            Ok(Arc::new(HttpClaimExecutor::new(
                fetcher,
                solver,
                config.executor.captcha_solving_enabled,
                config.executor.success_indicators.clone(),
            )))
        }
        ExecutorMode::Simulated => {
            warn!(
                "Simulated claim executor in use, success rate {}",
                config.executor.simulated_success_rate
            );
            Ok(Arc::new(SimulatedClaimExecutor::new(
                config.executor.simulated_success_rate,
            )))
        }
    }
}

/// Refresh the proxy pool periodically until shutdown
fn spawn_proxy_refresh(supervisor: Arc<SessionSupervisor>, interval_minutes: u64) {
    if interval_minutes == 0 {
        info!("Periodic proxy refresh disabled");
        return;
    }

    let shutdown = supervisor.shutdown_token();
    tokio::spawn(async move {
        let period = Duration::from_secs(interval_minutes * 60);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = supervisor.refresh_proxies().await {
                        warn!(error = %e, "Periodic proxy refresh failed");
                    }
                }
            }
        }
    });
}

fn spawn_rate_limiter_cleanup(supervisor: Arc<SessionSupervisor>, limiter: Arc<RateLimiter>) {
    let shutdown = supervisor.shutdown_token();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(120));
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => limiter.cleanup(),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        // Keep serving rather than shutting down on a broken signal handler
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
