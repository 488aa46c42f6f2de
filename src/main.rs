use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use axum::Json;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ratekeeper::config::RatekeeperConfig;
use ratekeeper::http::{ClientIpSpan, HandlerError, RateLimitMiddleware, Router};
use ratekeeper::ratelimit::ClientRateLimiter;
use ratekeeper::server::HttpServer;

/// Per-client rate limited HTTP service.
#[derive(Debug, Parser)]
#[command(name = "ratekeeper", version, about)]
struct Args {
    /// Path to a configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Minimum interval between requests per client, in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = RatekeeperConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.listen_addr = listen;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.rate_limiting.interval_ms = interval_ms;
    }
    if args.log_json {
        config.logging.json = true;
    }
    config.validate()?;

    init_tracing(&config.logging.level, config.logging.json);

    info!("Starting Ratekeeper");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &args.config {
        info!(path = %path.display(), "Loaded configuration file");
    }
    info!(listen_addr = %config.server.listen_addr, "Configuration loaded");

    let resolver = config.identity.resolver()?;
    let limiter = Arc::new(ClientRateLimiter::start(
        config.rate_limiting.limiter_config(),
    )?);

    let router = Router::new()
        .add("/healthz", healthz)
        .use_middleware(ClientIpSpan::new(resolver.clone()))
        .use_middleware(RateLimitMiddleware::new(limiter.clone(), resolver))
        .add("/", index)
        .add("/missing", missing);

    let server = HttpServer::bind(config.server.listen_addr, router).await?;
    server.serve_with_shutdown(shutdown_signal()).await?;

    limiter.shutdown().await;
    info!("Ratekeeper stopped");
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }
}

async fn healthz(_request: Request) -> Result<Response, HandlerError> {
    Ok("ok".into_response())
}

async fn index(request: Request) -> Result<Response, HandlerError> {
    Ok(Json(serde_json::json!({
        "service": "ratekeeper",
        "version": env!("CARGO_PKG_VERSION"),
        "path": request.uri().path(),
    }))
    .into_response())
}

async fn missing(_request: Request) -> Result<Response, HandlerError> {
    Err(HandlerError::not_found("not found"))
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
