//! tiercache
//!
//! Runs a dual-tier cache manager and exposes its statistics over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          tiercache                               │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │ Cache Manager│───▶│  Exporter    │───▶│  HTTP server │       │
//! │  │ + workers    │    │ (prometheus) │    │ /metrics ... │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tiercache::cache::{CacheConfig, CacheManager, EvictionStrategy};
use tiercache::error::{Error, Result};
use tiercache::exporter::MetricsExporter;

// =============================================================================
// CLI Arguments
// =============================================================================

/// tiercache - Redis cache with local fallback
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "TIERCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Remote store URL (omit to run local-only)
    #[arg(long, env = "REDIS_URL")]
    remote_url: Option<String>,

    /// Local store capacity in entries
    #[arg(long, env = "MAX_LOCAL_ENTRIES")]
    max_local_entries: Option<usize>,

    /// Eviction strategy (LRU, LFU, FIFO, RANDOM)
    #[arg(long, env = "EVICTION_STRATEGY")]
    eviction_strategy: Option<String>,

    /// Default TTL in seconds (0 = no expiry)
    #[arg(long, env = "DEFAULT_TTL_SECONDS")]
    default_ttl: Option<u64>,

    /// Connection pool size
    #[arg(long, env = "CONNECTION_POOL_SIZE")]
    pool_size: Option<usize>,

    /// HTTP server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = load_config(&args)?;

    info!("Starting tiercache");
    info!(
        "  Remote store: {}",
        config.remote_url.as_deref().unwrap_or("none (local-only)")
    );
    info!("  Local capacity: {} entries", config.max_local_entries);
    info!("  Eviction strategy: {}", config.eviction_strategy);
    info!("  Default TTL: {}s", config.default_ttl_seconds);

    let cache = CacheManager::open(config).await?;
    let state = Arc::new(AppState {
        exporter: MetricsExporter::new()?,
        cache: Arc::clone(&cache),
    });

    let served = tokio::select! {
        res = run_http_server(&args.metrics_addr, state) => res,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
            Ok(())
        }
    };

    cache.shutdown().await;
    info!("tiercache shutdown complete");
    served
}

/// File (if any), then CLI / env overrides, then validation
fn load_config(args: &Args) -> Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::from_yaml_file(path)?,
        None => CacheConfig::default(),
    };

    if let Some(url) = &args.remote_url {
        config.remote_url = Some(url.clone());
    }
    if let Some(max) = args.max_local_entries {
        config.max_local_entries = max;
    }
    if let Some(strategy) = &args.eviction_strategy {
        config.eviction_strategy = strategy.parse::<EvictionStrategy>()?;
    }
    if let Some(ttl) = args.default_ttl {
        config.default_ttl_seconds = ttl;
    }
    if let Some(size) = args.pool_size {
        config.connection_pool_size = size;
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "redis=info", "deadpool=warn"] {
        let parsed = directive
            .parse::<Directive>()
            .map_err(|e| Error::Config(format!("invalid log directive '{}': {}", directive, e)))?;
        filter = filter.add_directive(parsed);
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// HTTP Server
// =============================================================================

struct AppState {
    cache: Arc<CacheManager>,
    exporter: MetricsExporter,
}

fn respond(
    status: StatusCode,
    content_type: HeaderValue,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, content_type);
    response
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    respond(status, HeaderValue::from_static("text/plain"), body)
}

fn json<T: serde::Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec_pretty(value) {
        Ok(body) => respond(status, HeaderValue::from_static("application/json"), body),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            text(StatusCode::INTERNAL_SERVER_ERROR, "serialization error")
        }
    }
}

fn route(state: &AppState, req: &Request<hyper::body::Incoming>) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/metrics" => {
            state.exporter.update(&state.cache.get_stats());
            match state.exporter.encode() {
                Ok((content_type, buffer)) => {
                    let content_type = HeaderValue::from_str(&content_type)
                        .unwrap_or(HeaderValue::from_static("text/plain"));
                    respond(StatusCode::OK, content_type, buffer)
                }
                Err(e) => {
                    error!("Failed to encode metrics: {}", e);
                    text(StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable")
                }
            }
        }
        "/healthz" | "/livez" => text(StatusCode::OK, "ok"),
        "/readyz" => {
            if state.cache.is_running() {
                text(StatusCode::OK, "ok")
            } else {
                text(StatusCode::SERVICE_UNAVAILABLE, "shutting down")
            }
        }
        "/health" => {
            let report = state.cache.health();
            let status = if report.status.is_operational() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            json(status, &report)
        }
        "/stats" => json(StatusCode::OK, &state.cache.get_stats()),
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

async fn run_http_server(addr: &str, state: Arc<AppState>) -> Result<()> {
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Internal(format!("Invalid server address: {}", e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind server: {}", e)))?;

    info!("HTTP server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("Server accept error: {}", e)))?;

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(route(&state, &req)) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                warn!("HTTP connection error: {}", e);
            }
        });
    }
}
