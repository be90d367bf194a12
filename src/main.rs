//! edcache service
//!
//! Runs the tiered cache with the built-in warming strategies over a seeded
//! in-memory repository, and exposes health, metrics and stats endpoints.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          edcache                                │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  Warming     │───▶│ TieredCache  │───▶│  L2 store    │       │
//! │  │  Scheduler   │    │  (L1 + TTL)  │    │              │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! │         │                    │                                  │
//! │         ▼                    ▼                                  │
//! │   /readyz, /healthz    /metrics, /stats                         │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use edcache::adapters::InMemoryRepository;
use edcache::cache::{DistributedStore, InMemoryDistributedStore, TieredCache};
use edcache::monitoring::{self, CacheExporter, HealthCheck, HealthStatus};
use edcache::warming::strategies::{
    ACTIVE_STUDENTS_QUERY, CURRICULUM_LEVELS_QUERY, POPULAR_EXERCISES_QUERY,
};
use edcache::warming::{default_strategies, JsonCache, WarmingScheduler};
use edcache::{Row, ServiceConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Tiered cache with smart TTL, tag invalidation and cache warming
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "EDCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Metrics and stats server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

/// Shared state of the HTTP handlers
struct AppState {
    cache: Arc<JsonCache>,
    scheduler: Arc<WarmingScheduler>,
    health: HealthCheck,
    exporter: CacheExporter,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config = match &args.config {
        Some(path) => ServiceConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    info!("Starting edcache");
    info!("  L1 capacity: {}", config.cache.l1_capacity);
    info!("  Default TTL: {}s", config.cache.default_ttl_secs);
    info!("  Warming: {}", config.warming.enabled);
    info!("  Guard mode: {:?}", config.warming.guard_mode);

    let store: Arc<dyn DistributedStore> = Arc::new(InMemoryDistributedStore::new());
    let cache: Arc<JsonCache> = Arc::new(TieredCache::with_config(config.cache_config(), store));

    let repository = Arc::new(demo_repository());
    let scheduler = Arc::new(WarmingScheduler::new(config.scheduler_config()));
    for strategy in default_strategies(repository, cache.clone()) {
        let strategy = if config
            .warming
            .disabled_strategies
            .iter()
            .any(|name| name == strategy.name())
        {
            strategy.disabled()
        } else {
            strategy
        };
        scheduler.register(strategy)?;
    }

    let state = Arc::new(AppState {
        cache: cache.clone(),
        scheduler: scheduler.clone(),
        health: HealthCheck::new(),
        exporter: CacheExporter::new()?,
    });

    // Start health server
    let health_state = state.clone();
    let health_addr = args.health_addr.clone();
    tokio::spawn(async move {
        let handler = move |req: Request<Incoming>| {
            let state = health_state.clone();
            async move { health_handler(&state, &req) }
        };
        if let Err(e) = serve(&health_addr, "Health", handler).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_state = state.clone();
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        let handler = move |req: Request<Incoming>| {
            let state = metrics_state.clone();
            async move { metrics_handler(&state, &req) }
        };
        if let Err(e) = serve(&metrics_addr, "Metrics", handler).await {
            error!("Metrics server error: {}", e);
        }
    });

    let shutdown = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(shutdown.clone());

    if config.warming.enabled {
        let summary = scheduler.start().await?;
        info!(
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            "Critical warming complete"
        );
    } else {
        warn!("Warming disabled by configuration");
    }
    state.health.set_ready(true);

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown signal received");

    state.health.set_ready(false);
    shutdown.cancel();
    scheduler.stop().await;
    if let Err(e) = sweeper.await {
        warn!("Sweeper task ended abnormally: {}", e);
    }

    info!("edcache shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?);

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
// Demo Data
// =============================================================================

fn demo_repository() -> InMemoryRepository {
    fn rows(value: Value) -> Vec<Row> {
        match value {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(row) => Some(row),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    InMemoryRepository::new()
        .with_rows(
            POPULAR_EXERCISES_QUERY,
            rows(json!([
                {"id": 1, "titre": "Additions a deux chiffres", "niveau": "CP", "matiere": "maths", "access_count": 412},
                {"id": 2, "titre": "Les sons [ou] et [on]", "niveau": "CP", "matiere": "francais", "access_count": 367},
                {"id": 3, "titre": "Tables de multiplication", "niveau": "CE1", "matiere": "maths", "access_count": 298},
                {"id": 4, "titre": "Le passe compose", "niveau": "CE2", "matiere": "francais", "access_count": 201}
            ])),
        )
        .with_rows(
            ACTIVE_STUDENTS_QUERY,
            rows(json!([
                {"id": 101, "prenom": "Lina", "niveau": "CP"},
                {"id": 102, "prenom": "Noah", "niveau": "CE1"}
            ])),
        )
        .with_rows(
            CURRICULUM_LEVELS_QUERY,
            rows(json!([
                {"niveau": "CP", "matiere": "francais"},
                {"niveau": "CP", "matiere": "maths"},
                {"niveau": "CE1", "matiere": "maths"},
                {"niveau": "CE2", "matiere": "francais"}
            ])),
        )
}

// =============================================================================
// HTTP Servers
// =============================================================================

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn respond_json(status: StatusCode, value: &impl serde::Serialize) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, "application/json", body),
        Err(e) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            format!("serialization failed: {}", e),
        ),
    }
}

fn not_found() -> Response<Full<Bytes>> {
    respond(StatusCode::NOT_FOUND, "text/plain", "not found")
}

fn status_code(status: HealthStatus) -> StatusCode {
    if status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

fn health_handler(state: &AppState, req: &Request<Incoming>) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/healthz" => {
            let response = state.health.check_all(Some(&state.cache.stats()));
            respond_json(status_code(response.status), &response)
        }
        "/livez" => {
            let check = state.health.liveness_check();
            respond_json(status_code(check.status), &check)
        }
        "/readyz" => {
            let check = state.health.readiness_check();
            respond_json(status_code(check.status), &check)
        }
        _ => not_found(),
    }
}

fn metrics_handler(state: &AppState, req: &Request<Incoming>) -> Response<Full<Bytes>> {
    match req.uri().path() {
        "/metrics" => {
            state.exporter.update(&state.cache.stats());
            state.exporter.observe_warming(&state.scheduler.status());
            match state.exporter.render() {
                Ok(text) => respond(StatusCode::OK, monitoring::CONTENT_TYPE, text),
                Err(e) => respond(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "text/plain",
                    e.to_string(),
                ),
            }
        }
        "/stats" => {
            let stats = state.cache.stats();
            let recommendations: Vec<String> = stats
                .recommendations()
                .iter()
                .map(ToString::to_string)
                .collect();
            respond_json(
                StatusCode::OK,
                &json!({
                    "stats": stats,
                    "recommendations": recommendations,
                    "warming": state.scheduler.status(),
                }),
            )
        }
        _ => not_found(),
    }
}

async fn serve<H, Fut>(addr: &str, name: &'static str, handler: H) -> edcache::Result<()>
where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Response<Full<Bytes>>> + Send + 'static,
{
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| edcache::Error::Config(format!("Invalid {} server address: {}", name, e)))?;

    let listener = TcpListener::bind(addr).await?;
    info!("{} server listening on {}", name, addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let handler = handler.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let response = handler(req);
                async move { Ok::<_, Infallible>(response.await) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("{} server connection error: {}", name, e);
            }
        });
    }
}
