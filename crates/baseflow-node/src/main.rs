#![forbid(unsafe_code)]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::float_cmp)]
#![deny(clippy::cast_precision_loss)]
#![deny(clippy::cast_possible_truncation)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::cast_sign_loss)]
#![deny(clippy::disallowed_types)]

//! BaseFlow dashboard API node.
//!
//! Thin HTTP surface over the score generator, the streak fetch policy, and
//! the reconciliation engine. Remote dependencies (check-in API, wallet
//! provider, analysis service) are best-effort throughout: their failures
//! degrade responses, never the process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use baseflow_analysis::{AnalysisClient, AnalysisConfig, AnalysisOutcome};
use baseflow_checkin::{CheckInApiClient, CheckInApiConfig};
use baseflow_core::{earned_credentials, generate, next_milestone, CredentialStatus};
use baseflow_engine::{EngineConfig, FetchSource, ReconciliationEngine};
use baseflow_rpc::{
    format_display_address, warn_if_unexpected_chain, BasenameResolver, BasenameResolverConfig,
    WalletRpcClient, WalletRpcConfig, BASE_MAINNET_CHAIN_ID,
};
use baseflow_storage::{StorageError, StreakStore};
use clap::Parser;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone)]
#[command(author, version, about = "BaseFlow dashboard API node")]
struct Settings {
    #[arg(long, env = "BASEFLOW_DB_PATH", default_value = "./data/baseflow")]
    db_path: String,
    #[arg(long, env = "BASEFLOW_LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    listen_addr: String,
    #[arg(
        long,
        env = "BASEFLOW_CHECKIN_API_URL",
        default_value = "https://my-first-base-miniapp.vercel.app"
    )]
    checkin_api_url: String,
    #[arg(
        long,
        env = "BASEFLOW_WALLET_RPC_URL",
        default_value = "https://mainnet.base.org"
    )]
    wallet_rpc_url: String,
    #[arg(
        long,
        env = "BASEFLOW_RESOLVER_API_URL",
        default_value = "https://resolver-api.basename.app"
    )]
    resolver_api_url: String,
    #[arg(
        long,
        env = "BASEFLOW_ANALYSIS_API_URL",
        default_value = "https://generativelanguage.googleapis.com"
    )]
    analysis_api_url: String,
    #[arg(long, env = "BASEFLOW_ANALYSIS_API_KEY")]
    analysis_api_key: Option<String>,
    #[arg(long, env = "BASEFLOW_EXPECTED_CHAIN_ID", default_value_t = BASE_MAINNET_CHAIN_ID)]
    expected_chain_id: u64,
    #[arg(long, env = "BASEFLOW_MAX_OPTIMISTIC_DRIFT", default_value_t = 30)]
    max_optimistic_drift: u64,
}

/// The API key must never reach the logs; everything else is fair game.
impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("db_path", &self.db_path)
            .field("listen_addr", &self.listen_addr)
            .field("checkin_api_url", &self.checkin_api_url)
            .field("wallet_rpc_url", &self.wallet_rpc_url)
            .field("resolver_api_url", &self.resolver_api_url)
            .field("analysis_api_url", &self.analysis_api_url)
            .field(
                "analysis_api_key",
                &self.analysis_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("expected_chain_id", &self.expected_chain_id)
            .field("max_optimistic_drift", &self.max_optimistic_drift)
            .finish()
    }
}

#[derive(Clone)]
struct Metrics {
    registry: Registry,
    uptime_ms: IntGauge,
    verify_total: IntCounterVec,
    fetch_fallback_total: IntCounter,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();
        let uptime_ms = IntGauge::with_opts(Opts::new(
            "baseflow_uptime_ms",
            "Uptime of the BaseFlow node in milliseconds",
        ))
        .expect("uptime gauge");
        let verify_total = IntCounterVec::new(
            Opts::new("baseflow_verify_total", "Verify operations by decision"),
            &["decision"],
        )
        .expect("verify counter");
        let fetch_fallback_total = IntCounter::with_opts(Opts::new(
            "baseflow_fetch_fallback_total",
            "Streak fetches served from local fallback",
        ))
        .expect("fallback counter");
        registry
            .register(Box::new(uptime_ms.clone()))
            .expect("register uptime");
        registry
            .register(Box::new(verify_total.clone()))
            .expect("register verify");
        registry
            .register(Box::new(fetch_fallback_total.clone()))
            .expect("register fallback");
        Self {
            registry,
            uptime_ms,
            verify_total,
            fetch_fallback_total,
        }
    }
}

#[derive(Clone)]
struct AppState {
    store: Arc<StreakStore>,
    engine: Arc<ReconciliationEngine>,
    resolver: Arc<BasenameResolver>,
    analysis: AnalysisClient,
    settings: Settings,
    metrics: Metrics,
    start_instant: Instant,
}

/// Errors surfaced to API clients. Only storage failures reach here; every
/// remote failure has already been absorbed into a degraded response.
enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct StatusResponse {
    service: ServiceInfo,
    uptime_ms: u64,
    connected_wallet: Option<String>,
    expected_chain_id: u64,
}

#[derive(Serialize)]
struct ServiceInfo {
    name: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ProfileResponse {
    profile: baseflow_core::WalletProfile,
    score: baseflow_core::ReputationScore,
    credentials: Vec<CredentialStatus>,
    display_name: String,
    is_basename: bool,
}

#[derive(Serialize)]
struct StreakResponse {
    address: String,
    current_streak: u64,
    total_check_ins: u64,
    next_milestone: u64,
    source: FetchSource,
}

#[derive(Serialize)]
struct VerifyResponse {
    address: String,
    current_streak: u64,
    total_check_ins: u64,
    next_milestone: u64,
    decision: &'static str,
    advisory: Option<String>,
}

#[derive(Serialize)]
struct SessionResponse {
    connected: Option<String>,
}

#[derive(Deserialize)]
struct SessionRequest {
    address: String,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        error!(error = %err, "node terminated with error");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let settings = Settings::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    info!(?settings, "starting baseflow-node");
    let store = Arc::new(StreakStore::open(&settings.db_path)?);

    let checkin = CheckInApiClient::new(CheckInApiConfig::new(&settings.checkin_api_url));
    let rpc = WalletRpcClient::new(WalletRpcConfig::new(&settings.wallet_rpc_url))?;
    warn_if_unexpected_chain(&rpc, settings.expected_chain_id).await;

    let resolver = Arc::new(BasenameResolver::new(
        BasenameResolverConfig::new(&settings.resolver_api_url),
        rpc.clone(),
    ));
    let analysis = AnalysisClient::new(AnalysisConfig::new(
        &settings.analysis_api_url,
        settings.analysis_api_key.clone(),
    ));
    let engine = Arc::new(ReconciliationEngine::new(
        Arc::clone(&store),
        Arc::new(checkin),
        Arc::new(rpc),
        EngineConfig {
            max_optimistic_drift: settings.max_optimistic_drift,
        },
    ));

    let state = AppState {
        store,
        engine,
        resolver,
        analysis,
        settings,
        metrics: Metrics::new(),
        start_instant: Instant::now(),
    };

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/readyz", get(ready))
        .route("/status", get(status))
        .route("/metrics", get(metrics_handler))
        .route("/v1/profile/:address", get(profile))
        .route("/v1/streak/:address", get(streak))
        .route("/v1/verify/:address", post(verify))
        .route("/v1/analyze/:address", post(analyze))
        .route(
            "/v1/session",
            get(session_get).put(session_put).delete(session_delete),
        )
        .with_state(state.clone());

    let addr: SocketAddr = state
        .settings
        .listen_addr
        .parse()
        .context("invalid listen address")?;
    info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn valid_address(address: &str) -> Result<String, ApiError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("address must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

async fn health() -> impl IntoResponse {
    "ok"
}

async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    if state.store.schema_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let uptime_millis = state.start_instant.elapsed().as_millis();
    let connected = state.store.session().connected()?;
    Ok(Json(StatusResponse {
        service: ServiceInfo {
            name: "baseflow-node",
            version: env!("CARGO_PKG_VERSION"),
        },
        uptime_ms: u64::try_from(uptime_millis).unwrap_or(u64::MAX),
        connected_wallet: connected,
        expected_chain_id: state.settings.expected_chain_id,
    }))
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime_millis = state.start_instant.elapsed().as_millis();
    state
        .metrics
        .uptime_ms
        .set(i64::try_from(uptime_millis).unwrap_or(i64::MAX));

    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("encode metrics");
    (StatusCode::OK, buffer)
}

async fn profile(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let address = valid_address(&address)?;
    let (profile, score) = generate(&address);
    let basename = state.resolver.resolve(&address).await;
    let is_basename = basename.is_some();
    let display_name = basename.unwrap_or_else(|| format_display_address(&address));
    Ok(Json(ProfileResponse {
        credentials: earned_credentials(score.total),
        profile,
        score,
        display_name,
        is_basename,
    }))
}

async fn streak(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<StreakResponse>, ApiError> {
    let address = valid_address(&address)?;
    let outcome = state.engine.fetch(&address).await?;
    if outcome.source == FetchSource::LocalFallback {
        state.metrics.fetch_fallback_total.inc();
    }
    Ok(Json(StreakResponse {
        address,
        current_streak: outcome.state.current_streak,
        total_check_ins: outcome.state.total_check_ins,
        next_milestone: next_milestone(outcome.state.current_streak),
        source: outcome.source,
    }))
}

async fn verify(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<VerifyResponse>, ApiError> {
    let address = valid_address(&address)?;
    let outcome = state.engine.verify(&address).await?;
    state
        .metrics
        .verify_total
        .with_label_values(&[outcome.decision.as_str()])
        .inc();
    Ok(Json(VerifyResponse {
        address,
        current_streak: outcome.state.current_streak,
        total_check_ins: outcome.state.total_check_ins,
        next_milestone: next_milestone(outcome.state.current_streak),
        decision: outcome.decision.as_str(),
        advisory: outcome.advisory,
    }))
}

async fn analyze(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<AnalysisOutcome>, ApiError> {
    let address = valid_address(&address)?;
    let (profile, score) = generate(&address);
    let outcome = state.analysis.analyze(&profile, &score).await;
    Ok(Json(outcome))
}

async fn session_get(State(state): State<AppState>) -> Result<Json<SessionResponse>, ApiError> {
    let connected = state.store.session().connected()?;
    Ok(Json(SessionResponse { connected }))
}

async fn session_put(
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let address = valid_address(&req.address)?;
    state.store.session().connect(&address)?;
    info!(%address, "wallet connected");
    let connected = state.store.session().connected()?;
    Ok(Json(SessionResponse { connected }))
}

/// Disconnect also clears the address's stored streak state: local state
/// lives exactly as long as the explicit session.
async fn session_delete(
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    if let Some(address) = state.store.session().disconnect()? {
        state.store.clear(&address)?;
        info!(%address, "wallet disconnected; local state cleared");
    }
    Ok(Json(SessionResponse { connected: None }))
}
