//! Process entry point: the single runner that loads settings, validates
//! startup, and owns the bot fleet for every active team (§6 CLI surface).
//!
//! Load config, init tracing, build one backend, run until a shutdown
//! signal arrives — generalized from a single-process bootstrap into a
//! multi-tenant supervisor: one store, one registry, one fleet of per-team
//! Telegram workers, one health server.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use clap::Parser;
use kickai_core::config::Settings;
use kickai_core::fleet::{BotWorkerFactory, FleetManager};
use kickai_core::health::{
    AgentHealthChecker, DomainServiceHealthChecker, ExternalHealthChecker, FleetHealthChecker, StoreHealthChecker,
};
use kickai_core::registry::{RegistryConfig, ServiceDefinition, ServiceRegistry, ServiceType};
use kickai_core::router::MessageRouter;
use kickai_core::store::{MemoryStore, Store, create_sqlite_store};
use kickai_core::team_cache::TeamConfigCache;
use kickai_telegram::TelegramBotWorkerFactory;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kickai", about = "Runs the multi-tenant football team chat-bot fleet")]
struct Args {
    /// Path to a TOML config file, overriding the default search order.
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[derive(Clone)]
struct AppState {
    fleet: Arc<FleetManager>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    bot_running: bool,
    timestamp: String,
}

#[derive(Serialize)]
struct DetailedHealthResponse {
    status: &'static str,
    bot_running: bool,
    timestamp: String,
    running_teams: Vec<String>,
    failed_teams: Vec<String>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let running = !state.fleet.list_running().await.is_empty();
    Json(HealthResponse {
        status: if running { "ok" } else { "degraded" },
        bot_running: running,
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn health_detailed(State(state): State<AppState>) -> Json<DetailedHealthResponse> {
    let running_teams = state.fleet.list_running().await;
    let failed_teams = state.fleet.list_failed().await;
    let bot_running = !running_teams.is_empty();
    Json(DetailedHealthResponse {
        status: if bot_running { "ok" } else { "degraded" },
        bot_running,
        timestamp: chrono::Utc::now().to_rfc3339(),
        running_teams,
        failed_teams,
    })
}

async fn build_store(settings: &Settings) -> anyhow::Result<Arc<dyn Store>> {
    if settings.use_mock_datastore {
        info!("using in-memory document store (USE_MOCK_DATASTORE)");
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        return Ok(store);
    }
    let database_url = std::env::var("DATABASE_URL").ok();
    let sqlite = create_sqlite_store(database_url.as_deref()).await?;
    let store: Arc<dyn Store> = Arc::new(sqlite);
    Ok(store)
}

async fn run() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let settings = match Settings::load(args.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return Ok(ExitCode::from(1));
        }
    };
    init_tracing(&settings);
    let settings = Arc::new(settings);

    let store = build_store(&settings).await?;
    let registry = Arc::new(ServiceRegistry::new(RegistryConfig::from(&settings.registry)));
    registry.add_health_checker(Arc::new(StoreHealthChecker));
    registry.add_health_checker(Arc::new(DomainServiceHealthChecker));
    registry.add_health_checker(Arc::new(AgentHealthChecker));
    registry.add_health_checker(Arc::new(ExternalHealthChecker));
    registry.add_health_checker(Arc::new(FleetHealthChecker));

    let store_instance: Arc<dyn std::any::Any + Send + Sync> = Arc::new(store.clone());
    registry.register_service(ServiceDefinition::new("store", ServiceType::Core), Some(store_instance));

    let team_cache = Arc::new(TeamConfigCache::new());
    if let Err(e) = team_cache.initialize(store.as_ref()).await {
        error!(error = %e, "failed to load team configuration");
        return Ok(ExitCode::from(1));
    }

    let validator = kickai_core::startup::StartupValidator::new(settings.clone(), store.clone(), registry.clone());
    let report = validator.run().await;
    for result in &report.results {
        if result.passed {
            info!(phase = %result.message, "startup phase ok");
        } else {
            error!(phase = %result.message, details = ?result.details, "startup phase failed");
        }
    }
    if !report.passed() {
        return Ok(ExitCode::from(1));
    }

    let router = Arc::new(MessageRouter::new(store.clone(), team_cache.clone(), registry.clone()));
    let factory: Arc<dyn BotWorkerFactory> = Arc::new(TelegramBotWorkerFactory::new(router));
    let fleet = Arc::new(FleetManager::new(store.clone(), team_cache.clone(), factory));

    fleet.load().await?;
    fleet.start_all().await;

    let fleet_instance: Arc<dyn std::any::Any + Send + Sync> = Arc::new(fleet.clone());
    registry.register_service(ServiceDefinition::new("fleet", ServiceType::Core), Some(fleet_instance));

    for failed_team in fleet.list_failed().await {
        warn!(team_id = %failed_team, "team excluded from fleet at startup");
    }

    let app = axum::Router::new()
        .route("/health", get(health))
        .route("/health/detailed", get(health_detailed))
        .with_state(AppState { fleet: fleet.clone() });
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "health server listening");
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "health server exited");
        }
    });

    wait_for_shutdown_signal().await;
    info!("shutdown signal received, stopping fleet");

    server.abort();
    fleet.stop_all(SHUTDOWN_GRACE).await;

    Ok(ExitCode::SUCCESS)
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal runtime error: {e}");
            ExitCode::from(2)
        }
    }
}
