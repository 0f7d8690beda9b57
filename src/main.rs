//! Tipster Backend Service
//!
//! Main entry point for the league settlement engine.
//! This service provides:
//! - WebSocket feed of bet activity
//! - JSON-lines audit trail
//! - Background sweep that auto-confirms, closes votes and finalizes bets

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tipster_backend::clock::SystemClock;
use tipster_backend::database::{create_pool, run_migrations};
use tipster_backend::repositories::{LedgerStore, MemoryStore, PgStore};
use tipster_backend::services::{
    ActivityFeed, AuditTrailService, HttpOracle, NoOracle, ResultOracle,
};
use tipster_backend::websocket::WebSocketServer;
use tipster_backend::{AppConfig, AppError, Engine};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    // Initialize tracing/logging with config
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("tipster_backend={},sqlx=warn", config.log_level).into()
    });
    if config.json_logs() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Tipster Backend Service Starting               ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("Finalize sweep every {:?}", config.engine.finalize_interval());
    info!("Payout batch size: {}", config.engine.payout_batch_size);

    // =========================================================================
    // STORE SETUP
    // =========================================================================
    match &config.database {
        Some(db_config) => {
            info!("Connecting to database...");
            let pool = create_pool(db_config)
                .await
                .context("Failed to create database pool")?;
            info!("Database connection pool created successfully");
            info!("Max connections: {}", db_config.max_connections);

            info!("Running database migrations...");
            run_migrations(&pool, None)
                .await
                .context("Database migration failed")?;
            info!("Database migrations completed successfully");

            serve(Arc::new(PgStore::new(pool)), config).await
        }
        None => {
            warn!("DATABASE_URL not set - using the in-memory store, state is lost on exit");
            serve(Arc::new(MemoryStore::new()), config).await
        }
    }
}

async fn serve<S: LedgerStore>(store: Arc<S>, config: AppConfig) -> anyhow::Result<()> {
    // =========================================================================
    // CORE SERVICES INITIALIZATION
    // =========================================================================
    info!("Initializing core services...");

    let audit_trail = Arc::new(
        AuditTrailService::new(&config.engine.audit_log_dir)
            .context("Audit trail initialization failed")?,
    );
    info!("✓ Audit trail service initialized");

    let ws_server = Arc::new(WebSocketServer::new());
    info!("✓ WebSocket server initialized");

    let feed = ActivityFeed::new()
        .with_sink(audit_trail)
        .with_sink(ws_server.clone());

    let oracle: Arc<dyn ResultOracle> = match &config.engine.oracle_url {
        Some(url) => {
            info!("✓ Result oracle at {}", url);
            Arc::new(HttpOracle::new(url.clone(), config.engine.oracle_timeout()))
        }
        None => {
            warn!("ORACLE_URL not configured - auto-confirm waits for manual results");
            Arc::new(NoOracle)
        }
    };

    let engine = Engine::new(store, Arc::new(SystemClock), oracle, feed, &config.engine);
    info!("✓ Settlement engine initialized");

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    let finalizer = engine.finalizer.clone();
    let finalizer_handle = tokio::spawn(finalizer.start());
    info!("✓ Auto-finalizer background task started");

    // Start WebSocket server (if HTTP port is configured)
    let ws_handle = if let Some(http_port) = config.http_port {
        let ws_addr: SocketAddr = format!("0.0.0.0:{}", http_port)
            .parse()
            .context("Invalid WebSocket address")?;

        info!("Starting WebSocket server on {}...", ws_addr);
        let listener = TcpListener::bind(ws_addr)
            .await
            .context("Failed to bind WebSocket server")?;

        let handle = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        info!("New WebSocket connection from {}", addr);
                        let ws = ws_server.clone();
                        tokio::spawn(async move {
                            if let Err(e) = ws.handle_connection(stream).await {
                                error!("WebSocket connection error: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("WebSocket accept error: {}", e);
                    }
                }
            }
        });

        info!("✓ WebSocket server started on {}", ws_addr);
        Some(handle)
    } else {
        warn!("HTTP_PORT not configured - WebSocket server not started");
        None
    };

    info!("Tipster backend ready. Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = finalizer_handle => {
            error!("Auto-finalizer task exited unexpectedly");
        }
        _ = async {
            if let Some(handle) = ws_handle {
                handle.await.ok();
            } else {
                // Never completes if WebSocket is not running
                futures::future::pending::<()>().await;
            }
        } => {
            error!("WebSocket server exited unexpectedly");
        }
    }

    info!("Tipster backend service shutdown complete");
    Ok(())
}
