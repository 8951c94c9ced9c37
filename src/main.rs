//! Lotwheel Backend Service
//!
//! Main entry point for the lot auction backend.
//! This service provides:
//! - WebSocket server for status, lot and timer updates
//! - Background pacer for the auction countdown
//! - Snapshot persistence when running without a database

use lotwheel_backend::config::AppConfig;
use lotwheel_backend::database::{create_pool, run_migrations};
use lotwheel_backend::error::{AppError, AppResult};
use lotwheel_backend::pacer::{Pacer, SnapshotWriter};
use lotwheel_backend::repositories::{AuctionStore, MemoryStore, PgStore};
use lotwheel_backend::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lotwheel_backend={},sqlx=warn", config.log_level).into()),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Lotwheel Backend Service Starting               ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!(
        "Auction defaults: {}s duration, {}s spin",
        config.auction.duration_sec, config.auction.spin_sec
    );

    // =========================================================================
    // STORAGE SETUP
    // =========================================================================
    info!("Storage: {}", if config.uses_database() { "postgresql" } else { "in-memory" });
    if config.is_production() && !config.uses_database() {
        warn!("Running in production without DATABASE_URL");
    }

    let mut snapshot_store: Option<MemoryStore> = None;

    let store: Arc<dyn AuctionStore> = match &config.database {
        Some(db_config) => {
            info!("Connecting to database...");
            let pool = create_pool(db_config).await.map_err(|e| {
                error!("Failed to create database pool: {}", e);
                AppError::Database(e)
            })?;
            info!("Max connections: {}", db_config.max_connections);

            info!("Running database migrations...");
            run_migrations(&pool, None).await.map_err(|e| {
                error!("Database migration failed: {}", e);
                AppError::Database(e)
            })?;
            info!("✓ PostgreSQL store ready");

            Arc::new(PgStore::new(pool))
        }
        None => {
            let memory = match &config.snapshot_path {
                Some(path) => MemoryStore::open(path.clone()).await.map_err(|e| {
                    error!("Failed to open snapshot: {}", e);
                    AppError::from(e)
                })?,
                None => {
                    warn!("DATABASE_URL and SNAPSHOT_PATH not set - state is lost on shutdown");
                    MemoryStore::new()
                }
            };
            info!("✓ In-memory store ready");

            if memory.snapshot_path().is_some() {
                snapshot_store = Some(memory.clone());
            }
            Arc::new(memory)
        }
    };

    // =========================================================================
    // CORE SERVICES INITIALIZATION
    // =========================================================================
    let app_state = Arc::new(AppState::new(store, config.auction.clone()));
    info!("✓ Auction service initialized");

    match app_state.service.current_auction().await {
        Ok(Some(session)) => info!(
            "Resuming auction {} in status '{}' with {} lots",
            session.id(),
            session.status(),
            session.lots().len()
        ),
        Ok(None) => info!("No active auction"),
        Err(e) => warn!("Could not load current auction: {}", e),
    }

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    let pacer = Pacer::new(app_state.service.clone()).with_tick_interval(config.auction.tick_interval());
    let pacer_handle = tokio::spawn(async move {
        pacer.start().await;
    });
    info!("✓ Pacer background task started ({}ms interval)", config.auction.tick_interval_ms);

    let snapshot_handle = snapshot_store.clone().map(|memory| {
        let writer = SnapshotWriter::new(memory);
        tokio::spawn(async move {
            writer.start().await;
        })
    });

    // =========================================================================
    // START SERVERS
    // =========================================================================
    let ws_handle = if let Some(ws_port) = config.ws_port {
        let ws_addr: SocketAddr = format!("0.0.0.0:{}", ws_port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid WebSocket address: {}", e)))?;

        let listener = TcpListener::bind(ws_addr)
            .await
            .map_err(|e| AppError::Message(format!("Failed to bind WebSocket server: {}", e)))?;

        let ws_server = app_state.ws.clone();
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
        warn!("WS_PORT not configured - WebSocket server not started");
        None
    };

    // =========================================================================
    // READY
    // =========================================================================
    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║           Lotwheel Backend Service Ready!                 ║");
    info!("╚══════════════════════════════════════════════════════════╝");
    info!("Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = pacer_handle => {
            error!("Pacer task exited unexpectedly");
        }
        _ = async {
            if let Some(handle) = snapshot_handle {
                handle.await.ok();
            } else {
                futures::future::pending::<()>().await;
            }
        } => {
            error!("Snapshot writer exited unexpectedly");
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

    if let Some(memory) = snapshot_store {
        match memory.save_snapshot().await {
            Ok(()) => info!("Final snapshot written"),
            Err(e) => error!("Failed to write final snapshot: {}", e),
        }
    }

    info!("Lotwheel backend service shutdown complete");
    Ok(())
}
