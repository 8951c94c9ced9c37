//! Lotwheel Backend Library
//!
//! Lot auction core: status FSM, weighted selection and elimination,
//! countdown timer and lot ordering, with PostgreSQL or in-memory storage and
//! WebSocket broadcasts.

pub mod config;
pub mod database;
pub mod error;
pub mod fsm;
pub mod models;
pub mod pacer;
pub mod repositories;
pub mod selection;
pub mod services;
pub mod session;
pub mod timer;
pub mod websocket;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{AppError, AppResult, AuctionError, AuctionResult};
pub use services::AuctionService;
pub use session::AuctionSession;

use config::AuctionDefaults;
use repositories::AuctionStore;
use std::sync::Arc;
use websocket::WebSocketServer;

/// Application state shared by the servers and background tasks
pub struct AppState {
    pub store: Arc<dyn AuctionStore>,
    pub ws: Arc<WebSocketServer>,
    pub service: Arc<AuctionService>,
}

impl AppState {
    /// Wire the service to a store and a fresh WebSocket server
    pub fn new(store: Arc<dyn AuctionStore>, defaults: AuctionDefaults) -> Self {
        let ws = Arc::new(WebSocketServer::new());
        let service = Arc::new(AuctionService::new(store.clone(), ws.clone(), defaults));

        Self { store, ws, service }
    }
}
