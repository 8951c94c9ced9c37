#![allow(dead_code)]

use lotwheel_backend::config::AuctionDefaults;
use lotwheel_backend::models::*;
use lotwheel_backend::repositories::{AuctionStore, MemoryStore};
use lotwheel_backend::services::AuctionService;
use lotwheel_backend::session::AuctionSession;
use lotwheel_backend::websocket::WebSocketServer;
use std::sync::Arc;
use uuid::Uuid;

/// Seed used by every test service so runs are reproducible
pub const TEST_SEED: u64 = 42;

/// Service wired to an in-memory store
pub struct TestApp {
    pub store: Arc<dyn AuctionStore>,
    pub ws: Arc<WebSocketServer>,
    pub service: AuctionService,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }

    pub fn with_store(store: Arc<dyn AuctionStore>) -> Self {
        let ws = Arc::new(WebSocketServer::new());
        let service = AuctionService::with_seed(store.clone(), ws.clone(), AuctionDefaults::default(), TEST_SEED);
        Self { store, ws, service }
    }

    /// Library lots named "Lot 1", "Lot 2", ... with the given sums
    pub async fn create_lots(&self, sums: &[i64]) -> Vec<Lot> {
        let mut lots = Vec::with_capacity(sums.len());
        for (i, &sum) in sums.iter().enumerate() {
            let lot = self
                .service
                .create_lot(NewLot::new(format!("Lot {}", i + 1), LotCategory::Games).with_sum(sum))
                .await
                .expect("Failed to create lot");
            lots.push(lot);
        }
        lots
    }

    /// New auction holding one lot per sum, in configured status
    pub async fn configured_auction(&self, settings: AuctionSettings, sums: &[i64]) -> (AuctionSession, Vec<Lot>) {
        let session = self
            .service
            .create_auction(settings)
            .await
            .expect("Failed to create auction");
        let lots = self.create_lots(sums).await;

        self.service
            .add_lots(session.id(), &lot_ids(&lots))
            .await
            .expect("Failed to add lots");

        let session = self
            .service
            .get_auction(session.id())
            .await
            .expect("Failed to reload auction");
        (session, lots)
    }

    /// Same as `configured_auction`, then started
    pub async fn running_auction(&self, settings: AuctionSettings, sums: &[i64]) -> (AuctionSession, Vec<Lot>) {
        let (session, lots) = self.configured_auction(settings, sums).await;
        let session = self
            .service
            .apply_event(session.id(), AuctionEvent::Start)
            .await
            .expect("Failed to start auction");
        (session, lots)
    }
}

pub fn settings(mode: AuctionMode, sub_mode: SubMode) -> AuctionSettings {
    AuctionSettings {
        mode,
        sub_mode,
        duration_sec: 60,
        spin_sec: 5,
    }
}

pub fn elimination_cards() -> AuctionSettings {
    settings(AuctionMode::Cards, SubMode::Elimination)
}

pub fn lot_ids(lots: &[Lot]) -> Vec<Uuid> {
    lots.iter().map(|lot| lot.id).collect()
}
