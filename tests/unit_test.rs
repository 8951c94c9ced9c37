mod helpers;

use chrono::Utc;
use helpers::*;
use lotwheel_backend::config::AuctionDefaults;
use lotwheel_backend::fsm::{available_actions, ActionVariant};
use lotwheel_backend::models::*;
use lotwheel_backend::repositories::MemoryStore;
use lotwheel_backend::selection::{elimination_probability, roulette_items, selection_weight, SelectionEngine};
use lotwheel_backend::services::AuctionService;
use lotwheel_backend::websocket::WebSocketServer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;

fn session_lots(sums: &[i64]) -> Vec<SessionLot> {
    let now = Utc::now();
    sums.iter()
        .enumerate()
        .map(|(i, &sum)| {
            let lot = NewLot::new(format!("Lot {}", i + 1), LotCategory::Games)
                .with_sum(sum)
                .into_lot(now);
            SessionLot::new(lot, i as i32 + 1, now)
        })
        .collect()
}

/// Unit tests for the weighting curve
#[test]
fn test_probability_curve() {
    assert!((elimination_probability(0) - 0.5).abs() < 1e-9);
    assert!((elimination_probability(100) - 0.25).abs() < 1e-9);
    assert!((elimination_probability(1_000_000) - 0.02).abs() < 1e-9);
    assert!((selection_weight(100) - 0.75).abs() < 1e-9);

    // Monotonic in the sum
    let mut previous = elimination_probability(0);
    for sum in (10..5000).step_by(10) {
        let p = elimination_probability(sum);
        assert!(p <= previous);
        previous = p;
    }
}

#[test]
fn test_donations_favour_a_lot() {
    let engine = SelectionEngine::default();
    let mut rng = StdRng::seed_from_u64(TEST_SEED);
    let template = session_lots(&[0, 1000]);
    let favourite = template[1].id();

    let runs = 1000;
    let mut wins = 0;
    for _ in 0..runs {
        let mut lots = template.clone();
        let summary = engine.run_elimination(&mut lots, &mut rng).unwrap();
        if summary.winner_id == favourite {
            wins += 1;
        }
    }

    assert!(wins > runs * 7 / 10, "favourite won only {} of {}", wins, runs);
}

#[test]
fn test_roulette_strip_skips_eliminated() {
    let engine = SelectionEngine::default();
    let mut rng = StdRng::seed_from_u64(3);
    let mut lots = session_lots(&[0, 100]);
    lots[0].eliminated = true;

    let items = roulette_items(&engine, &lots, &mut rng);
    // weight 0.75 -> 8 slots
    assert_eq!(items.len(), 8);
    assert!(items.iter().all(|&id| id == lots[1].id()));
}

#[test]
fn test_operator_controls_per_status() {
    let events = |status: AuctionStatus| -> Vec<AuctionEvent> {
        available_actions(status).iter().map(|a| a.event).collect()
    };

    assert_eq!(events(AuctionStatus::Idle), vec![AuctionEvent::Configure]);
    assert_eq!(
        events(AuctionStatus::Running),
        vec![AuctionEvent::Pause, AuctionEvent::Finish]
    );
    assert!(events(AuctionStatus::Archived).is_empty());

    let finish = available_actions(AuctionStatus::Paused)
        .into_iter()
        .find(|a| a.event == AuctionEvent::Finish)
        .unwrap();
    assert_eq!(finish.variant, ActionVariant::Destructive);
}

#[tokio::test]
async fn test_session_survives_restart_through_snapshot() {
    let path = std::env::temp_dir().join(format!("lotwheel-restart-{}.json", uuid::Uuid::new_v4()));

    let store = MemoryStore::open(path.clone()).await.unwrap();
    let app = TestApp::with_store(Arc::new(store.clone()));
    let (session, _) = app.running_auction(elimination_cards(), &[5, 50, 500]).await;
    app.service.play_round(session.id()).await.unwrap();
    let before = app.service.get_auction(session.id()).await.unwrap();
    let history_len = app.service.history(session.id()).await.unwrap().len();
    store.save_snapshot().await.unwrap();

    let restored = MemoryStore::open(path.clone()).await.unwrap();
    let service = AuctionService::with_seed(
        Arc::new(restored),
        Arc::new(WebSocketServer::new()),
        AuctionDefaults::default(),
        TEST_SEED,
    );

    let current = service.current_auction().await.unwrap().expect("active auction restored");
    assert_eq!(current, before);
    assert_eq!(service.history(session.id()).await.unwrap().len(), history_len);
    assert!(service.timer_state(session.id()).await.unwrap().running);

    let _ = std::fs::remove_file(&path);
}
