//! PostgreSQL store tests. They need a reachable `DATABASE_URL` and are
//! ignored by default: `cargo test -- --ignored`.

mod helpers;

use chrono::Utc;
use helpers::*;
use lotwheel_backend::error::RepositoryError;
use lotwheel_backend::models::*;
use lotwheel_backend::repositories::*;
use lotwheel_backend::session::AuctionSession;
use lotwheel_backend::timer::CountdownTimer;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use uuid::Uuid;

async fn insert_lots(store: &PgStore, sums: &[i64]) -> Vec<Lot> {
    let now = Utc::now();
    let mut lots = Vec::new();
    for (i, &sum) in sums.iter().enumerate() {
        let lot = NewLot::new(format!("Lot {}", i + 1), LotCategory::Games)
            .with_sum(sum)
            .into_lot(now);
        store.insert_lot(&lot).await.expect("Failed to insert lot");
        lots.push(lot);
    }
    lots
}

fn order_of(session: &AuctionSession) -> Vec<Uuid> {
    session.lots().iter().map(|lot| lot.id()).collect()
}

// ============================================================================
// Migration Tests
// ============================================================================

#[sqlx::test]
#[ignore]
async fn test_migrations_ran(pool: PgPool) {
    let tables = vec!["lots", "auctions", "auction_lots", "history_records", "auction_timers"];

    for table in tables {
        let exists: bool = sqlx::query(
            "SELECT EXISTS (SELECT FROM information_schema.tables WHERE table_name = $1)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap()
        .get(0);
        assert!(exists, "Table {} should exist", table);
    }
}

// ============================================================================
// Lot library
// ============================================================================

#[sqlx::test]
#[ignore]
async fn test_lot_insert_and_find(pool: PgPool) {
    let store = PgStore::new(pool);
    let lots = insert_lots(&store, &[10, 20]).await;

    let found = store.find_lot(lots[0].id).await.unwrap().unwrap();
    assert_eq!(found.title, "Lot 1");
    assert_eq!(found.sum, 10);

    let missing = Uuid::new_v4();
    let found = store.find_lots(&[lots[1].id, missing, lots[0].id]).await.unwrap();
    assert_eq!(found.iter().map(|l| l.id).collect::<Vec<_>>(), vec![lots[1].id, lots[0].id]);

    let err = store.insert_lot(&lots[0]).await.unwrap_err();
    assert!(matches!(err, RepositoryError::Duplicate(_)));
}

#[sqlx::test]
#[ignore]
async fn test_lot_sum_updates(pool: PgPool) {
    let store = PgStore::new(pool);
    let lot = insert_lots(&store, &[10]).await.remove(0);

    let lot = store.increase_lot_sum(lot.id, 5, Utc::now()).await.unwrap();
    assert_eq!(lot.sum, 15);

    let lot = store.set_lot_sum(lot.id, 0, Utc::now()).await.unwrap();
    assert_eq!(lot.sum, 0);

    let err = store
        .increase_lot_sum(Uuid::new_v4(), 5, Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::NotFound(_)));
}

// ============================================================================
// Sessions
// ============================================================================

#[sqlx::test]
#[ignore]
async fn test_session_round_trip(pool: PgPool) {
    let store = PgStore::new(pool);
    let lots = insert_lots(&store, &[1, 2, 3]).await;
    let now = Utc::now();

    let mut session = AuctionSession::new(elimination_cards(), now).unwrap();
    store.insert_session(&session, &[]).await.unwrap();

    let added = session.add_lots(lots.clone(), now).unwrap();
    store
        .save_session(SessionWrite::new(&session, AuctionStatus::Idle).with_history(&added.history))
        .await
        .unwrap();

    let stored = store.find_session(session.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), AuctionStatus::Configured);
    assert_eq!(order_of(&stored), lot_ids(&lots));

    let active = store.find_active_session().await.unwrap().unwrap();
    assert_eq!(active.id(), session.id());

    let history = store.list_history(session.id()).await.unwrap();
    assert_eq!(history.len(), added.history.len());
}

#[sqlx::test]
#[ignore]
async fn test_reorder_swaps_positions(pool: PgPool) {
    let store = PgStore::new(pool);
    let lots = insert_lots(&store, &[1, 2]).await;
    let now = Utc::now();

    let mut session = AuctionSession::new(elimination_cards(), now).unwrap();
    store.insert_session(&session, &[]).await.unwrap();
    session.add_lots(lots.clone(), now).unwrap();
    store
        .save_session(SessionWrite::new(&session, AuctionStatus::Idle))
        .await
        .unwrap();

    // Swapping positions passes the deferred unique constraint
    let record = session
        .reorder(&[LotOrder::new(lots[0].id, 2), LotOrder::new(lots[1].id, 1)], now)
        .unwrap();
    store
        .save_session(SessionWrite::new(&session, AuctionStatus::Configured).with_history(&[record]))
        .await
        .unwrap();

    let stored = store.find_session(session.id()).await.unwrap().unwrap();
    assert_eq!(order_of(&stored), vec![lots[1].id, lots[0].id]);
}

#[sqlx::test]
#[ignore]
async fn test_stale_write_is_rejected(pool: PgPool) {
    let store = PgStore::new(pool);
    let lots = insert_lots(&store, &[1]).await;
    let now = Utc::now();

    let mut session = AuctionSession::new(elimination_cards(), now).unwrap();
    store.insert_session(&session, &[]).await.unwrap();
    session.add_lots(lots, now).unwrap();

    let err = store
        .save_session(SessionWrite::new(&session, AuctionStatus::Running))
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Conflict(_)));

    let stored = store.find_session(session.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), AuctionStatus::Idle);
    assert!(stored.lots().is_empty());
}

#[sqlx::test]
#[ignore]
async fn test_timer_and_delete(pool: PgPool) {
    let store = PgStore::new(pool);
    let now = Utc::now();
    let session = AuctionSession::new(elimination_cards(), now).unwrap();
    store.insert_session(&session, &[]).await.unwrap();

    let mut timer = CountdownTimer::new(60).unwrap();
    timer.start(now);
    store.save_timer(session.id(), timer.state()).await.unwrap();

    let loaded = store.load_timer(session.id()).await.unwrap().unwrap();
    assert!(loaded.running);
    assert_eq!(loaded.total_ms, 60_000);

    assert!(store.delete_auction(session.id()).await.unwrap());
    assert!(store.load_timer(session.id()).await.unwrap().is_none());
    assert!(!store.delete_auction(session.id()).await.unwrap());
}

// ============================================================================
// Service on PostgreSQL
// ============================================================================

#[sqlx::test]
#[ignore]
async fn test_service_run_on_postgres(pool: PgPool) {
    let app = TestApp::with_store(Arc::new(PgStore::new(pool)));
    let (session, lots) = app.running_auction(elimination_cards(), &[0, 100, 1000]).await;

    let run = app.service.run_to_winner(session.id()).await.unwrap();
    assert!(lot_ids(&lots).contains(&run.winner_id));

    let stored = app.service.get_auction(session.id()).await.unwrap();
    assert_eq!(stored.auction.winner_lot_id, Some(run.winner_id));
    assert_eq!(stored.eligible_lots().len(), 1);
}
