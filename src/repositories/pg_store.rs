//! PostgreSQL implementation of `AuctionStore`.
//!
//! Auction writes run in one transaction that locks the auction row with
//! `FOR UPDATE` and checks the expected status before touching anything.

use super::{AuctionStore, RepositoryResult, SessionWrite};
use crate::error::RepositoryError;
use crate::models::{
    Auction, AuctionStatus, HistoryRecord, Lot, LotCategory, NewHistoryRecord, SessionLot,
};
use crate::session::AuctionSession;
use crate::timer::TimerState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

const LOT_COLUMNS: &str = "id, title, image_url, category, description, sum, created_at, updated_at";

const AUCTION_COLUMNS: &str =
    "id, status, mode, sub_mode, duration_sec, spin_sec, winner_lot_id, started_at, finished_at, created_at";

#[derive(Debug, sqlx::FromRow)]
struct LotRow {
    id: Uuid,
    title: String,
    image_url: Option<String>,
    category: String,
    description: Option<String>,
    sum: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LotRow> for Lot {
    type Error = RepositoryError;

    fn try_from(row: LotRow) -> Result<Self, Self::Error> {
        Ok(Lot {
            id: row.id,
            title: row.title,
            image_url: row.image_url,
            category: row.category.parse().map_err(RepositoryError::Corrupt)?,
            description: row.description,
            sum: row.sum,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuctionRow {
    id: Uuid,
    status: String,
    mode: String,
    sub_mode: String,
    duration_sec: i32,
    spin_sec: i32,
    winner_lot_id: Option<Uuid>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

fn to_u32(value: i32, column: &str) -> RepositoryResult<u32> {
    u32::try_from(value).map_err(|_| RepositoryError::Corrupt(format!("negative {}: {}", column, value)))
}

impl TryFrom<AuctionRow> for Auction {
    type Error = RepositoryError;

    fn try_from(row: AuctionRow) -> Result<Self, Self::Error> {
        Ok(Auction {
            id: row.id,
            status: row.status.parse().map_err(RepositoryError::Corrupt)?,
            mode: row.mode.parse().map_err(RepositoryError::Corrupt)?,
            sub_mode: row.sub_mode.parse().map_err(RepositoryError::Corrupt)?,
            duration_sec: to_u32(row.duration_sec, "duration_sec")?,
            spin_sec: to_u32(row.spin_sec, "spin_sec")?,
            winner_lot_id: row.winner_lot_id,
            started_at: row.started_at,
            finished_at: row.finished_at,
            created_at: row.created_at,
        })
    }
}

/// `auction_lots` joined with `lots`
#[derive(Debug, sqlx::FromRow)]
struct SessionLotRow {
    id: Uuid,
    title: String,
    image_url: Option<String>,
    category: String,
    description: Option<String>,
    sum: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    position: i32,
    eliminated: bool,
    added_at: DateTime<Utc>,
}

impl TryFrom<SessionLotRow> for SessionLot {
    type Error = RepositoryError;

    fn try_from(row: SessionLotRow) -> Result<Self, Self::Error> {
        let lot = Lot::try_from(LotRow {
            id: row.id,
            title: row.title,
            image_url: row.image_url,
            category: row.category,
            description: row.description,
            sum: row.sum,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })?;
        Ok(SessionLot {
            lot,
            order: row.position,
            eliminated: row.eliminated,
            added_at: row.added_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    id: Uuid,
    auction_id: Uuid,
    event_type: String,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryRecord {
    fn from(row: HistoryRow) -> Self {
        HistoryRecord {
            id: row.id,
            auction_id: row.auction_id,
            event_type: row.event_type,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TimerRow {
    running: bool,
    ends_at: Option<DateTime<Utc>>,
    left_ms: i64,
    total_ms: i64,
}

impl From<TimerRow> for TimerState {
    fn from(row: TimerRow) -> Self {
        TimerState {
            running: row.running,
            ends_at: row.ends_at,
            left_ms: row.left_ms.max(0) as u64,
            total_ms: row.total_ms.max(0) as u64,
        }
    }
}

fn millis(value: u64) -> RepositoryResult<i64> {
    i64::try_from(value).map_err(|_| RepositoryError::ConstraintViolation(format!("timer value {} too large", value)))
}

/// Store backed by PostgreSQL
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_session_lots(&self, auction_id: Uuid) -> RepositoryResult<Vec<SessionLot>> {
        let rows = sqlx::query_as::<_, SessionLotRow>(
            r#"
            SELECT l.id, l.title, l.image_url, l.category, l.description, l.sum,
                   l.created_at, l.updated_at, al.position, al.eliminated, al.added_at
            FROM auction_lots al
            JOIN lots l ON l.id = al.lot_id
            WHERE al.auction_id = $1
            ORDER BY al.position ASC
            "#,
        )
        .bind(auction_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionLot::try_from).collect()
    }

    async fn hydrate(&self, row: AuctionRow) -> RepositoryResult<AuctionSession> {
        let auction = Auction::try_from(row)?;
        let lots = self.load_session_lots(auction.id).await?;
        Ok(AuctionSession::from_parts(auction, lots))
    }

    async fn write_auction_row(conn: &mut PgConnection, auction: &Auction) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            UPDATE auctions
            SET status = $2, mode = $3, sub_mode = $4, duration_sec = $5, spin_sec = $6,
                winner_lot_id = $7, started_at = $8, finished_at = $9
            WHERE id = $1
            "#,
        )
        .bind(auction.id)
        .bind(auction.status.as_str())
        .bind(auction.mode.as_str())
        .bind(auction.sub_mode.as_str())
        .bind(auction.duration_sec as i32)
        .bind(auction.spin_sec as i32)
        .bind(auction.winner_lot_id)
        .bind(auction.started_at)
        .bind(auction.finished_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn write_lot_list(conn: &mut PgConnection, session: &AuctionSession) -> RepositoryResult<()> {
        let keep: Vec<Uuid> = session.lots().iter().map(|lot| lot.id()).collect();
        sqlx::query("DELETE FROM auction_lots WHERE auction_id = $1 AND NOT (lot_id = ANY($2))")
            .bind(session.id())
            .bind(keep)
            .execute(&mut *conn)
            .await?;

        for lot in session.lots() {
            sqlx::query(
                r#"
                INSERT INTO auction_lots (auction_id, lot_id, position, eliminated, added_at)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (auction_id, lot_id) DO UPDATE
                SET position = EXCLUDED.position, eliminated = EXCLUDED.eliminated
                "#,
            )
            .bind(session.id())
            .bind(lot.id())
            .bind(lot.order)
            .bind(lot.eliminated)
            .bind(lot.added_at)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn write_history(conn: &mut PgConnection, history: &[NewHistoryRecord]) -> RepositoryResult<()> {
        for record in history.iter().cloned().map(NewHistoryRecord::into_record) {
            sqlx::query(
                r#"
                INSERT INTO history_records (id, auction_id, event_type, payload, created_at)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(record.id)
            .bind(record.auction_id)
            .bind(&record.event_type)
            .bind(&record.payload)
            .bind(record.created_at)
            .execute(&mut *conn)
            .await?;
        }
        Ok(())
    }

    async fn write_timer(conn: &mut PgConnection, auction_id: Uuid, timer: &TimerState) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO auction_timers (auction_id, running, ends_at, left_ms, total_ms, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (auction_id) DO UPDATE
            SET running = EXCLUDED.running, ends_at = EXCLUDED.ends_at,
                left_ms = EXCLUDED.left_ms, total_ms = EXCLUDED.total_ms, updated_at = NOW()
            "#,
        )
        .bind(auction_id)
        .bind(timer.running)
        .bind(timer.ends_at)
        .bind(millis(timer.left_ms)?)
        .bind(millis(timer.total_ms)?)
        .execute(conn)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl AuctionStore for PgStore {
    async fn insert_lot(&self, lot: &Lot) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO lots (id, title, image_url, category, description, sum, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(lot.id)
        .bind(&lot.title)
        .bind(&lot.image_url)
        .bind(lot.category.as_str())
        .bind(&lot.description)
        .bind(lot.sum)
        .bind(lot.created_at)
        .bind(lot.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_lot(&self, id: Uuid) -> RepositoryResult<Option<Lot>> {
        sqlx::query_as::<_, LotRow>(&format!("SELECT {} FROM lots WHERE id = $1", LOT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Lot::try_from)
            .transpose()
    }

    async fn find_lots(&self, ids: &[Uuid]) -> RepositoryResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, LotRow>(&format!("SELECT {} FROM lots WHERE id = ANY($1)", LOT_COLUMNS))
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        let mut by_id = HashMap::with_capacity(rows.len());
        for row in rows {
            let lot = Lot::try_from(row)?;
            by_id.insert(lot.id, lot);
        }
        Ok(ids.iter().filter_map(|id| by_id.get(id).cloned()).collect())
    }

    async fn list_lots(&self, category: Option<LotCategory>) -> RepositoryResult<Vec<Lot>> {
        let rows = sqlx::query_as::<_, LotRow>(&format!(
            "SELECT {} FROM lots WHERE ($1::text IS NULL OR category = $1) ORDER BY created_at DESC, title ASC",
            LOT_COLUMNS
        ))
        .bind(category.map(|c| c.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Lot::try_from).collect()
    }

    async fn increase_lot_sum(&self, id: Uuid, amount: i64, at: DateTime<Utc>) -> RepositoryResult<Lot> {
        sqlx::query_as::<_, LotRow>(&format!(
            "UPDATE lots SET sum = sum + $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            LOT_COLUMNS
        ))
        .bind(id)
        .bind(amount)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Lot {} not found", id)))
        .and_then(Lot::try_from)
    }

    async fn set_lot_sum(&self, id: Uuid, sum: i64, at: DateTime<Utc>) -> RepositoryResult<Lot> {
        sqlx::query_as::<_, LotRow>(&format!(
            "UPDATE lots SET sum = $2, updated_at = $3 WHERE id = $1 RETURNING {}",
            LOT_COLUMNS
        ))
        .bind(id)
        .bind(sum)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| RepositoryError::NotFound(format!("Lot {} not found", id)))
        .and_then(Lot::try_from)
    }

    async fn insert_session(&self, session: &AuctionSession, history: &[NewHistoryRecord]) -> RepositoryResult<()> {
        let auction = &session.auction;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO auctions
                (id, status, mode, sub_mode, duration_sec, spin_sec, winner_lot_id, started_at, finished_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(auction.id)
        .bind(auction.status.as_str())
        .bind(auction.mode.as_str())
        .bind(auction.sub_mode.as_str())
        .bind(auction.duration_sec as i32)
        .bind(auction.spin_sec as i32)
        .bind(auction.winner_lot_id)
        .bind(auction.started_at)
        .bind(auction.finished_at)
        .bind(auction.created_at)
        .execute(&mut *tx)
        .await?;

        Self::write_lot_list(&mut *tx, session).await?;
        Self::write_history(&mut *tx, history).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> RepositoryResult<Option<AuctionSession>> {
        let row = sqlx::query_as::<_, AuctionRow>(&format!("SELECT {} FROM auctions WHERE id = $1", AUCTION_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn find_active_session(&self) -> RepositoryResult<Option<AuctionSession>> {
        let row = sqlx::query_as::<_, AuctionRow>(&format!(
            r#"
            SELECT {} FROM auctions
            WHERE status IN ('configured', 'running', 'paused')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            AUCTION_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn list_auctions(
        &self,
        status: Option<AuctionStatus>,
        limit: i64,
        offset: i64,
    ) -> RepositoryResult<Vec<Auction>> {
        let rows = sqlx::query_as::<_, AuctionRow>(&format!(
            r#"
            SELECT {} FROM auctions
            WHERE ($1::text IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            AUCTION_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Auction::try_from).collect()
    }

    async fn save_session(&self, write: SessionWrite<'_>) -> RepositoryResult<()> {
        let id = write.session.id();
        let mut tx = self.pool.begin().await?;

        let current: Option<(String,)> = sqlx::query_as("SELECT status FROM auctions WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        match current {
            None => return Err(RepositoryError::NotFound(format!("Auction {} not found", id))),
            Some((status,)) if status != write.expected_status.as_str() => {
                return Err(RepositoryError::Conflict(format!(
                    "auction {} is '{}', expected '{}'",
                    id, status, write.expected_status
                )));
            }
            Some(_) => {}
        }

        Self::write_auction_row(&mut *tx, &write.session.auction).await?;
        Self::write_lot_list(&mut *tx, write.session).await?;
        Self::write_history(&mut *tx, write.history).await?;
        if let Some(timer) = write.timer {
            Self::write_timer(&mut *tx, id, timer).await?;
        }

        tx.commit().await?;
        debug!(auction_id = %id, history = write.history.len(), "Auction saved");
        Ok(())
    }

    async fn delete_auction(&self, id: Uuid) -> RepositoryResult<bool> {
        let result = sqlx::query("DELETE FROM auctions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_history(&self, auction_id: Uuid) -> RepositoryResult<Vec<HistoryRecord>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, auction_id, event_type, payload, created_at
            FROM history_records
            WHERE auction_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(auction_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(HistoryRecord::from).collect())
    }

    async fn save_timer(&self, auction_id: Uuid, state: &TimerState) -> RepositoryResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::write_timer(&mut *conn, auction_id, state).await
    }

    async fn load_timer(&self, auction_id: Uuid) -> RepositoryResult<Option<TimerState>> {
        let row = sqlx::query_as::<_, TimerRow>(
            "SELECT running, ends_at, left_ms, total_ms FROM auction_timers WHERE auction_id = $1",
        )
        .bind(auction_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(TimerState::from))
    }
}
