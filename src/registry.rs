use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::config::{NEUTRAL_QUOTE, STARTING_BALANCE};
use crate::error::{AppError, Result};
use crate::store::{self, MarketLocks, MarketRow, MatchRow, ParticipantRow};
use crate::types::{ActiveMatch, MarketState, MarketView, MatchState, ProviderIdentity, Side};

/// Durable record of tracked matches, participant-team assignments and their
/// canonical markets.
pub struct MatchRegistry {
    pool: SqlitePool,
    locks: Arc<MarketLocks>,
}

impl MatchRegistry {
    pub fn new(pool: SqlitePool, locks: Arc<MarketLocks>) -> Self {
        Self { pool, locks }
    }

    /// Link (or relink) a user to an external contest identity. Relinking
    /// overwrites the previous identity, never duplicates. First link also
    /// creates the user's balance row.
    pub async fn link_participant(&self, user: &str, identity: &ProviderIdentity) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        store::ensure_user(&mut *tx, user, STARTING_BALANCE).await?;
        sqlx::query(
            r#"
            INSERT INTO participants (user_name, puuid, riot_tag, linked_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(user_name) DO UPDATE SET
                puuid = excluded.puuid,
                riot_tag = excluded.riot_tag,
                linked_at = excluded.linked_at
            "#,
        )
        .bind(user)
        .bind(&identity.puuid)
        .bind(&identity.riot_tag)
        .bind(now_secs())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(user, riot_tag = %identity.riot_tag, "participant linked");
        Ok(())
    }

    pub async fn tracked_participants(&self) -> Result<Vec<ParticipantRow>> {
        let rows = sqlx::query_as::<_, ParticipantRow>("SELECT * FROM participants")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Matches the registry still believes ONGOING for a participant.
    pub async fn ongoing_matches_for(&self, puuid: &str) -> Result<Vec<MatchRow>> {
        let rows = sqlx::query_as::<_, MatchRow>(
            r#"
            SELECT m.* FROM matches m
            JOIN assignments a ON a.match_id = m.external_id
            WHERE a.puuid = ? AND m.state = 'ONGOING'
            "#,
        )
        .bind(puuid)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// First sighting creates the match (ONGOING, result unset) and its
    /// canonical market (OPEN, neutral quote); repeat sightings only refresh
    /// the participant's assignment. Create-or-fetch on the market: when two
    /// concurrent calls both observe it absent, the uniqueness constraint
    /// collapses them onto a single surviving row.
    pub async fn open_or_join(
        &self,
        user: &str,
        puuid: &str,
        active: &ActiveMatch,
    ) -> Result<MarketRow> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query(
            "INSERT OR IGNORE INTO matches (external_id, started_at) VALUES (?, ?)",
        )
        .bind(&active.external_id)
        .bind(active.started_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let match_row = store::match_by_id(&mut *tx, &active.external_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("match {}", active.external_id)))?;
        if match_row.state() == MatchState::Finished {
            return Err(AppError::Conflict(format!(
                "match {} already finished",
                active.external_id
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO assignments (match_id, user_name, puuid, side, champion)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(match_id, user_name) DO UPDATE SET
                side = excluded.side,
                champion = excluded.champion
            "#,
        )
        .bind(&active.external_id)
        .bind(user)
        .bind(puuid)
        .bind(active.side.as_str())
        .bind(active.champion)
        .execute(&mut *tx)
        .await?;

        // Informational only: several tracked users queued into the same game
        // on the same team.
        let teammates: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM assignments WHERE match_id = ? AND side = ?",
        )
        .bind(&active.external_id)
        .bind(active.side.as_str())
        .fetch_one(&mut *tx)
        .await?;
        if teammates >= 2 {
            info!(
                match_id = %active.external_id,
                side = %active.side,
                teammates,
                "grouped queue detected",
            );
        }

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO markets
                (match_id, kind, title, state, quote_a, quote_b, created_at)
            VALUES (?, 'match_outcome', ?, 'OPEN', ?, ?, ?)
            "#,
        )
        .bind(&active.external_id)
        .bind(format!("Match outcome: {}", active.external_id))
        .bind(NEUTRAL_QUOTE)
        .bind(NEUTRAL_QUOTE)
        .bind(now_secs())
        .execute(&mut *tx)
        .await?;

        let market = store::market_for_match(&mut *tx, &active.external_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("market for match {}", active.external_id))
            })?;

        tx.commit().await?;

        if created == 1 {
            info!(
                match_id = %active.external_id,
                market_id = market.id,
                user,
                "match opened",
            );
        }
        Ok(market)
    }

    /// Administrative OPEN → CLOSED. Serialized with placement on the same
    /// market so a wager can never be admitted against a closing market.
    pub async fn close_market(&self, market_id: i64) -> Result<MarketView> {
        let lock = self.locks.for_market(market_id);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;
        let market = store::market_by_id(&mut *tx, market_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("market {market_id}")))?;
        if market.state() != MarketState::Open {
            return Err(AppError::Conflict(format!(
                "market {market_id} is {}",
                market.state()
            )));
        }

        sqlx::query("UPDATE markets SET state = 'CLOSED' WHERE id = ? AND state = 'OPEN'")
            .bind(market_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(market_id, "market closed");
        let mut view = market.view();
        view.state = MarketState::Closed;
        Ok(view)
    }

    /// ONGOING → FINISHED with the result set, exactly once. Runs inside the
    /// caller's settlement transaction.
    pub async fn finalize(
        conn: &mut SqliteConnection,
        match_id: &str,
        winning_side: Side,
    ) -> Result<()> {
        let res = sqlx::query(
            r#"
            UPDATE matches SET state = 'FINISHED', winning_side = ?
            WHERE external_id = ? AND state = 'ONGOING'
            "#,
        )
        .bind(winning_side.as_str())
        .bind(match_id)
        .execute(&mut *conn)
        .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::Conflict(format!("match {match_id} already finalized")));
        }
        Ok(())
    }

    pub async fn list_open_markets(&self) -> Result<Vec<MarketView>> {
        let rows = sqlx::query_as::<_, MarketRow>(
            "SELECT * FROM markets WHERE state = 'OPEN' ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(MarketRow::view).collect())
    }

    pub async fn get_market(&self, market_id: i64) -> Result<MarketView> {
        let market = store::market_by_id(&self.pool, market_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("market {market_id}")))?;
        Ok(market.view())
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
