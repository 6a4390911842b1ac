use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::provider::ContestProvider;
use crate::registry::MatchRegistry;
use crate::store::{self, AssignmentRow, MarketLocks, WagerRow};
use crate::types::{MatchState, SettlementReport, Side};

/// Resolves a finished match into payouts and terminal wager states,
/// exactly once.
pub struct SettlementEngine {
    pool: SqlitePool,
    locks: Arc<MarketLocks>,
    provider: Arc<dyn ContestProvider>,
}

impl SettlementEngine {
    pub fn new(
        pool: SqlitePool,
        locks: Arc<MarketLocks>,
        provider: Arc<dyn ContestProvider>,
    ) -> Self {
        Self { pool, locks, provider }
    }

    /// Attempt to settle one match.
    ///
    /// Returns `Ok(None)` when the match cannot be settled *yet* (the
    /// provider still reports it live, or the result is not published) so
    /// the poller retries on a later cycle. `Conflict` when the match is
    /// already FINISHED. Payouts, wager states, match finalize and market
    /// close apply as one transaction: a failure mid-way leaves nothing
    /// half-paid and the whole match is retried.
    pub async fn settle(&self, match_id: &str) -> Result<Option<SettlementReport>> {
        let match_row = store::match_by_id(&self.pool, match_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("match {match_id}")))?;
        if match_row.state() == MatchState::Finished {
            return Err(AppError::Conflict(format!("match {match_id} already settled")));
        }

        let assignments = sqlx::query_as::<_, AssignmentRow>(
            "SELECT * FROM assignments WHERE match_id = ?",
        )
        .bind(match_id)
        .fetch_all(&self.pool)
        .await?;
        let anchor = assignments
            .first()
            .ok_or_else(|| AppError::NotFound(format!("no participants for match {match_id}")))?;

        // Absence from a poll is not proof of completion. Re-check every
        // tracked participant; one still live aborts this attempt.
        for a in &assignments {
            if let Some(active) = self.provider.active_match(&a.puuid).await? {
                if active.external_id == match_id {
                    debug!(match_id, user = %a.user_name, "match still live, settlement deferred");
                    return Ok(None);
                }
            }
        }

        let Some(result) = self.provider.match_result(match_id, &anchor.puuid).await? else {
            debug!(match_id, "result not yet published, settlement deferred");
            return Ok(None);
        };
        let winning_side: Side = if result.won {
            anchor.side()
        } else {
            anchor.side().opposite()
        };

        let market = store::market_for_match(&self.pool, match_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("market for match {match_id}")))?;

        let lock = self.locks.for_market(market.id);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;

        // Guard re-checked under the lock: a concurrent settlement that
        // committed first turns this attempt into a clean conflict.
        let current = store::match_by_id(&mut *tx, match_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("match {match_id}")))?;
        if current.state() == MatchState::Finished {
            return Err(AppError::Conflict(format!("match {match_id} already settled")));
        }

        let wagers = sqlx::query_as::<_, WagerRow>(
            "SELECT * FROM wagers WHERE market_id = ? AND state = 'PLACED'",
        )
        .bind(market.id)
        .fetch_all(&mut *tx)
        .await?;

        let mut wagers_won = 0usize;
        let mut wagers_lost = 0usize;
        let mut paid_out = 0i64;
        for w in &wagers {
            if w.side() == winning_side {
                let payout = (w.amount as f64 * w.locked_odd).round() as i64;
                store::credit_balance(&mut *tx, &w.user_name, payout).await?;
                sqlx::query("UPDATE wagers SET state = 'WON' WHERE id = ?")
                    .bind(w.id)
                    .execute(&mut *tx)
                    .await?;
                wagers_won += 1;
                paid_out += payout;
            } else {
                sqlx::query("UPDATE wagers SET state = 'LOST' WHERE id = ?")
                    .bind(w.id)
                    .execute(&mut *tx)
                    .await?;
                wagers_lost += 1;
            }
        }

        MatchRegistry::finalize(&mut *tx, match_id, winning_side).await?;
        sqlx::query("UPDATE markets SET state = 'FINISHED' WHERE id = ?")
            .bind(market.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        let report = SettlementReport {
            match_id: match_id.to_string(),
            winning_side,
            wagers_won,
            wagers_lost,
            paid_out,
        };
        info!(
            match_id,
            winning_side = %winning_side,
            wagers_won,
            wagers_lost,
            paid_out,
            "match settled",
        );
        Ok(Some(report))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::ledger::WagerLedger;
    use crate::types::{ActiveMatch, ParticipantResult, ProviderIdentity};

    /// Scripted provider: tests control which matches are live and which
    /// results are published.
    #[derive(Default)]
    pub(crate) struct MockProvider {
        pub active: Mutex<HashMap<String, ActiveMatch>>,
        pub results: Mutex<HashMap<String, bool>>,
        pub fail_puuids: Mutex<HashSet<String>>,
    }

    impl MockProvider {
        pub fn set_active(&self, puuid: &str, active: ActiveMatch) {
            self.active.lock().unwrap().insert(puuid.to_string(), active);
        }

        pub fn clear_active(&self, puuid: &str) {
            self.active.lock().unwrap().remove(puuid);
        }

        pub fn publish_result(&self, external_id: &str, won: bool) {
            self.results.lock().unwrap().insert(external_id.to_string(), won);
        }

        /// Make live-match lookups for this participant error out.
        pub fn fail_for(&self, puuid: &str) {
            self.fail_puuids.lock().unwrap().insert(puuid.to_string());
        }
    }

    #[async_trait]
    impl ContestProvider for MockProvider {
        async fn resolve_identity(&self, game_name: &str, tag_line: &str)
            -> crate::error::Result<ProviderIdentity>
        {
            Ok(ProviderIdentity {
                puuid: format!("puuid-{game_name}"),
                riot_tag: format!("{game_name}#{tag_line}"),
            })
        }

        async fn active_match(&self, puuid: &str) -> crate::error::Result<Option<ActiveMatch>> {
            if self.fail_puuids.lock().unwrap().contains(puuid) {
                return Err(AppError::Provider("simulated outage".to_string()));
            }
            Ok(self.active.lock().unwrap().get(puuid).cloned())
        }

        async fn match_result(&self, external_id: &str, _puuid: &str)
            -> crate::error::Result<Option<ParticipantResult>>
        {
            Ok(self
                .results
                .lock()
                .unwrap()
                .get(external_id)
                .map(|&won| ParticipantResult { won }))
        }
    }

    pub(crate) fn live_match(external_id: &str, side: Side) -> ActiveMatch {
        ActiveMatch {
            external_id: external_id.to_string(),
            side,
            champion: 99,
            started_at: 1_700_000_000,
        }
    }

    struct Fixture {
        pool: SqlitePool,
        registry: MatchRegistry,
        ledger: WagerLedger,
        engine: SettlementEngine,
        provider: Arc<MockProvider>,
        market_id: i64,
    }

    /// Tracked player on side A of EUW1_500; alice wagered 60 on A at locked
    /// 2.0, bob 40 on B at locked 2.2 (both started from 100 coins).
    async fn fixture() -> Fixture {
        let pool = store::connect_in_memory().await.unwrap();
        let locks = MarketLocks::new();
        let provider = Arc::new(MockProvider::default());

        let registry = MatchRegistry::new(pool.clone(), Arc::clone(&locks));
        let market = registry
            .open_or_join("tracked", "puuid-t", &live_match("EUW1_500", Side::A))
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        store::ensure_user(&mut conn, "alice", 100).await.unwrap();
        store::ensure_user(&mut conn, "bob", 100).await.unwrap();
        drop(conn);

        let ledger = WagerLedger::new(pool.clone(), Arc::clone(&locks));
        ledger.place_wager("alice", market.id, Side::A, 60).await.unwrap();
        ledger.place_wager("bob", market.id, Side::B, 40).await.unwrap();

        let engine = SettlementEngine::new(
            pool.clone(),
            locks,
            Arc::clone(&provider) as Arc<dyn ContestProvider>,
        );

        Fixture { pool, registry, ledger, engine, provider, market_id: market.id }
    }

    #[tokio::test]
    async fn pays_locked_odds_exactly_once() {
        let f = fixture().await;
        f.provider.publish_result("EUW1_500", true);

        let report = f.engine.settle("EUW1_500").await.unwrap().unwrap();
        assert_eq!(report.winning_side, Side::A);
        assert_eq!(report.wagers_won, 1);
        assert_eq!(report.wagers_lost, 1);
        // 60 x locked 2.0, not the live 1.96 quote at settlement time.
        assert_eq!(report.paid_out, 120);

        assert_eq!(store::balance_of(&f.pool, "alice").await.unwrap(), 160);
        assert_eq!(store::balance_of(&f.pool, "bob").await.unwrap(), 60);

        let alice = f.ledger.wagers_for_user("alice").await.unwrap();
        assert_eq!(alice[0].state, "WON");
        let bob = f.ledger.wagers_for_user("bob").await.unwrap();
        assert_eq!(bob[0].state, "LOST");

        // Second attempt is a conflict and moves no coins.
        let err = f.engine.settle("EUW1_500").await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store::balance_of(&f.pool, "alice").await.unwrap(), 160);
        assert_eq!(store::balance_of(&f.pool, "bob").await.unwrap(), 60);

        // A finished market admits no further wagers.
        let err = f.ledger.place_wager("alice", f.market_id, Side::B, 5).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn tracked_loss_pays_the_other_side() {
        let f = fixture().await;
        f.provider.publish_result("EUW1_500", false);

        let report = f.engine.settle("EUW1_500").await.unwrap().unwrap();
        assert_eq!(report.winning_side, Side::B);
        // 40 × locked 2.2 = 88.
        assert_eq!(report.paid_out, 88);
        assert_eq!(store::balance_of(&f.pool, "alice").await.unwrap(), 40);
        assert_eq!(store::balance_of(&f.pool, "bob").await.unwrap(), 148);
    }

    #[tokio::test]
    async fn defers_while_provider_still_reports_live() {
        let f = fixture().await;
        f.provider.set_active("puuid-t", live_match("EUW1_500", Side::A));
        f.provider.publish_result("EUW1_500", true);

        let outcome = f.engine.settle("EUW1_500").await.unwrap();
        assert!(outcome.is_none());

        // Nothing changed: balances intact, match still ONGOING.
        assert_eq!(store::balance_of(&f.pool, "alice").await.unwrap(), 40);
        let row = store::match_by_id(&f.pool, "EUW1_500").await.unwrap().unwrap();
        assert_eq!(row.state(), MatchState::Ongoing);

        // Once the provider drops the live report, settlement proceeds.
        f.provider.clear_active("puuid-t");
        assert!(f.engine.settle("EUW1_500").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn defers_until_result_is_published() {
        let f = fixture().await;

        assert!(f.engine.settle("EUW1_500").await.unwrap().is_none());
        let row = store::match_by_id(&f.pool, "EUW1_500").await.unwrap().unwrap();
        assert_eq!(row.state(), MatchState::Ongoing);

        f.provider.publish_result("EUW1_500", true);
        assert!(f.engine.settle("EUW1_500").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn provider_outage_aborts_without_state_change() {
        let f = fixture().await;
        f.provider.fail_for("puuid-t");

        let err = f.engine.settle("EUW1_500").await.unwrap_err();
        assert!(matches!(err, AppError::Provider(_)));

        let row = store::match_by_id(&f.pool, "EUW1_500").await.unwrap().unwrap();
        assert_eq!(row.state(), MatchState::Ongoing);
        assert_eq!(store::balance_of(&f.pool, "alice").await.unwrap(), 40);
    }

    #[tokio::test]
    async fn finished_market_stays_finished() {
        let f = fixture().await;
        f.provider.publish_result("EUW1_500", true);
        f.engine.settle("EUW1_500").await.unwrap();

        let view = f.registry.get_market(f.market_id).await.unwrap();
        assert_eq!(view.state, crate::types::MarketState::Finished);
    }
}
