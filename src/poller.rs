use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::provider::ContestProvider;
use crate::registry::MatchRegistry;
use crate::settlement::SettlementEngine;
use crate::store::ParticipantRow;

/// Periodic reconciliation against the contest provider: opens markets when
/// tracked participants enter a match, and hands apparently-finished matches
/// to the settlement engine once a grace period has passed.
pub struct MatchPoller {
    cfg: Config,
    registry: Arc<MatchRegistry>,
    settlement: Arc<SettlementEngine>,
    provider: Arc<dyn ContestProvider>,
    /// match external id → unix secs of the first cycle that saw no live
    /// participant for it. The provider lags; settlement waits out the grace
    /// period and still re-verifies on its own.
    pending_finish: HashMap<String, i64>,
}

impl MatchPoller {
    pub fn new(
        cfg: Config,
        registry: Arc<MatchRegistry>,
        settlement: Arc<SettlementEngine>,
        provider: Arc<dyn ContestProvider>,
    ) -> Self {
        Self { cfg, registry, settlement, provider, pending_finish: HashMap::new() }
    }

    pub async fn run(mut self) {
        let mut ticker = interval(Duration::from_secs(self.cfg.poll_interval_secs));
        // A cycle that overruns the period makes the next tick fire late
        // rather than queue up; cycles never overlap and never burst.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if let Err(e) = self.cycle().await {
                error!("poll cycle failed: {e}");
            }
        }
    }

    async fn cycle(&mut self) -> Result<()> {
        let participants = self.registry.tracked_participants().await?;
        for p in &participants {
            // One participant's provider trouble never aborts the rest of
            // the cycle.
            if let Err(e) = self.reconcile_participant(p).await {
                warn!(user = %p.user_name, "participant poll failed, skipping: {e}");
            }
        }

        self.drive_settlement().await;
        Ok(())
    }

    async fn reconcile_participant(&mut self, p: &ParticipantRow) -> Result<()> {
        let active = self.provider.active_match(&p.puuid).await?;

        if let Some(active) = &active {
            // Live again: any pending finish for this match was a lag
            // artifact.
            self.pending_finish.remove(&active.external_id);

            match self.registry.open_or_join(&p.user_name, &p.puuid, active).await {
                Ok(_) => {}
                // A stale live report for an already-settled match.
                Err(AppError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }

        // Every ONGOING match that no longer shows this participant live gets
        // a finish check armed, including the case where they already moved
        // on to the next game.
        let live_id = active.as_ref().map(|a| a.external_id.as_str());
        for m in self.registry.ongoing_matches_for(&p.puuid).await? {
            if Some(m.external_id.as_str()) == live_id {
                continue;
            }
            let armed = self
                .pending_finish
                .entry(m.external_id.clone())
                .or_insert_with(now_secs);
            info!(
                match_id = %m.external_id,
                since = *armed,
                "participant no longer live, finish check pending",
            );
        }
        Ok(())
    }

    /// Settle every pending match whose grace period has elapsed. Failure on
    /// one match never blocks the others.
    async fn drive_settlement(&mut self) {
        let now = now_secs();
        let grace = self.cfg.finish_grace_secs as i64;
        let due: Vec<String> = self
            .pending_finish
            .iter()
            .filter(|(_, first_absent)| now.saturating_sub(**first_absent) >= grace)
            .map(|(id, _)| id.clone())
            .collect();

        for match_id in due {
            match self.settlement.settle(&match_id).await {
                Ok(Some(report)) => {
                    self.pending_finish.remove(&match_id);
                    info!(
                        match_id = %match_id,
                        winning_side = %report.winning_side,
                        paid_out = report.paid_out,
                        "settlement complete",
                    );
                }
                // Not over yet per the provider; keep it pending.
                Ok(None) => {}
                Err(AppError::Conflict(_)) => {
                    // Already settled elsewhere; nothing left to drive.
                    self.pending_finish.remove(&match_id);
                }
                Err(e) => {
                    warn!(match_id = %match_id, "settlement attempt failed, will retry: {e}");
                }
            }
        }
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settlement::tests::{live_match, MockProvider};
    use crate::store::{self, MarketLocks};
    use crate::types::{ProviderIdentity, Side};

    fn test_config(grace_secs: u64) -> Config {
        Config {
            riot_api_key: "test-key".to_string(),
            riot_platform: "euw1".to_string(),
            riot_region: "europe".to_string(),
            log_level: "debug".to_string(),
            db_path: ":memory:".to_string(),
            api_port: 0,
            admin_token: String::new(),
            poll_interval_secs: 1,
            finish_grace_secs: grace_secs,
        }
    }

    async fn poller(grace_secs: u64) -> (MatchPoller, Arc<MockProvider>, Arc<MatchRegistry>) {
        let pool = store::connect_in_memory().await.unwrap();
        let locks = MarketLocks::new();
        let provider = Arc::new(MockProvider::default());

        let registry = Arc::new(MatchRegistry::new(pool.clone(), Arc::clone(&locks)));
        let settlement = Arc::new(SettlementEngine::new(
            pool,
            locks,
            Arc::clone(&provider) as Arc<dyn ContestProvider>,
        ));

        let poller = MatchPoller::new(
            test_config(grace_secs),
            Arc::clone(&registry),
            settlement,
            Arc::clone(&provider) as Arc<dyn ContestProvider>,
        );
        (poller, provider, registry)
    }

    async fn link(registry: &MatchRegistry, user: &str, puuid: &str) {
        registry
            .link_participant(
                user,
                &ProviderIdentity { puuid: puuid.to_string(), riot_tag: format!("{user}#tag") },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn discovers_live_match_and_opens_market() {
        let (mut poller, provider, registry) = poller(60).await;
        link(&registry, "alice", "puuid-a").await;
        provider.set_active("puuid-a", live_match("EUW1_900", Side::A));

        poller.cycle().await.unwrap();

        let markets = registry.list_open_markets().await.unwrap();
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].match_id, "EUW1_900");
    }

    #[tokio::test]
    async fn absence_waits_out_grace_period() {
        let (mut poller, provider, registry) = poller(3600).await;
        link(&registry, "alice", "puuid-a").await;
        provider.set_active("puuid-a", live_match("EUW1_901", Side::A));
        poller.cycle().await.unwrap();

        // Match vanishes from the live feed and the result is even published,
        // but the grace period has not elapsed: no settlement yet.
        provider.clear_active("puuid-a");
        provider.publish_result("EUW1_901", true);
        poller.cycle().await.unwrap();

        assert!(poller.pending_finish.contains_key("EUW1_901"));
        let row = registry.ongoing_matches_for("puuid-a").await.unwrap();
        assert_eq!(row.len(), 1, "match must still be ONGOING inside the grace period");
    }

    #[tokio::test]
    async fn settles_after_grace_elapses() {
        let (mut poller, provider, registry) = poller(0).await;
        link(&registry, "alice", "puuid-a").await;
        provider.set_active("puuid-a", live_match("EUW1_902", Side::A));
        poller.cycle().await.unwrap();

        provider.clear_active("puuid-a");
        provider.publish_result("EUW1_902", true);
        poller.cycle().await.unwrap();

        assert!(poller.pending_finish.is_empty());
        assert!(registry.ongoing_matches_for("puuid-a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reappearing_participant_disarms_finish_check() {
        let (mut poller, provider, registry) = poller(3600).await;
        link(&registry, "alice", "puuid-a").await;
        provider.set_active("puuid-a", live_match("EUW1_903", Side::A));
        poller.cycle().await.unwrap();

        provider.clear_active("puuid-a");
        poller.cycle().await.unwrap();
        assert!(poller.pending_finish.contains_key("EUW1_903"));

        // The same match shows live again: the absence was provider lag.
        provider.set_active("puuid-a", live_match("EUW1_903", Side::A));
        poller.cycle().await.unwrap();
        assert!(!poller.pending_finish.contains_key("EUW1_903"));
        assert_eq!(registry.ongoing_matches_for("puuid-a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn next_game_arms_finish_check_for_previous_match() {
        let (mut poller, provider, registry) = poller(3600).await;
        link(&registry, "alice", "puuid-a").await;
        provider.set_active("puuid-a", live_match("EUW1_906", Side::A));
        poller.cycle().await.unwrap();

        // Straight into the next game with no absent cycle in between: the
        // previous match still needs its finish check.
        provider.set_active("puuid-a", live_match("EUW1_907", Side::B));
        poller.cycle().await.unwrap();

        assert!(poller.pending_finish.contains_key("EUW1_906"));
        assert!(!poller.pending_finish.contains_key("EUW1_907"));
        assert_eq!(registry.list_open_markets().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn one_failing_participant_does_not_block_the_cycle() {
        let (mut poller, provider, registry) = poller(60).await;
        link(&registry, "alice", "puuid-a").await;
        link(&registry, "bob", "puuid-b").await;
        provider.fail_for("puuid-a");
        provider.set_active("puuid-b", live_match("EUW1_904", Side::B));

        poller.cycle().await.unwrap();

        // bob's match was still discovered despite alice's provider error.
        let markets = registry.list_open_markets().await.unwrap();
        assert_eq!(markets.len(), 1);
        assert_eq!(markets[0].match_id, "EUW1_904");
    }

    #[tokio::test]
    async fn result_not_ready_keeps_match_pending() {
        let (mut poller, provider, registry) = poller(0).await;
        link(&registry, "alice", "puuid-a").await;
        provider.set_active("puuid-a", live_match("EUW1_905", Side::A));
        poller.cycle().await.unwrap();

        // Absent from the live feed but no published result yet.
        provider.clear_active("puuid-a");
        poller.cycle().await.unwrap();
        assert!(poller.pending_finish.contains_key("EUW1_905"));

        provider.publish_result("EUW1_905", false);
        poller.cycle().await.unwrap();
        assert!(poller.pending_finish.is_empty());
    }
}
