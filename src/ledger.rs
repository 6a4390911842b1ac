use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::SqlitePool;
use tracing::info;

use crate::error::{AppError, Result};
use crate::pricing;
use crate::store::{self, MarketLocks, WagerRow};
use crate::types::{MarketState, Side, WagerReceipt};

/// Admits and records wagers against a market.
///
/// The whole admission (precondition checks, balance debit, insert with the
/// locked odd, quote recompute) runs inside one transaction while
/// holding the market's lock. Two concurrent placements on the same market
/// therefore never read the same stale stake aggregate, and a settlement
/// can never interleave with a last-second wager.
pub struct WagerLedger {
    pool: SqlitePool,
    locks: Arc<MarketLocks>,
}

impl WagerLedger {
    pub fn new(pool: SqlitePool, locks: Arc<MarketLocks>) -> Self {
        Self { pool, locks }
    }

    pub async fn place_wager(
        &self,
        user: &str,
        market_id: i64,
        side: Side,
        amount: i64,
    ) -> Result<WagerReceipt> {
        let lock = self.locks.for_market(market_id);
        let _guard = lock.lock().await;

        let mut tx = self.pool.begin().await?;

        let market = store::market_by_id(&mut *tx, market_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("market {market_id}")))?;
        if market.state() != MarketState::Open {
            return Err(AppError::Conflict(format!(
                "market {market_id} is {} and not accepting wagers",
                market.state()
            )));
        }
        if amount <= 0 {
            return Err(AppError::Validation("stake amount must be positive".to_string()));
        }

        let balance = store::balance_of(&mut *tx, user).await?;
        if balance < amount {
            return Err(AppError::InsufficientFunds { balance, requested: amount });
        }

        let existing: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM wagers WHERE user_name = ? AND market_id = ? AND side = ?",
        )
        .bind(user)
        .bind(market_id)
        .bind(side.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Err(AppError::Conflict(format!(
                "user {user} already holds a wager on side {side} of market {market_id}"
            )));
        }

        store::debit_balance(&mut *tx, user, amount).await?;

        // The wager locks the quote as persisted before its own stake is
        // folded into the aggregate; settlement pays amount × locked_odd
        // no matter how the live quote moves afterwards.
        let locked_odd = market.quote().for_side(side);
        let wager_id = sqlx::query(
            r#"
            INSERT INTO wagers (user_name, market_id, side, amount, locked_odd, placed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user)
        .bind(market_id)
        .bind(side.as_str())
        .bind(amount)
        .bind(locked_odd)
        .bind(now_secs())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let (stake_a, stake_b) = store::stake_totals(&mut *tx, market_id).await?;
        let quote = pricing::price(stake_a, stake_b);
        sqlx::query("UPDATE markets SET quote_a = ?, quote_b = ? WHERE id = ?")
            .bind(quote.a)
            .bind(quote.b)
            .bind(market_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            user,
            market_id,
            side = %side,
            amount,
            locked_odd,
            quote_a = quote.a,
            quote_b = quote.b,
            "wager placed",
        );

        Ok(WagerReceipt { wager_id, market_id, side, amount, locked_odd, quote })
    }

    pub async fn wagers_for_user(&self, user: &str) -> Result<Vec<WagerRow>> {
        let rows = sqlx::query_as::<_, WagerRow>(
            "SELECT * FROM wagers WHERE user_name = ? ORDER BY id DESC",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
