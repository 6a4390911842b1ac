pub mod rows;

use std::sync::Arc;

use dashmap::DashMap;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::types::Side;

pub use rows::{AssignmentRow, MarketRow, MatchRow, ParticipantRow, WagerRow};

/// Open (or create) the database file and run migrations.
pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);
    let pool = SqlitePoolOptions::new().connect_with(opts).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// In-memory database for tests. A single connection keeps every caller on
/// the same database; each sqlite `:memory:` connection is otherwise its
/// own universe.
pub async fn connect_in_memory() -> Result<SqlitePool> {
    let opts = SqliteConnectOptions::new().in_memory(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(opts)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

// ---------------------------------------------------------------------------
// Per-market serialization
// ---------------------------------------------------------------------------

/// Registry of per-market async locks. Wager placement and settlement for the
/// same market take the same lock for the whole read-price/mutate/reprice
/// unit; different markets proceed independently.
pub struct MarketLocks {
    inner: DashMap<i64, Arc<Mutex<()>>>,
}

impl MarketLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { inner: DashMap::new() })
    }

    pub fn for_market(&self, market_id: i64) -> Arc<Mutex<()>> {
        self.inner
            .entry(market_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }
}

// ---------------------------------------------------------------------------
// Balance store
// ---------------------------------------------------------------------------

/// Create the user row if this is the first time the core sees this user.
pub async fn ensure_user(conn: &mut SqliteConnection, name: &str, balance: i64) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO users (name, balance) VALUES (?, ?)")
        .bind(name)
        .bind(balance)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

pub async fn balance_of<'e, E>(ex: E, name: &str) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let balance: Option<i64> = sqlx::query_scalar("SELECT balance FROM users WHERE name = ?")
        .bind(name)
        .fetch_optional(ex)
        .await?;
    balance.ok_or_else(|| AppError::NotFound(format!("user {name}")))
}

/// Guarded debit. The decrement carries its own `balance >= amount` predicate
/// so the check and the mutation are one statement, never a read-modify-write.
pub async fn debit_balance(conn: &mut SqliteConnection, name: &str, amount: i64) -> Result<()> {
    let balance = balance_of(&mut *conn, name).await?;
    let res = sqlx::query("UPDATE users SET balance = balance - ? WHERE name = ? AND balance >= ?")
        .bind(amount)
        .bind(name)
        .bind(amount)
        .execute(&mut *conn)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::InsufficientFunds { balance, requested: amount });
    }
    Ok(())
}

/// Unconditional credit (payouts).
pub async fn credit_balance(conn: &mut SqliteConnection, name: &str, amount: i64) -> Result<()> {
    let res = sqlx::query("UPDATE users SET balance = balance + ? WHERE name = ?")
        .bind(amount)
        .bind(name)
        .execute(&mut *conn)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("user {name}")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Shared queries
// ---------------------------------------------------------------------------

pub async fn market_by_id<'e, E>(ex: E, market_id: i64) -> Result<Option<MarketRow>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, MarketRow>("SELECT * FROM markets WHERE id = ?")
        .bind(market_id)
        .fetch_optional(ex)
        .await?;
    Ok(row)
}

pub async fn market_for_match<'e, E>(ex: E, match_id: &str) -> Result<Option<MarketRow>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, MarketRow>(
        "SELECT * FROM markets WHERE match_id = ? AND kind = 'match_outcome'",
    )
    .bind(match_id)
    .fetch_optional(ex)
    .await?;
    Ok(row)
}

pub async fn match_by_id<'e, E>(ex: E, external_id: &str) -> Result<Option<MatchRow>>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, MatchRow>("SELECT * FROM matches WHERE external_id = ?")
        .bind(external_id)
        .fetch_optional(ex)
        .await?;
    Ok(row)
}

/// Aggregate PLACED stake per side. Always computed live, never cached: the
/// pricing recompute depends on it.
pub async fn stake_totals<'e, E>(ex: E, market_id: i64) -> Result<(i64, i64)>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (stake_a, stake_b): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN side = ? THEN amount END), 0),
            COALESCE(SUM(CASE WHEN side = ? THEN amount END), 0)
        FROM wagers
        WHERE market_id = ? AND state = 'PLACED'
        "#,
    )
    .bind(Side::A.as_str())
    .bind(Side::B.as_str())
    .bind(market_id)
    .fetch_one(ex)
    .await?;
    Ok((stake_a, stake_b))
}
