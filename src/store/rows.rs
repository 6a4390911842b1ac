//! Database row types used by sqlx for typed queries.

use crate::types::{MarketState, MarketView, MatchState, Quote, Side, WagerState};

#[derive(Debug, sqlx::FromRow)]
pub struct MatchRow {
    pub external_id: String,
    pub started_at: i64,
    pub state: String,
    pub winning_side: Option<String>,
}

impl MatchRow {
    pub fn state(&self) -> MatchState {
        MatchState::parse(&self.state).unwrap_or(MatchState::Ongoing)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct ParticipantRow {
    pub user_name: String,
    pub puuid: String,
    pub riot_tag: String,
    pub linked_at: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct AssignmentRow {
    pub match_id: String,
    pub user_name: String,
    pub puuid: String,
    pub side: String,
    pub champion: i64,
}

impl AssignmentRow {
    pub fn side(&self) -> Side {
        Side::parse(&self.side).unwrap_or(Side::A)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct MarketRow {
    pub id: i64,
    pub match_id: String,
    pub kind: String,
    pub title: String,
    pub state: String,
    pub quote_a: f64,
    pub quote_b: f64,
    pub created_at: i64,
}

impl MarketRow {
    pub fn state(&self) -> MarketState {
        MarketState::parse(&self.state).unwrap_or(MarketState::Finished)
    }

    pub fn quote(&self) -> Quote {
        Quote { a: self.quote_a, b: self.quote_b }
    }

    pub fn view(&self) -> MarketView {
        MarketView {
            id: self.id,
            match_id: self.match_id.clone(),
            title: self.title.clone(),
            state: self.state(),
            quote: self.quote(),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct WagerRow {
    pub id: i64,
    pub user_name: String,
    pub market_id: i64,
    pub side: String,
    pub amount: i64,
    pub locked_odd: f64,
    pub state: String,
    pub placed_at: i64,
}

impl WagerRow {
    pub fn side(&self) -> Side {
        Side::parse(&self.side).unwrap_or(Side::A)
    }

    pub fn state(&self) -> WagerState {
        WagerState::parse(&self.state).unwrap_or(WagerState::Placed)
    }
}
