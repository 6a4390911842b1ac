use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Side
// ---------------------------------------------------------------------------

/// Canonical market side. The provider adapter maps domain team identifiers
/// (Riot team 100/200) onto this at the boundary; nothing else in the core
/// ever sees a raw team id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    A,
    B,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::A => "A",
            Side::B => "B",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Side::A),
            "B" => Some(Side::B),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Lifecycle states
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchState {
    Ongoing,
    Finished,
}

/// Market lifecycle: OPEN → CLOSED → FINISHED, or OPEN → FINISHED directly.
/// Never backward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketState {
    Open,
    Closed,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WagerState {
    Placed,
    Won,
    Lost,
}

impl MatchState {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchState::Ongoing => "ONGOING",
            MatchState::Finished => "FINISHED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ONGOING" => Some(MatchState::Ongoing),
            "FINISHED" => Some(MatchState::Finished),
            _ => None,
        }
    }
}

impl std::fmt::Display for MatchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MarketState {
    pub fn as_str(self) -> &'static str {
        match self {
            MarketState::Open => "OPEN",
            MarketState::Closed => "CLOSED",
            MarketState::Finished => "FINISHED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(MarketState::Open),
            "CLOSED" => Some(MarketState::Closed),
            "FINISHED" => Some(MarketState::Finished),
            _ => None,
        }
    }
}

impl std::fmt::Display for MarketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl WagerState {
    pub fn as_str(self) -> &'static str {
        match self {
            WagerState::Placed => "PLACED",
            WagerState::Won => "WON",
            WagerState::Lost => "LOST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PLACED" => Some(WagerState::Placed),
            "WON" => Some(WagerState::Won),
            "LOST" => Some(WagerState::Lost),
            _ => None,
        }
    }
}

impl std::fmt::Display for WagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Current payout multipliers for a market. Only the latest quote is kept;
/// each wager carries its own locked copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub a: f64,
    pub b: f64,
}

impl Quote {
    pub fn for_side(&self, side: Side) -> f64 {
        match side {
            Side::A => self.a,
            Side::B => self.b,
        }
    }
}

// ---------------------------------------------------------------------------
// Provider DTOs
// ---------------------------------------------------------------------------

/// A participant's resolved external contest identity.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub puuid: String,
    /// Display tag, e.g. "BullDOSER#2025".
    pub riot_tag: String,
}

/// A live match as reported by the provider for one tracked participant.
#[derive(Debug, Clone)]
pub struct ActiveMatch {
    pub external_id: String,
    /// The participant's side, already canonicalized.
    pub side: Side,
    pub champion: i64,
    /// Unix seconds.
    pub started_at: i64,
}

/// Per-participant outcome of a finished match.
#[derive(Debug, Clone, Copy)]
pub struct ParticipantResult {
    pub won: bool,
}

// ---------------------------------------------------------------------------
// API-facing views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MarketView {
    pub id: i64,
    pub match_id: String,
    pub title: String,
    pub state: MarketState,
    pub quote: Quote,
}

/// Returned on admission; the locked odd never changes afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct WagerReceipt {
    pub wager_id: i64,
    pub market_id: i64,
    pub side: Side,
    pub amount: i64,
    pub locked_odd: f64,
    /// Market quote after this wager's stake was folded in.
    pub quote: Quote,
}

// ---------------------------------------------------------------------------
// Settlement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SettlementReport {
    pub match_id: String,
    pub winning_side: Side,
    pub wagers_won: usize,
    pub wagers_lost: usize,
    /// Total coins credited, Σ(amount × locked_odd) over winners.
    pub paid_out: i64,
}
