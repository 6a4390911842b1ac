use crate::error::{AppError, Result};

pub const RIOT_PLATFORM: &str = "euw1";
pub const RIOT_REGION: &str = "europe";

/// Neutral payout multiplier for a market with no stakes yet.
pub const NEUTRAL_QUOTE: f64 = 2.0;

/// Discovery poll period (seconds): how often tracked participants are
/// checked for a live match.
pub const POLL_INTERVAL_SECS: u64 = 30;

/// Grace period (seconds) after a participant stops appearing live before a
/// settlement attempt. The provider lags in reporting completion; absence
/// alone is never treated as proof the match ended.
pub const FINISH_GRACE_SECS: u64 = 90;

/// Timeout for any single provider request (seconds). A timeout is a provider
/// error, not a match-ended signal.
pub const PROVIDER_TIMEOUT_SECS: u64 = 10;

/// Coins granted to a user row created at participant link time.
pub const STARTING_BALANCE: i64 = 100;

/// Pricing sensitivity tiers. γ grows with the heavier side's volume so early
/// small stakes barely move the quote.
pub mod gamma {
    pub const LOW: f64 = 0.1;
    pub const MID: f64 = 0.2;
    pub const HIGH: f64 = 0.3;
    /// Heavier side at or above this stake moves γ to MID.
    pub const MID_STAKE: i64 = 50;
    /// Heavier side at or above this stake moves γ to HIGH.
    pub const HIGH_STAKE: i64 = 100;
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Riot API key (RIOT_API_KEY, required).
    pub riot_api_key: String,
    /// Platform routing value, e.g. "euw1" (RIOT_PLATFORM).
    pub riot_platform: String,
    /// Regional routing value, e.g. "europe" (RIOT_REGION).
    pub riot_region: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    /// Token required by the privileged market-close endpoint (ADMIN_TOKEN).
    /// Empty disables the endpoint.
    pub admin_token: String,
    pub poll_interval_secs: u64,
    pub finish_grace_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let riot_api_key = std::env::var("RIOT_API_KEY")
            .map_err(|_| AppError::Config("RIOT_API_KEY must be set".to_string()))?;

        Ok(Self {
            riot_api_key,
            riot_platform: std::env::var("RIOT_PLATFORM")
                .unwrap_or_else(|_| RIOT_PLATFORM.to_string()),
            riot_region: std::env::var("RIOT_REGION")
                .unwrap_or_else(|_| RIOT_REGION.to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "riftbook.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            admin_token: std::env::var("ADMIN_TOKEN").unwrap_or_default(),
            poll_interval_secs: std::env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| POLL_INTERVAL_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(POLL_INTERVAL_SECS),
            finish_grace_secs: std::env::var("FINISH_GRACE_SECS")
                .unwrap_or_else(|_| FINISH_GRACE_SECS.to_string())
                .parse::<u64>()
                .unwrap_or(FINISH_GRACE_SECS),
        })
    }
}
