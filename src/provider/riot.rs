use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::config::{Config, PROVIDER_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::types::{ActiveMatch, ParticipantResult, ProviderIdentity, Side};

use super::ContestProvider;

/// Ranked solo queue. Matches in other queues are not tracked.
const SOLOQ_QUEUE_ID: i64 = 420;

/// Riot API adapter. Holds one HTTP client with a bounded timeout; a timeout
/// surfaces as a provider error, never as "match ended".
pub struct RiotProvider {
    client: reqwest::Client,
    api_key: String,
    /// Platform routing value, e.g. "euw1" (spectator endpoints).
    platform: String,
    /// Regional routing value, e.g. "europe" (account and match endpoints).
    region: String,
}

impl RiotProvider {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Provider(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: cfg.riot_api_key.clone(),
            platform: cfg.riot_platform.clone(),
            region: cfg.riot_region.clone(),
        })
    }

    /// GET a Riot endpoint. `Ok(None)` on 404; callers decide what absence
    /// means for them.
    async fn get_json(&self, url: &str) -> Result<Option<serde_json::Value>> {
        let resp = self
            .client
            .get(url)
            .header("X-Riot-Token", &self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Provider(format!("request failed: {e}")))?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body = resp
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|e| AppError::Provider(format!("bad response body: {e}")))?;
                Ok(Some(body))
            }
            s => Err(AppError::Provider(format!("HTTP {s} from {url}"))),
        }
    }
}

#[async_trait]
impl ContestProvider for RiotProvider {
    async fn resolve_identity(&self, game_name: &str, tag_line: &str)
        -> Result<ProviderIdentity>
    {
        let url = format!(
            "https://{}.api.riotgames.com/riot/account/v1/accounts/by-riot-id/{}/{}",
            self.region,
            urlencode(game_name),
            urlencode(tag_line),
        );

        let body = self
            .get_json(&url)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("riot profile {game_name}#{tag_line}")))?;

        let puuid = body
            .get("puuid")
            .and_then(|p| p.as_str())
            .ok_or_else(|| AppError::Provider("account response missing puuid".to_string()))?
            .to_string();

        Ok(ProviderIdentity {
            puuid,
            riot_tag: format!("{game_name}#{tag_line}"),
        })
    }

    async fn active_match(&self, puuid: &str) -> Result<Option<ActiveMatch>> {
        let url = format!(
            "https://{}.api.riotgames.com/lol/spectator/v5/active-games/by-summoner/{}",
            self.platform, puuid,
        );

        let Some(body) = self.get_json(&url).await? else {
            return Ok(None);
        };

        // Only solo queue counts as trackable.
        let queue = body.get("gameQueueConfigId").and_then(|q| q.as_i64()).unwrap_or(0);
        if queue != SOLOQ_QUEUE_ID {
            debug!(queue, "active game is not solo queue, ignoring");
            return Ok(None);
        }

        let game_id = body
            .get("gameId")
            .and_then(|g| g.as_i64())
            .ok_or_else(|| AppError::Provider("active game missing gameId".to_string()))?;

        let started_at_ms = body
            .get("gameStartTime")
            .and_then(|t| t.as_i64())
            .unwrap_or(0);

        let participant = body
            .get("participants")
            .and_then(|p| p.as_array())
            .and_then(|ps| {
                ps.iter()
                    .find(|p| p.get("puuid").and_then(|v| v.as_str()) == Some(puuid))
            })
            .ok_or_else(|| {
                AppError::Provider("active game does not list the participant".to_string())
            })?;

        let team_id = participant.get("teamId").and_then(|t| t.as_i64()).unwrap_or(0);
        let champion = participant.get("championId").and_then(|c| c.as_i64()).unwrap_or(0);

        Ok(Some(ActiveMatch {
            // Match-v5 keys are "<PLATFORM>_<gameId>"; building the key here
            // keeps the result lookup a plain GET later.
            external_id: format!("{}_{game_id}", self.platform.to_uppercase()),
            side: side_from_team(team_id)?,
            champion,
            started_at: started_at_ms / 1000,
        }))
    }

    async fn match_result(&self, external_id: &str, puuid: &str)
        -> Result<Option<ParticipantResult>>
    {
        let url = format!(
            "https://{}.api.riotgames.com/lol/match/v5/matches/{}",
            self.region, external_id,
        );

        // 404 here means the provider has not published the result yet.
        let Some(body) = self.get_json(&url).await? else {
            return Ok(None);
        };

        let won = body
            .get("info")
            .and_then(|i| i.get("participants"))
            .and_then(|p| p.as_array())
            .and_then(|ps| {
                ps.iter()
                    .find(|p| p.get("puuid").and_then(|v| v.as_str()) == Some(puuid))
            })
            .and_then(|p| p.get("win"))
            .and_then(|w| w.as_bool())
            .ok_or_else(|| {
                AppError::Provider(format!("match {external_id} result missing participant"))
            })?;

        Ok(Some(ParticipantResult { won }))
    }
}

/// Riot team identifiers map onto the canonical side here and nowhere else.
fn side_from_team(team_id: i64) -> Result<Side> {
    match team_id {
        100 => Ok(Side::A),
        200 => Ok(Side::B),
        other => Err(AppError::Provider(format!("unexpected team id {other}"))),
    }
}

/// Minimal percent-encoding for path segments (Riot IDs may contain spaces).
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_ids_map_to_canonical_sides() {
        assert_eq!(side_from_team(100).unwrap(), Side::A);
        assert_eq!(side_from_team(200).unwrap(), Side::B);
        assert!(side_from_team(300).is_err());
    }

    #[test]
    fn urlencode_keeps_unreserved_and_escapes_the_rest() {
        assert_eq!(urlencode("BullDOSER"), "BullDOSER");
        assert_eq!(urlencode("a b"), "a%20b");
        assert_eq!(urlencode("é"), "%C3%A9");
    }
}
