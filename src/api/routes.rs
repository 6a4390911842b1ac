//! Thin HTTP adapter over the core operations. Identity and session issuance
//! are external collaborators: handlers trust the `x-user` header.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::ledger::WagerLedger;
use crate::provider::ContestProvider;
use crate::registry::MatchRegistry;
use crate::types::{MarketView, Side, WagerReceipt, WagerState};

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub registry: Arc<MatchRegistry>,
    pub ledger: Arc<WagerLedger>,
    pub provider: Arc<dyn ContestProvider>,
    pub admin_token: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/participants", post(link_participant))
        .route("/markets", get(get_markets))
        .route("/markets/:id", get(get_market))
        .route("/markets/:id/close", post(close_market))
        .route("/wagers", post(place_wager).get(get_wagers))
        .with_state(state)
}

fn require_user(headers: &HeaderMap) -> Result<String> {
    headers
        .get("x-user")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::Validation("x-user header required".to_string()))
}

// ---------------------------------------------------------------------------
// Request/response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct LinkParticipantRequest {
    pub game_name: String,
    pub tag_line: String,
}

#[derive(Serialize)]
pub struct LinkParticipantResponse {
    pub user: String,
    pub riot_tag: String,
}

#[derive(Deserialize)]
pub struct PlaceWagerRequest {
    pub market_id: i64,
    pub side: Side,
    pub amount: i64,
}

#[derive(Serialize)]
pub struct WagerResponse {
    pub id: i64,
    pub market_id: i64,
    pub side: Side,
    pub amount: i64,
    pub locked_odd: f64,
    pub state: WagerState,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub tracked_participants: i64,
    pub open_markets: i64,
    pub placed_wagers: i64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn link_participant(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<LinkParticipantRequest>,
) -> Result<Json<LinkParticipantResponse>> {
    let user = require_user(&headers)?;
    if req.game_name.is_empty() || req.tag_line.is_empty() {
        return Err(AppError::Validation("game_name and tag_line are required".to_string()));
    }

    let identity = state
        .provider
        .resolve_identity(&req.game_name, &req.tag_line)
        .await?;
    state.registry.link_participant(&user, &identity).await?;

    Ok(Json(LinkParticipantResponse { user, riot_tag: identity.riot_tag }))
}

async fn get_markets(State(state): State<ApiState>) -> Result<Json<Vec<MarketView>>> {
    Ok(Json(state.registry.list_open_markets().await?))
}

async fn get_market(
    State(state): State<ApiState>,
    Path(market_id): Path<i64>,
) -> Result<Json<MarketView>> {
    Ok(Json(state.registry.get_market(market_id).await?))
}

async fn close_market(
    State(state): State<ApiState>,
    Path(market_id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<MarketView>> {
    let token = headers
        .get("x-admin-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if state.admin_token.is_empty() || token != state.admin_token {
        return Err(AppError::Validation("valid admin token required".to_string()));
    }

    Ok(Json(state.registry.close_market(market_id).await?))
}

async fn place_wager(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(req): Json<PlaceWagerRequest>,
) -> Result<Json<WagerReceipt>> {
    let user = require_user(&headers)?;
    let receipt = state
        .ledger
        .place_wager(&user, req.market_id, req.side, req.amount)
        .await?;
    Ok(Json(receipt))
}

async fn get_wagers(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<Json<Vec<WagerResponse>>> {
    let user = require_user(&headers)?;
    let rows = state.ledger.wagers_for_user(&user).await?;
    let wagers = rows
        .iter()
        .map(|w| WagerResponse {
            id: w.id,
            market_id: w.market_id,
            side: w.side(),
            amount: w.amount,
            locked_odd: w.locked_odd,
            state: w.state(),
        })
        .collect();
    Ok(Json(wagers))
}

async fn get_health(State(state): State<ApiState>) -> Result<Json<HealthResponse>> {
    let tracked_participants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM participants")
        .fetch_one(&state.pool)
        .await?;
    let open_markets: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM markets WHERE state = 'OPEN'")
            .fetch_one(&state.pool)
            .await?;
    let placed_wagers: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM wagers WHERE state = 'PLACED'")
            .fetch_one(&state.pool)
            .await?;

    Ok(Json(HealthResponse { tracked_participants, open_markets, placed_wagers }))
}
