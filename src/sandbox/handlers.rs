// HTTP handlers for the sandbox casino backend

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::{lock, ApiError, ApiResult, SharedState};
use crate::models::*;

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

fn transaction_kind(raw: &str) -> ApiResult<TransactionKind> {
    match raw {
        "deposit" => Ok(TransactionKind::Deposit),
        "withdraw" => Ok(TransactionKind::Withdraw),
        _ => Err(ApiError::new(StatusCode::NOT_FOUND, "Not Found")),
    }
}

// ===== HEALTH =====

pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "casino-sandbox" }))
}

// ===== PLAYER ENDPOINTS =====

pub async fn get_dashboard(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<Json<DashboardPayload>> {
    let mut state = lock(&state);
    let email = state.require_player(bearer(&headers))?;
    state.dashboard(&email).map(Json)
}

pub async fn get_game_details(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(game_id): Path<String>,
) -> ApiResult<Json<GameDetails>> {
    let mut state = lock(&state);
    let email = state.require_player(bearer(&headers))?;
    state.game_details(&email, &game_id).map(Json)
}

pub async fn start_session(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<SessionStartRequest>,
) -> ApiResult<Json<SessionStartResponse>> {
    let mut state = lock(&state);
    let email = state.require_player(bearer(&headers))?;
    state.start_session(&email, &request.game_id).map(Json)
}

pub async fn end_session(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<SessionEndRequest>,
) -> ApiResult<Json<Value>> {
    let mut state = lock(&state);
    let email = state.require_player(bearer(&headers))?;
    state.end_session(&email, &request.session_id).map(Json)
}

pub async fn play(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(game_id): Path<String>,
    Json(request): Json<BetRequest>,
) -> ApiResult<Json<RoundOutcome>> {
    let mut state = lock(&state);
    let email = state.require_player(bearer(&headers))?;
    state.play(&email, &game_id, &request).map(Json)
}

// ===== JACKPOT ENDPOINTS =====

pub async fn get_jackpots(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<JackpotEvent>>> {
    let state = lock(&state);
    state.require_player(bearer(&headers))?;
    Ok(Json(state.open_jackpots()))
}

pub async fn enter_jackpot(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(request): Json<JackpotEntryRequest>,
) -> ApiResult<Json<Value>> {
    let mut state = lock(&state);
    let email = state.require_player(bearer(&headers))?;
    state.enter_jackpot(&email, &request).map(Json)
}

pub async fn latest_winner(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> ApiResult<Json<Option<LatestWinner>>> {
    let state = lock(&state);
    state.require_player(bearer(&headers))?;
    Ok(Json(state.latest_winner()))
}

// ===== STAFF ENDPOINTS =====

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    pub email: String,
}

pub async fn lookup_player(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Query(query): Query<LookupQuery>,
) -> ApiResult<Json<PlayerLookup>> {
    let state = lock(&state);
    state.require_staff(bearer(&headers))?;
    state.lookup(&query.email).map(Json)
}

pub async fn initiate_transaction(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(kind): Path<String>,
    Json(request): Json<OtpInitiateRequest>,
) -> ApiResult<Json<OtpInitiateResponse>> {
    let kind = transaction_kind(&kind)?;
    let mut state = lock(&state);
    state.require_staff(bearer(&headers))?;
    state.initiate(kind, &request).map(Json)
}

pub async fn verify_transaction(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(kind): Path<String>,
    Json(request): Json<OtpVerifyRequest>,
) -> ApiResult<Json<OtpVerifyResponse>> {
    let kind = transaction_kind(&kind)?;
    let mut state = lock(&state);
    state.require_staff(bearer(&headers))?;
    state.verify(kind, &request).map(Json)
}
