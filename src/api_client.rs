//! Casino API Client
//!
//! HTTP client for the remote casino API. Every request carries the bearer
//! credential from the shared `AuthContext`; a 401 anywhere tears that
//! context down and surfaces `CoreError::Unauthenticated`.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::AuthContext;
use crate::config::ClientConfig;
use crate::dashboard::PlayerFeed;
use crate::engine::{RoundEngine, SessionGateway};
use crate::error::{CoreError, OtpErrorCode, Result};
use crate::jackpot::JackpotGateway;
use crate::models::*;
use crate::otp::CashierGateway;

// ============================================================================
// API CLIENT
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiClient {
    config: ClientConfig,
    client: Client,
    auth: AuthContext,
}

impl ApiClient {
    pub fn new(config: ClientConfig, auth: AuthContext) -> Self {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self { config, client, auth }
    }

    /// Client configured from `CASINO_*` environment variables
    pub fn from_env(auth: AuthContext) -> Self {
        Self::new(ClientConfig::from_env(), auth)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    // ========================================================================
    // TRANSPORT
    // ========================================================================

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder> {
        let token = self.auth.bearer()?;
        Ok(builder.bearer_auth(token))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = self
            .authorized(builder)?
            .send()
            .await
            .map_err(|e| CoreError::from_transport(&e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            warn!("credential rejected, logging out");
            self.auth.logout();
            return Err(CoreError::Unauthenticated);
        }
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(error_from_body(status, &body))
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| {
                if e.is_decode() {
                    CoreError::InvalidResponse(e.to_string())
                } else {
                    CoreError::from_transport(&e)
                }
            })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.config.url(path);
        debug!(%url, "GET");
        let response = self.send(self.client.get(&url)).await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.config.url(path);
        debug!(%url, "POST");
        let response = self.send(self.client.post(&url).json(body)).await?;
        Self::decode(response).await
    }

    // ========================================================================
    // PLAYER ENDPOINTS
    // ========================================================================

    pub async fn get_dashboard(&self) -> Result<DashboardPayload> {
        self.get_json("/players/dashboard").await
    }

    pub async fn get_game_details(&self, game_id: &str) -> Result<GameDetails> {
        self.get_json(&format!("/players/game/{}", game_id)).await
    }

    pub async fn start_session(&self, game_id: &str) -> Result<SessionStartResponse> {
        let body = SessionStartRequest { game_id: game_id.to_string() };
        self.post_json("/players/session/start", &body).await
    }

    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        let body = SessionEndRequest { session_id: session_id.to_string() };
        let _: serde_json::Value = self.post_json("/players/session/end", &body).await?;
        Ok(())
    }

    pub async fn play_round(&self, game_id: &str, request: &BetRequest) -> Result<RoundOutcome> {
        self.post_json(&format!("/engine/play/{}", game_id), request).await
    }

    pub async fn get_jackpots(&self) -> Result<Vec<JackpotEvent>> {
        self.get_json("/players/jackpots").await
    }

    pub async fn enter_jackpot(&self, event_id: &str, wallet: WalletKind) -> Result<()> {
        let body = JackpotEntryRequest {
            jackpot_event_id: event_id.to_string(),
            wallet_type: wallet,
        };
        let _: serde_json::Value = self.post_json("/players/jackpots/enter", &body).await?;
        Ok(())
    }

    pub async fn get_latest_winner(&self) -> Result<Option<LatestWinner>> {
        self.get_json("/players/jackpots/latest-winner").await
    }

    // ========================================================================
    // STAFF ENDPOINTS
    // ========================================================================

    pub async fn lookup_player(&self, email: &str) -> Result<PlayerLookup> {
        let url = self.config.url("/staff/lookup");
        let response = self
            .send(self.client.get(&url).query(&[("email", email)]))
            .await
            .map_err(staff_error)?;
        Self::decode(response).await
    }

    pub async fn initiate_transaction(
        &self,
        kind: TransactionKind,
        email: &str,
        amount: Decimal,
    ) -> Result<OtpInitiateResponse> {
        let body = OtpInitiateRequest {
            player_email: email.to_string(),
            amount,
        };
        self.post_json(&format!("/staff/{}/initiate", kind.path()), &body)
            .await
            .map_err(staff_error)
    }

    pub async fn verify_transaction(
        &self,
        kind: TransactionKind,
        email: &str,
        otp_code: &str,
    ) -> Result<OtpVerifyResponse> {
        let body = OtpVerifyRequest {
            player_email: email.to_string(),
            otp_code: otp_code.to_string(),
        };
        self.post_json(&format!("/staff/{}/verify", kind.path()), &body)
            .await
            .map_err(staff_error)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn error_from_body(status: StatusCode, body: &str) -> CoreError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();

    if status.is_server_error() {
        let message = parsed.map(|b| b.detail).unwrap_or_else(|| status.to_string());
        return CoreError::Transient { message, ambiguous: false };
    }

    match parsed {
        Some(ApiErrorBody { detail, code }) => CoreError::business(status, code, detail),
        None if body.trim().is_empty() => CoreError::business(status, None, status.to_string()),
        None => CoreError::business(status, None, body.trim().to_string()),
    }
}

/// Narrow a staff-endpoint business error into an OTP protocol code.
///
/// Prefers the machine `code`; falls back to the backend's wording.
fn staff_error(err: CoreError) -> CoreError {
    let CoreError::BusinessRule { status, code, message } = &err else {
        return err;
    };

    if let Some(otp) = code.as_deref().and_then(OtpErrorCode::parse) {
        return CoreError::otp(otp);
    }

    let lowered = message.to_lowercase();
    let mapped = if *status == StatusCode::NOT_FOUND.as_u16() && lowered.contains("player") {
        Some(OtpErrorCode::PlayerNotFound)
    } else if lowered.contains("expired") {
        Some(OtpErrorCode::OtpExpired)
    } else if lowered.contains("invalid otp") {
        Some(OtpErrorCode::OtpMismatch)
    } else if lowered.contains("insufficient") {
        Some(OtpErrorCode::InsufficientBalance)
    } else if lowered.contains("amount must be positive") {
        Some(OtpErrorCode::InvalidAmount)
    } else if lowered.contains("no deposit request") || lowered.contains("no pending") {
        Some(OtpErrorCode::NoPendingTicket)
    } else {
        None
    };

    mapped.map(CoreError::otp).unwrap_or(err)
}

// ============================================================================
// GATEWAY IMPLEMENTATIONS
// ============================================================================

#[async_trait]
impl RoundEngine for ApiClient {
    async fn play(&self, game_id: &str, request: &BetRequest) -> Result<RoundOutcome> {
        self.play_round(game_id, request).await
    }
}

#[async_trait]
impl SessionGateway for ApiClient {
    async fn game_details(&self, game_id: &str) -> Result<GameDetails> {
        self.get_game_details(game_id).await
    }

    async fn start_session(&self, game_id: &str) -> Result<SessionStartResponse> {
        ApiClient::start_session(self, game_id).await
    }

    async fn end_session(&self, session_id: &str) -> Result<()> {
        ApiClient::end_session(self, session_id).await
    }
}

#[async_trait]
impl PlayerFeed for ApiClient {
    async fn dashboard(&self) -> Result<DashboardPayload> {
        self.get_dashboard().await
    }

    async fn jackpots(&self) -> Result<Vec<JackpotEvent>> {
        self.get_jackpots().await
    }

    async fn latest_winner(&self) -> Result<Option<LatestWinner>> {
        self.get_latest_winner().await
    }
}

#[async_trait]
impl JackpotGateway for ApiClient {
    async fn enter(&self, event_id: &str, wallet: WalletKind) -> Result<()> {
        self.enter_jackpot(event_id, wallet).await
    }
}

#[async_trait]
impl CashierGateway for ApiClient {
    async fn lookup(&self, email: &str) -> Result<PlayerLookup> {
        self.lookup_player(email).await
    }

    async fn initiate(&self, kind: TransactionKind, email: &str, amount: Decimal) -> Result<()> {
        self.initiate_transaction(kind, email, amount).await.map(|_| ())
    }

    async fn verify(&self, kind: TransactionKind, email: &str, otp_code: &str) -> Result<Decimal> {
        self.verify_transaction(kind, email, otp_code)
            .await
            .map(|r| r.new_balance)
    }
}
