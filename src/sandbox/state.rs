// In-memory state for the sandbox casino backend

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SandboxConfig;
use crate::models::*;

pub type SharedState = Arc<Mutex<SandboxState>>;

/// Lock the shared state, recovering from a poisoned mutex.
pub fn lock(state: &SharedState) -> MutexGuard<'_, SandboxState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// API ERROR
// ============================================================================

/// Error reply: `{detail, code}` with an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
    pub code: Option<&'static str>,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            code: None,
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Could not validate credentials")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            detail: self.detail,
            code: self.code.map(str::to_string),
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Player(String),
    Staff(String),
}

#[derive(Debug, Clone)]
pub struct SandboxPlayer {
    pub player_id: String,
    pub username: String,
    pub email: String,
    pub kyc_status: KycStatus,
    pub balance: Decimal,
    pub bonus_balance: Decimal,
}

impl SandboxPlayer {
    fn wallet_mut(&mut self, wallet: WalletKind) -> &mut Decimal {
        match wallet {
            WalletKind::Real => &mut self.balance,
            WalletKind::Bonus => &mut self.bonus_balance,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SandboxGame {
    pub game: Game,
    pub provider: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PlaySession {
    pub session_id: String,
    pub email: String,
    pub game_id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PendingOtp {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SandboxJackpot {
    pub event: JackpotEvent,
    pub entrants: HashSet<String>,
    pub winner: Option<String>,
}

/// Forced outcome for the next engine round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Win,
    Loss,
}

// ============================================================================
// ENGINE RULES
// ============================================================================

const SLOT_SYMBOLS: [&str; 7] = ["🍒", "🍋", "🍊", "🍇", "🔔", "💎", "7️⃣"];
const SLOT_WEIGHTS: [u32; 7] = [30, 25, 20, 15, 7, 2, 1];

fn slot_multiplier(symbols: &[String]) -> Decimal {
    match symbols {
        [a, b, c] if a == b && b == c => match a.as_str() {
            "7️⃣" => dec!(50),
            "💎" => dec!(20),
            "🔔" => dec!(15),
            _ => dec!(10),
        },
        [a, b, c] if a == b || b == c => dec!(1.5),
        _ => Decimal::ZERO,
    }
}

/// Payout multiplier for a drawn result.
pub fn multiplier(game_type: GameType, prediction: Option<&Prediction>, game_data: &Value) -> Decimal {
    match game_type {
        GameType::Slot => {
            let symbols: Vec<String> = game_data["symbols"]
                .as_array()
                .map(|s| s.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            slot_multiplier(&symbols)
        }
        GameType::Dice | GameType::Wheel => {
            let key = if game_type == GameType::Dice { "roll" } else { "segment" };
            let hit = matches!(prediction, Some(Prediction::Number(n)) if game_data[key].as_u64() == Some(u64::from(*n)));
            let pays = if game_type == GameType::Dice { dec!(5) } else { dec!(15) };
            if hit { pays } else { Decimal::ZERO }
        }
        GameType::Coin => {
            let hit = prediction.is_some_and(|p| game_data["flip"].as_str() == Some(p.wire_value().as_str()));
            if hit { dec!(1.9) } else { Decimal::ZERO }
        }
        GameType::HighLow => {
            let card = game_data["card"].as_u64().unwrap_or(7);
            let hit = match prediction {
                Some(Prediction::Low) => card < 7,
                Some(Prediction::High) => card > 7,
                _ => false,
            };
            if hit { dec!(1.9) } else { Decimal::ZERO }
        }
    }
}

fn draw(game_type: GameType, rng: &mut impl Rng) -> Value {
    match game_type {
        GameType::Slot => {
            let total: u32 = SLOT_WEIGHTS.iter().sum();
            let symbols: Vec<&str> = (0..3)
                .map(|_| {
                    let mut roll = rng.gen_range(0..total);
                    let mut picked = SLOT_SYMBOLS[0];
                    for (symbol, weight) in SLOT_SYMBOLS.iter().zip(SLOT_WEIGHTS) {
                        if roll < weight {
                            picked = *symbol;
                            break;
                        }
                        roll -= weight;
                    }
                    picked
                })
                .collect();
            json!({ "symbols": symbols })
        }
        GameType::Dice => json!({ "roll": rng.gen_range(1..=6) }),
        GameType::Wheel => json!({ "segment": rng.gen_range(1..=20) }),
        GameType::Coin => json!({ "flip": if rng.gen_bool(0.5) { "HEADS" } else { "TAILS" } }),
        GameType::HighLow => json!({ "card": rng.gen_range(1..=13) }),
    }
}

/// A result that produces the scripted outcome for this prediction.
fn forced(game_type: GameType, prediction: Option<&Prediction>, outcome: ScriptedOutcome) -> Value {
    let win = outcome == ScriptedOutcome::Win;
    match (game_type, prediction) {
        (GameType::Slot, _) if win => json!({ "symbols": ["🔔", "🔔", "🔔"] }),
        (GameType::Slot, _) => json!({ "symbols": ["🍒", "🍋", "🍊"] }),
        (GameType::Dice, Some(Prediction::Number(n))) => json!({ "roll": if win { *n } else { n % 6 + 1 } }),
        (GameType::Wheel, Some(Prediction::Number(n))) => json!({ "segment": if win { *n } else { n % 20 + 1 } }),
        (GameType::Coin, Some(p)) => {
            let flip = match (p, win) {
                (Prediction::Heads, true) | (Prediction::Tails, false) => "HEADS",
                _ => "TAILS",
            };
            json!({ "flip": flip })
        }
        (GameType::HighLow, Some(p)) => {
            let card = match (p, win) {
                (Prediction::High, true) => 10,
                (Prediction::Low, true) => 3,
                _ => 7,
            };
            json!({ "card": card })
        }
        _ => Value::Null,
    }
}

fn prediction_for(game: &Game, raw: Option<&str>) -> ApiResult<Option<Prediction>> {
    if game.game_type == GameType::Slot {
        return Ok(None);
    }
    let prediction = raw
        .and_then(Prediction::parse)
        .ok_or_else(|| ApiError::bad_request("Prediction is required for this game."))?;
    let valid = match (game.game_type, &prediction) {
        (GameType::Coin, Prediction::Heads | Prediction::Tails) => true,
        (GameType::HighLow, Prediction::High | Prediction::Low) => true,
        (GameType::Dice | GameType::Wheel, Prediction::Number(n)) => {
            game.game_type.max_number().is_some_and(|max| (1..=max).contains(n))
        }
        _ => false,
    };
    if !valid {
        return Err(ApiError::bad_request(format!("Invalid prediction: {}", prediction)));
    }
    Ok(Some(prediction))
}

// ============================================================================
// STATE
// ============================================================================

pub struct SandboxState {
    config: SandboxConfig,
    tenant_contact_email: String,
    players: HashMap<String, SandboxPlayer>,
    tokens: HashMap<String, Principal>,
    games: Vec<SandboxGame>,
    sessions: Vec<PlaySession>,
    otps: HashMap<String, PendingOtp>,
    jackpots: Vec<SandboxJackpot>,
    scripted: VecDeque<ScriptedOutcome>,
    engine_calls: u64,
}

impl SandboxState {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            tenant_contact_email: "support@platform.com".to_string(),
            players: HashMap::new(),
            tokens: HashMap::new(),
            games: Vec::new(),
            sessions: Vec::new(),
            otps: HashMap::new(),
            jackpots: Vec::new(),
            scripted: VecDeque::new(),
            engine_calls: 0,
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(Mutex::new(self))
    }

    // ===== SEEDING =====

    /// Register a player and return a bearer token for them.
    pub fn add_player(
        &mut self,
        username: &str,
        email: &str,
        kyc_status: KycStatus,
        balance: Decimal,
        bonus_balance: Decimal,
    ) -> String {
        let email = email.to_lowercase();
        self.players.insert(
            email.clone(),
            SandboxPlayer {
                player_id: Uuid::new_v4().to_string(),
                username: username.to_string(),
                email: email.clone(),
                kyc_status,
                balance,
                bonus_balance,
            },
        );
        self.issue_token(Principal::Player(email))
    }

    pub fn add_staff(&mut self, email: &str) -> String {
        self.issue_token(Principal::Staff(email.to_lowercase()))
    }

    fn issue_token(&mut self, principal: Principal) -> String {
        let token = format!("sbx_{}", Uuid::new_v4().simple());
        self.tokens.insert(token.clone(), principal);
        token
    }

    pub fn revoke_token(&mut self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    pub fn add_game(&mut self, game: Game, provider: Option<&str>) {
        self.games.push(SandboxGame {
            game,
            provider: provider.map(str::to_string),
        });
    }

    pub fn add_jackpot(&mut self, jackpot_event_id: &str, game_date: NaiveDate, entry_amount: Decimal) {
        self.jackpots.push(SandboxJackpot {
            event: JackpotEvent {
                jackpot_event_id: jackpot_event_id.to_string(),
                game_date,
                entry_amount,
                currency_code: "USD".to_string(),
                status: JackpotStatus::Open,
                total_pool_amount: Decimal::ZERO,
                participant_count: 0,
            },
            entrants: HashSet::new(),
            winner: None,
        });
    }

    /// Close a jackpot with the given winner (draw mechanics are out of scope).
    pub fn close_jackpot(&mut self, jackpot_event_id: &str, winner_email: &str) -> bool {
        let Some(jackpot) = self
            .jackpots
            .iter_mut()
            .find(|j| j.event.jackpot_event_id == jackpot_event_id)
        else {
            return false;
        };
        jackpot.event.status = JackpotStatus::Drawn;
        jackpot.winner = Some(winner_email.to_lowercase());
        true
    }

    pub fn script_outcomes(&mut self, outcomes: impl IntoIterator<Item = ScriptedOutcome>) {
        self.scripted.extend(outcomes);
    }

    pub fn set_kyc(&mut self, email: &str, kyc_status: KycStatus) {
        if let Some(player) = self.players.get_mut(&email.to_lowercase()) {
            player.kyc_status = kyc_status;
        }
    }

    // ===== INSPECTION =====

    pub fn player(&self, email: &str) -> Option<&SandboxPlayer> {
        self.players.get(&email.to_lowercase())
    }

    pub fn engine_calls(&self) -> u64 {
        self.engine_calls
    }

    pub fn open_sessions(&self, email: &str) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.email == email)
            .count()
    }

    // ===== AUTH =====

    pub fn authenticate(&self, token: Option<&str>) -> ApiResult<Principal> {
        token
            .and_then(|t| self.tokens.get(t))
            .cloned()
            .ok_or_else(ApiError::unauthorized)
    }

    pub fn require_player(&self, token: Option<&str>) -> ApiResult<String> {
        match self.authenticate(token)? {
            Principal::Player(email) => Ok(email),
            Principal::Staff(_) => Err(ApiError::new(StatusCode::FORBIDDEN, "Player access required")),
        }
    }

    pub fn require_staff(&self, token: Option<&str>) -> ApiResult<String> {
        match self.authenticate(token)? {
            Principal::Staff(email) => Ok(email),
            Principal::Player(_) => Err(ApiError::new(StatusCode::FORBIDDEN, "Staff access required")),
        }
    }

    fn player_mut(&mut self, email: &str) -> ApiResult<&mut SandboxPlayer> {
        self.players
            .get_mut(email)
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Player not found").with_code("PLAYER_NOT_FOUND"))
    }

    fn game(&self, game_id: &str) -> ApiResult<&SandboxGame> {
        self.games
            .iter()
            .find(|g| g.game.game_id == game_id)
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Game not found"))
    }

    // ===== PLAYER =====

    pub fn dashboard(&mut self, email: &str) -> ApiResult<DashboardPayload> {
        let now = Utc::now();
        let active_otp = self
            .otps
            .get(email)
            .filter(|otp| otp.expires_at > now)
            .map(|otp| ActiveOtp {
                otp_code: otp.code.clone(),
            });
        let contact = self.tenant_contact_email.clone();
        let games = self
            .games
            .iter()
            .map(|g| GameSummary {
                game_id: g.game.game_id.clone(),
                game_name: g.game.title.clone(),
                game_type: g.game.game_type,
                thumbnail_url: g.game.default_thumbnail_url.clone(),
                provider: g.provider.clone(),
            })
            .collect();
        let player = self.player_mut(email)?;

        Ok(DashboardPayload {
            profile: PlayerProfile {
                username: player.username.clone(),
                email: player.email.clone(),
                kyc_status: player.kyc_status,
                balance: player.balance,
                bonus_balance: player.bonus_balance,
                currency_code: "USD".to_string(),
            },
            tenant_contact_email: Some(contact),
            games,
            active_otp,
        })
    }

    pub fn game_details(&mut self, email: &str, game_id: &str) -> ApiResult<GameDetails> {
        let game = self.game(game_id)?.game.clone();
        let player = self.player_mut(email)?;
        Ok(GameDetails {
            game,
            balance: player.balance,
            bonus_balance: player.bonus_balance,
        })
    }

    /// Close sessions past the max age, then resume the open one for this
    /// game or create a new one.
    fn current_session(&mut self, email: &str, game_id: &str) -> (String, bool) {
        let now = Utc::now();
        let max_age = chrono::Duration::from_std(self.config.session_max_age).unwrap_or_else(|_| chrono::Duration::hours(2));
        self.sessions.retain(|s| {
            let stale = s.email == email && now - s.started_at > max_age;
            if stale {
                debug!(session_id = %s.session_id, "closing stale session");
            }
            !stale
        });

        if let Some(open) = self
            .sessions
            .iter()
            .find(|s| s.email == email && s.game_id == game_id)
        {
            return (open.session_id.clone(), true);
        }

        let session_id = Uuid::new_v4().to_string();
        self.sessions.push(PlaySession {
            session_id: session_id.clone(),
            email: email.to_string(),
            game_id: game_id.to_string(),
            started_at: now,
        });
        (session_id, false)
    }

    pub fn start_session(&mut self, email: &str, game_id: &str) -> ApiResult<SessionStartResponse> {
        self.game(game_id)?;
        let (session_id, resumed) = self.current_session(email, game_id);
        let status = if resumed { "resumed" } else { "created" };
        info!(email, game_id, session_id = %session_id, status, "game session");
        Ok(SessionStartResponse {
            status: status.to_string(),
            session_id,
        })
    }

    /// Ended sessions are dropped; only open ones are tracked.
    pub fn end_session(&mut self, email: &str, session_id: &str) -> ApiResult<Value> {
        self.sessions.retain(|s| !(s.session_id == session_id && s.email == email));
        Ok(json!({ "status": "success" }))
    }

    /// Settle one round. Validation order: game, bet range, wallet funds,
    /// prediction.
    pub fn play(&mut self, email: &str, game_id: &str, request: &BetRequest) -> ApiResult<RoundOutcome> {
        let game = self.game(game_id)?.game.clone();
        let bet = request.bet_amount;

        if bet < game.min_bet {
            return Err(ApiError::bad_request(format!("Minimum bet is ${}", game.min_bet)));
        }
        if game.max_bet > Decimal::ZERO && bet > game.max_bet {
            return Err(ApiError::bad_request(format!("Maximum bet for this game is ${}", game.max_bet)));
        }

        let wallet = request.use_wallet_type;
        let available = {
            let player = self.player_mut(email)?;
            *player.wallet_mut(wallet)
        };
        if available < bet {
            return Err(ApiError::bad_request(format!("Insufficient {} funds.", wallet)));
        }

        let prediction = prediction_for(&game, request.bet_data.prediction.as_deref())?;
        self.engine_calls += 1;

        let game_data = match self.scripted.pop_front() {
            Some(outcome) => forced(game.game_type, prediction.as_ref(), outcome),
            None => draw(game.game_type, &mut rand::thread_rng()),
        };
        let payout = bet * multiplier(game.game_type, prediction.as_ref(), &game_data);
        let (session_id, _) = self.current_session(email, game_id);

        let player = self.player_mut(email)?;
        let slot = player.wallet_mut(wallet);
        *slot = *slot - bet + payout;
        let balance_after = *slot;

        let outcome = if payout > Decimal::ZERO { Outcome::Win } else { Outcome::Loss };
        info!(email, game_id, %bet, %payout, wallet = %wallet, "round settled");

        Ok(RoundOutcome {
            session_id: Some(session_id),
            outcome,
            win_amount: payout - bet,
            balance_after,
            game_data,
            bet_amount: Some(bet),
            game_id: Some(game.game_id),
            game_name: Some(game.title),
        })
    }

    // ===== JACKPOTS =====

    pub fn open_jackpots(&self) -> Vec<JackpotEvent> {
        let today = Utc::now().date_naive();
        let mut events: Vec<JackpotEvent> = self
            .jackpots
            .iter()
            .filter(|j| j.event.status == JackpotStatus::Open && j.event.game_date >= today)
            .map(|j| j.event.clone())
            .collect();
        events.sort_by_key(|e| e.game_date);
        events
    }

    pub fn enter_jackpot(&mut self, email: &str, request: &JackpotEntryRequest) -> ApiResult<Value> {
        let entry_amount = {
            let jackpot = self
                .jackpots
                .iter()
                .find(|j| j.event.jackpot_event_id == request.jackpot_event_id)
                .filter(|j| j.event.status == JackpotStatus::Open)
                .ok_or_else(|| ApiError::bad_request("Event unavailable"))?;
            if jackpot.entrants.contains(email) {
                return Err(ApiError::bad_request("Already entered"));
            }
            jackpot.event.entry_amount
        };

        let player = self.player_mut(email)?;
        if !player.kyc_status.is_approved() {
            return Err(ApiError::new(StatusCode::FORBIDDEN, "KYC Required"));
        }
        let slot = player.wallet_mut(request.wallet_type);
        if *slot < entry_amount {
            return Err(ApiError::bad_request("Insufficient funds"));
        }
        *slot -= entry_amount;

        if let Some(jackpot) = self
            .jackpots
            .iter_mut()
            .find(|j| j.event.jackpot_event_id == request.jackpot_event_id)
        {
            jackpot.entrants.insert(email.to_string());
            jackpot.event.total_pool_amount += entry_amount;
            jackpot.event.participant_count = jackpot.entrants.len() as u32;
        }
        info!(email, event = %request.jackpot_event_id, "jackpot entry");
        Ok(json!({ "status": "success" }))
    }

    pub fn latest_winner(&self) -> Option<LatestWinner> {
        self.jackpots
            .iter()
            .filter(|j| j.event.status == JackpotStatus::Drawn)
            .filter_map(|j| {
                let winner = self.players.get(j.winner.as_deref()?)?;
                Some(LatestWinner {
                    username: winner.username.clone(),
                    total_pool_amount: j.event.total_pool_amount,
                    game_date: j.event.game_date,
                    jackpot_event_id: j.event.jackpot_event_id.clone(),
                })
            })
            .max_by_key(|w| w.game_date)
    }

    // ===== STAFF CASHIER =====

    pub fn lookup(&self, email: &str) -> ApiResult<PlayerLookup> {
        let player = self
            .players
            .get(&email.trim().to_lowercase())
            .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Player not found").with_code("PLAYER_NOT_FOUND"))?;
        Ok(PlayerLookup {
            player_id: player.player_id.clone(),
            username: player.username.clone(),
            email: player.email.clone(),
            status: Some("ACTIVE".to_string()),
            kyc_status: player.kyc_status,
            balance: player.balance,
        })
    }

    /// Issue a fresh code, replacing whatever the player had pending.
    pub fn initiate(&mut self, kind: TransactionKind, request: &OtpInitiateRequest) -> ApiResult<OtpInitiateResponse> {
        if request.amount <= Decimal::ZERO {
            return Err(ApiError::bad_request("Amount must be positive").with_code("INVALID_AMOUNT"));
        }
        let email = request.player_email.trim().to_lowercase();
        let ttl = chrono::Duration::from_std(self.config.otp_ttl).unwrap_or_else(|_| chrono::Duration::minutes(5));

        let player = self.player_mut(&email)?;
        if !player.kyc_status.is_approved() {
            let detail = match kind {
                TransactionKind::Deposit => "Deposit Blocked: Player KYC is not APPROVED.",
                TransactionKind::Withdraw => "Player KYC not approved.",
            };
            return Err(ApiError::new(StatusCode::FORBIDDEN, detail));
        }
        if kind == TransactionKind::Withdraw && player.balance < request.amount {
            return Err(ApiError::bad_request("Insufficient funds.").with_code("INSUFFICIENT_BALANCE"));
        }

        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        debug!(email = %email, kind = %kind, otp = %code, "otp issued");
        self.otps.insert(
            email.clone(),
            PendingOtp {
                kind,
                amount: request.amount,
                code,
                expires_at: Utc::now() + ttl,
            },
        );
        info!(email = %email, kind = %kind, amount = %request.amount, "otp sent to player");

        let message = match kind {
            TransactionKind::Deposit => "Deposit OTP sent.",
            TransactionKind::Withdraw => "Withdrawal OTP sent.",
        };
        Ok(OtpInitiateResponse {
            status: "otp_sent".to_string(),
            message: Some(message.to_string()),
        })
    }

    pub fn verify(&mut self, kind: TransactionKind, request: &OtpVerifyRequest) -> ApiResult<OtpVerifyResponse> {
        let email = request.player_email.trim().to_lowercase();
        self.player_mut(&email)?;

        let pending = self
            .otps
            .get(&email)
            .filter(|otp| otp.kind == kind)
            .cloned()
            .ok_or_else(|| {
                let detail = match kind {
                    TransactionKind::Deposit => "No deposit request found.",
                    TransactionKind::Withdraw => "No pending withdrawal.",
                };
                ApiError::bad_request(detail).with_code("NO_PENDING_TICKET")
            })?;
        if pending.code != request.otp_code {
            return Err(ApiError::bad_request("Invalid OTP.").with_code("OTP_MISMATCH"));
        }
        if Utc::now() > pending.expires_at {
            return Err(ApiError::bad_request("OTP Expired.").with_code("OTP_EXPIRED"));
        }

        let player = self.player_mut(&email)?;
        match kind {
            TransactionKind::Deposit => player.balance += pending.amount,
            TransactionKind::Withdraw => {
                if player.balance < pending.amount {
                    return Err(ApiError::bad_request("Insufficient funds.").with_code("INSUFFICIENT_BALANCE"));
                }
                player.balance -= pending.amount;
            }
        }
        let new_balance = player.balance;
        self.otps.remove(&email);
        info!(email = %email, kind = %kind, amount = %pending.amount, %new_balance, "transaction completed");

        Ok(OtpVerifyResponse {
            status: "success".to_string(),
            new_balance,
        })
    }
}
