// Data models for the casino play API
//
// Money is `rust_decimal::Decimal` everywhere. On the wire it travels as a
// JSON number, matching the backend's float columns.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ============================================================================
// PLAYER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KycStatus {
    Pending,
    Approved,
    Rejected,
}

impl KycStatus {
    pub fn is_approved(&self) -> bool {
        matches!(self, KycStatus::Approved)
    }
}

/// One of the two independent balances a player holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum WalletKind {
    #[default]
    Real,
    Bonus,
}

impl WalletKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletKind::Real => "REAL",
            WalletKind::Bonus => "BONUS",
        }
    }
}

impl std::fmt::Display for WalletKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub username: String,
    pub email: String,
    pub kyc_status: KycStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub bonus_balance: Decimal,
    #[serde(default = "default_currency")]
    pub currency_code: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

// ============================================================================
// GAMES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GameType {
    Slot,
    Dice,
    Wheel,
    Coin,
    #[serde(rename = "HIGHLOW")]
    HighLow,
}

impl GameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameType::Slot => "SLOT",
            GameType::Dice => "DICE",
            GameType::Wheel => "WHEEL",
            GameType::Coin => "COIN",
            GameType::HighLow => "HIGHLOW",
        }
    }

    /// Highest selectable number for numeric games
    pub fn max_number(&self) -> Option<u8> {
        match self {
            GameType::Dice => Some(6),
            GameType::Wheel => Some(20),
            _ => None,
        }
    }
}

impl std::fmt::Display for GameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Game descriptor, loaded once when a session opens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: String,
    #[serde(alias = "game_name")]
    pub title: String,
    pub game_type: GameType,
    #[serde(with = "rust_decimal::serde::float")]
    pub min_bet: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub max_bet: Decimal,
    #[serde(default)]
    pub default_thumbnail_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
}

/// `GET /players/game/{id}`: the descriptor plus both wallet balances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameDetails {
    #[serde(flatten)]
    pub game: Game,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub bonus_balance: Decimal,
}

/// Lobby entry listed on the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSummary {
    pub game_id: String,
    pub game_name: String,
    pub game_type: GameType,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

// ============================================================================
// ROUNDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prediction {
    Heads,
    Tails,
    High,
    Low,
    Number(u8),
}

impl Prediction {
    pub fn wire_value(&self) -> String {
        match self {
            Prediction::Heads => "HEADS".to_string(),
            Prediction::Tails => "TAILS".to_string(),
            Prediction::High => "HIGH".to_string(),
            Prediction::Low => "LOW".to_string(),
            Prediction::Number(n) => n.to_string(),
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "HEADS" => Some(Prediction::Heads),
            "TAILS" => Some(Prediction::Tails),
            "HIGH" => Some(Prediction::High),
            "LOW" => Some(Prediction::Low),
            other => other.parse::<u8>().ok().map(Prediction::Number),
        }
    }

    /// The preselected prediction for a freshly opened game
    pub fn default_for(game_type: GameType) -> Option<Self> {
        match game_type {
            GameType::Coin => Some(Prediction::Heads),
            GameType::HighLow => Some(Prediction::High),
            GameType::Dice | GameType::Wheel => Some(Prediction::Number(1)),
            GameType::Slot => None,
        }
    }
}

impl std::fmt::Display for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.wire_value())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BetData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
}

/// Body of `POST /engine/play/{gameId}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub bet_amount: Decimal,
    pub use_wallet_type: WalletKind,
    #[serde(default)]
    pub bet_data: BetData,
}

impl BetRequest {
    pub fn new(bet_amount: Decimal, wallet: WalletKind, prediction: Option<&Prediction>) -> Self {
        Self {
            bet_amount,
            use_wallet_type: wallet,
            bet_data: BetData {
                prediction: prediction.map(Prediction::wire_value),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    Win,
    Loss,
}

/// Engine answer for one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundOutcome {
    #[serde(default)]
    pub session_id: Option<String>,
    pub outcome: Outcome,
    #[serde(with = "rust_decimal::serde::float")]
    pub win_amount: Decimal,
    /// Server-authoritative balance of the wallet the bet was placed from
    #[serde(with = "rust_decimal::serde::float")]
    pub balance_after: Decimal,
    /// Game-specific presentation data (symbols, roll, flip, segment, card)
    #[serde(default)]
    pub game_data: serde_json::Value,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub bet_amount: Option<Decimal>,
    #[serde(default)]
    pub game_id: Option<String>,
    #[serde(default)]
    pub game_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartRequest {
    pub game_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStartResponse {
    /// "created" or "resumed"
    pub status: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionEndRequest {
    pub session_id: String,
}

// ============================================================================
// DASHBOARD
// ============================================================================

/// OTP currently pending for the logged-in player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveOtp {
    pub otp_code: String,
}

/// `GET /players/dashboard`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardPayload {
    pub profile: PlayerProfile,
    #[serde(default)]
    pub tenant_contact_email: Option<String>,
    #[serde(default)]
    pub games: Vec<GameSummary>,
    #[serde(default)]
    pub active_otp: Option<ActiveOtp>,
}

// ============================================================================
// JACKPOTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JackpotStatus {
    Open,
    #[serde(alias = "CLOSED")]
    Drawn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JackpotEvent {
    pub jackpot_event_id: String,
    pub game_date: NaiveDate,
    #[serde(with = "rust_decimal::serde::float")]
    pub entry_amount: Decimal,
    #[serde(default = "default_currency")]
    pub currency_code: String,
    pub status: JackpotStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_pool_amount: Decimal,
    #[serde(default)]
    pub participant_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JackpotEntryRequest {
    pub jackpot_event_id: String,
    pub wallet_type: WalletKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestWinner {
    pub username: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_pool_amount: Decimal,
    pub game_date: NaiveDate,
    pub jackpot_event_id: String,
}

// ============================================================================
// STAFF CASHIER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
}

impl TransactionKind {
    /// Path segment under `/staff`
    pub fn path(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Deposit => f.write_str("DEPOSIT"),
            TransactionKind::Withdraw => f.write_str("WITHDRAW"),
        }
    }
}

/// Snapshot returned by `GET /staff/lookup`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLookup {
    pub player_id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub status: Option<String>,
    pub kyc_status: KycStatus,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpInitiateRequest {
    pub player_email: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpInitiateResponse {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpVerifyRequest {
    pub player_email: String,
    pub otp_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpVerifyResponse {
    pub status: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub new_balance: Decimal,
}

/// Error body the API returns with any non-2xx status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub detail: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_bet_request_wire_shape() {
        let req = BetRequest::new(dec!(50), WalletKind::Real, Some(&Prediction::Heads));
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body,
            json!({"bet_amount": 50.0, "use_wallet_type": "REAL", "bet_data": {"prediction": "HEADS"}})
        );

        let slot = BetRequest::new(dec!(2.5), WalletKind::Bonus, None);
        let body = serde_json::to_value(&slot).unwrap();
        assert_eq!(body["bet_data"], json!({}));
        assert_eq!(body["use_wallet_type"], "BONUS");
    }

    #[test]
    fn test_round_outcome_from_engine_json() {
        let raw = json!({
            "game_id": "g-1",
            "game_name": "Lucky Sevens",
            "bet_amount": 50.0,
            "win_amount": -50.0,
            "balance_after": 150.0,
            "outcome": "LOSS",
            "game_data": {"symbols": ["A", "B", "C"]},
            "session_id": "s-9"
        });
        let outcome: RoundOutcome = serde_json::from_value(raw).unwrap();
        assert_eq!(outcome.outcome, Outcome::Loss);
        assert_eq!(outcome.balance_after, dec!(150));
        assert_eq!(outcome.session_id.as_deref(), Some("s-9"));
        assert_eq!(outcome.bet_amount, Some(dec!(50)));
    }

    #[test]
    fn test_game_details_accepts_title_or_game_name() {
        let raw = json!({
            "game_id": "g-2",
            "game_name": "Flip",
            "game_type": "COIN",
            "min_bet": 1,
            "max_bet": 100,
            "balance": 200.0,
            "bonus_balance": 0
        });
        let details: GameDetails = serde_json::from_value(raw).unwrap();
        assert_eq!(details.game.title, "Flip");
        assert_eq!(details.game.game_type, GameType::Coin);
        assert_eq!(details.balance, dec!(200));
    }

    #[test]
    fn test_prediction_parsing_and_defaults() {
        assert_eq!(Prediction::parse("tails"), Some(Prediction::Tails));
        assert_eq!(Prediction::parse(" 6 "), Some(Prediction::Number(6)));
        assert_eq!(Prediction::parse("maybe"), None);
        assert_eq!(Prediction::default_for(GameType::Coin), Some(Prediction::Heads));
        assert_eq!(Prediction::default_for(GameType::HighLow), Some(Prediction::High));
        assert_eq!(Prediction::default_for(GameType::Wheel), Some(Prediction::Number(1)));
        assert_eq!(Prediction::default_for(GameType::Slot), None);
    }

    #[test]
    fn test_jackpot_closed_status_reads_as_drawn() {
        let raw = json!({
            "jackpot_event_id": "j-1",
            "game_date": "2026-11-01",
            "entry_amount": 10.0,
            "currency_code": "USD",
            "status": "CLOSED",
            "total_pool_amount": 120.0
        });
        let event: JackpotEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.status, JackpotStatus::Drawn);
        assert_eq!(event.participant_count, 0);
    }
}
