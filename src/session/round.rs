//! Round state and pre-flight validation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::{Game, GameType, Prediction, RoundOutcome, WalletKind};

/// Where the session's single round slot stands.
///
/// Exactly one of these at a time; a result only exists once shown.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundState {
    Idle,
    Submitting { round_id: u64 },
    Presenting { round_id: u64 },
    ResultShown { round_id: u64, outcome: RoundOutcome },
    Closed,
}

impl RoundState {
    pub fn is_idle(&self) -> bool {
        matches!(self, RoundState::Idle)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, RoundState::Closed)
    }

    /// A settled result is on screen or about to be
    pub fn holds_balance(&self) -> bool {
        matches!(self, RoundState::Presenting { .. } | RoundState::ResultShown { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            RoundState::Idle => "IDLE",
            RoundState::Submitting { .. } => "SUBMITTING",
            RoundState::Presenting { .. } => "PRESENTING",
            RoundState::ResultShown { .. } => "RESULT_SHOWN",
            RoundState::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoundStatus {
    Requested,
    Settled,
    Failed,
    /// Outcome unknown; balances wait for the next full snapshot
    Unresolved,
}

/// History entry for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Round {
    pub round_id: u64,
    pub bet_amount: Decimal,
    pub wallet: WalletKind,
    pub prediction: Option<Prediction>,
    pub status: RoundStatus,
    pub outcome: Option<RoundOutcome>,
    pub error: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl Round {
    pub fn requested(round_id: u64, bet: &ValidBet) -> Self {
        Self {
            round_id,
            bet_amount: bet.amount,
            wallet: bet.wallet,
            prediction: bet.prediction.clone(),
            status: RoundStatus::Requested,
            outcome: None,
            error: None,
            requested_at: Utc::now(),
        }
    }
}

/// A bet that passed every local check.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidBet {
    pub amount: Decimal,
    pub wallet: WalletKind,
    pub prediction: Option<Prediction>,
}

// ============================================================================
// VALIDATION
// ============================================================================

pub fn parse_amount(raw: &str) -> Result<Decimal, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyAmount);
    }
    trimmed
        .parse::<Decimal>()
        .map_err(|_| ValidationError::NotNumeric(trimmed.to_string()))
}

/// `min_bet <= amount <= max_bet` and `amount <= balance`.
///
/// `balance` is the selected wallet as last confirmed; unknown counts as zero.
pub fn check_amount(
    game: &Game,
    amount: Decimal,
    wallet: WalletKind,
    balance: Option<Decimal>,
) -> Result<(), ValidationError> {
    if amount <= Decimal::ZERO || amount < game.min_bet || amount > game.max_bet {
        return Err(ValidationError::OutOfRange {
            min: game.min_bet,
            max: game.max_bet,
        });
    }
    if amount > balance.unwrap_or(Decimal::ZERO) {
        return Err(ValidationError::InsufficientFunds {
            wallet: wallet.to_string(),
        });
    }
    Ok(())
}

/// Resolve the prediction for a game type, falling back to the preselected
/// default when the player picked none.
pub fn resolve_prediction(
    game_type: GameType,
    prediction: Option<Prediction>,
) -> Result<Option<Prediction>, ValidationError> {
    let Some(prediction) = prediction.or_else(|| Prediction::default_for(game_type)) else {
        return Ok(None);
    };

    let valid = match (game_type, &prediction) {
        (GameType::Coin, Prediction::Heads | Prediction::Tails) => true,
        (GameType::HighLow, Prediction::High | Prediction::Low) => true,
        (GameType::Dice | GameType::Wheel, Prediction::Number(n)) => {
            game_type.max_number().is_some_and(|max| (1..=max).contains(n))
        }
        _ => false,
    };
    if valid {
        return Ok(Some(prediction));
    }

    let expected = match game_type {
        GameType::Coin => "HEADS or TAILS".to_string(),
        GameType::HighLow => "HIGH or LOW".to_string(),
        GameType::Dice | GameType::Wheel => format!("1-{}", game_type.max_number().unwrap_or(1)),
        GameType::Slot => "no prediction".to_string(),
    };
    Err(ValidationError::InvalidPrediction {
        game_type: game_type.to_string(),
        expected,
        got: prediction.wire_value(),
    })
}

pub fn validate_bet(
    game: &Game,
    raw_amount: &str,
    prediction: Option<Prediction>,
    wallet: WalletKind,
    balance: Option<Decimal>,
) -> Result<ValidBet, ValidationError> {
    let amount = parse_amount(raw_amount)?;
    check_amount(game, amount, wallet, balance)?;
    let prediction = resolve_prediction(game.game_type, prediction)?;
    Ok(ValidBet {
        amount,
        wallet,
        prediction,
    })
}
