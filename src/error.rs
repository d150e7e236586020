//! Error taxonomy shared by every component.
//!
//! Four families matter to callers:
//! - `Validation`: local pre-flight rejection, nothing was sent
//! - `Unauthenticated`: credential missing or rejected (401), route to login
//! - `BusinessRule`: the server refused with a human message, shown verbatim
//! - `Transient`: network / 5xx, nothing committed unless `ambiguous`

use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Local input problems caught before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Enter a bet amount")]
    EmptyAmount,
    #[error("'{0}' is not a valid amount")]
    NotNumeric(String),
    #[error("Bet range: ${min} - ${max}")]
    OutOfRange { min: Decimal, max: Decimal },
    #[error("Insufficient funds in {wallet} wallet.")]
    InsufficientFunds { wallet: String },
    #[error("Prediction {got} is not valid for {game_type} (expected {expected})")]
    InvalidPrediction {
        game_type: String,
        expected: String,
        got: String,
    },
    #[error("Enter the 6-digit code")]
    OtpFormat,
    #[error("'{0}' is not a valid email address")]
    Email(String),
    #[error("Please verify identity first.")]
    KycRequired,
    #[error("Entry was not confirmed")]
    NotConfirmed,
}

/// Failure codes of the staff deposit/withdraw OTP protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OtpErrorCode {
    InvalidAmount,
    PlayerNotFound,
    OtpExpired,
    OtpMismatch,
    InsufficientBalance,
    NoPendingTicket,
}

impl OtpErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpErrorCode::InvalidAmount => "INVALID_AMOUNT",
            OtpErrorCode::PlayerNotFound => "PLAYER_NOT_FOUND",
            OtpErrorCode::OtpExpired => "OTP_EXPIRED",
            OtpErrorCode::OtpMismatch => "OTP_MISMATCH",
            OtpErrorCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            OtpErrorCode::NoPendingTicket => "NO_PENDING_TICKET",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "INVALID_AMOUNT" => Some(OtpErrorCode::InvalidAmount),
            "PLAYER_NOT_FOUND" => Some(OtpErrorCode::PlayerNotFound),
            "OTP_EXPIRED" => Some(OtpErrorCode::OtpExpired),
            "OTP_MISMATCH" => Some(OtpErrorCode::OtpMismatch),
            "INSUFFICIENT_BALANCE" => Some(OtpErrorCode::InsufficientBalance),
            "NO_PENDING_TICKET" => Some(OtpErrorCode::NoPendingTicket),
            _ => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            OtpErrorCode::InvalidAmount => "Enter valid amount",
            OtpErrorCode::PlayerNotFound => "Player not found",
            OtpErrorCode::OtpExpired => "OTP Expired.",
            OtpErrorCode::OtpMismatch => "Invalid OTP.",
            OtpErrorCode::InsufficientBalance => "Insufficient funds.",
            OtpErrorCode::NoPendingTicket => "No pending request for this player.",
        }
    }
}

impl std::fmt::Display for OtpErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("{message}")]
    BusinessRule {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("transient failure: {message}")]
    Transient {
        message: String,
        /// The request may have reached the server; the outcome is unknown
        ambiguous: bool,
    },

    #[error("{code}: {}", .code.message())]
    Otp { code: OtpErrorCode },

    #[error("a round is already in progress")]
    RoundInFlight,

    #[error("game session is closed")]
    SessionClosed,

    #[error("unexpected response: {0}")]
    InvalidResponse(String),
}

impl CoreError {
    pub fn otp(code: OtpErrorCode) -> Self {
        CoreError::Otp { code }
    }

    pub fn business(status: StatusCode, code: Option<String>, message: impl Into<String>) -> Self {
        CoreError::BusinessRule {
            status: status.as_u16(),
            code,
            message: message.into(),
        }
    }

    /// Classify a reqwest failure.
    ///
    /// A timeout, or a failure once the request was written, is ambiguous:
    /// the server may already have committed.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let ambiguous = err.is_timeout() || !(err.is_connect() || err.is_builder());
        CoreError::Transient {
            message: err.to_string(),
            ambiguous,
        }
    }

    /// Text to show the user.
    pub fn user_message(&self) -> String {
        match self {
            CoreError::Validation(v) => v.to_string(),
            CoreError::Unauthenticated => "Session expired, please log in again.".to_string(),
            CoreError::BusinessRule { message, .. } => message.clone(),
            CoreError::Transient { .. } => "Something went wrong. Please try again.".to_string(),
            CoreError::Otp { code } => code.message().to_string(),
            CoreError::RoundInFlight => "Please wait for the current round to finish.".to_string(),
            CoreError::SessionClosed => "This game session has ended.".to_string(),
            CoreError::InvalidResponse(_) => "Error playing round.".to_string(),
        }
    }

    /// Safe to retry without risking a double commit.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::Transient { ambiguous: false, .. })
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, CoreError::Transient { ambiguous: true, .. })
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, CoreError::Unauthenticated)
    }

    pub fn otp_code(&self) -> Option<OtpErrorCode> {
        match self {
            CoreError::Otp { code } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_validation_messages_are_user_facing() {
        let err: CoreError = ValidationError::OutOfRange { min: dec!(1), max: dec!(100) }.into();
        assert_eq!(err.user_message(), "Bet range: $1 - $100");

        let err: CoreError = ValidationError::InsufficientFunds { wallet: "BONUS".into() }.into();
        assert_eq!(err.user_message(), "Insufficient funds in BONUS wallet.");
    }

    #[test]
    fn test_business_rule_is_verbatim() {
        let err = CoreError::business(StatusCode::BAD_REQUEST, None, "Already entered");
        assert_eq!(err.user_message(), "Already entered");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retry_only_when_unambiguous() {
        let safe = CoreError::Transient { message: "connect refused".into(), ambiguous: false };
        let unsure = CoreError::Transient { message: "timed out".into(), ambiguous: true };
        assert!(safe.is_retryable());
        assert!(!unsure.is_retryable());
        assert!(unsure.is_ambiguous());
    }

    #[test]
    fn test_otp_code_strings() {
        for code in [
            OtpErrorCode::InvalidAmount,
            OtpErrorCode::PlayerNotFound,
            OtpErrorCode::OtpExpired,
            OtpErrorCode::OtpMismatch,
            OtpErrorCode::InsufficientBalance,
            OtpErrorCode::NoPendingTicket,
        ] {
            assert_eq!(OtpErrorCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(OtpErrorCode::parse("NOPE"), None);
        assert_eq!(
            CoreError::otp(OtpErrorCode::OtpMismatch).to_string(),
            "OTP_MISMATCH: Invalid OTP."
        );
    }
}
