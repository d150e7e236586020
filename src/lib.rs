/// Casino Play Core
/// Client-side play flow for a multi-tenant casino: round sessions, wallet
/// ledger, dashboard polling, jackpot entry and the staff OTP cashier desk,
/// plus an in-memory sandbox backend that speaks the same API.

pub mod api_client;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod error;
pub mod jackpot;
pub mod models;
pub mod otp;
pub mod sandbox;
pub mod session;
pub mod wallet;

pub use api_client::ApiClient;
pub use auth::{AuthContext, Credential};
pub use config::{ClientConfig, SandboxConfig};
pub use dashboard::{BalanceHold, DashboardAggregator, DashboardSnapshot, PlayerFeed, PollHandle, RefreshOutcome};
pub use engine::{EngineGateway, RoundEngine, SessionGateway};
pub use error::{CoreError, OtpErrorCode, Result, ValidationError};
pub use jackpot::{JackpotCoordinator, JackpotEntry, JackpotGateway};
pub use otp::{CashierDesk, CashierGateway, OtpTicket, TicketStage};
pub use session::{
    GameSessionController, PresentationWindow, Round, RoundHandle, RoundState, RoundStatus, SessionDeps, ValidBet,
};
pub use wallet::{AppliedUpdate, Balances, ConfirmedUpdate, LedgerChange, WalletLedger};
